//! Poll repository.

use std::sync::Arc;

use crate::entities::{Poll, poll};
use pollo_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};

/// Poll repository for database operations.
#[derive(Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
}

impl PollRepository {
    /// Create a new poll repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a poll by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<poll::Model>> {
        Poll::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a poll by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<poll::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PollNotFound(id.to_string()))
    }

    /// Create a new poll.
    pub async fn create(&self, model: poll::ActiveModel) -> AppResult<poll::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a poll.
    pub async fn update(&self, model: poll::ActiveModel) -> AppResult<poll::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a poll. Options and votes cascade at the schema level.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        Poll::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get polls created by a user (newest first).
    pub async fn find_by_creator(
        &self,
        creator_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<poll::Model>> {
        let mut query = Poll::find()
            .filter(poll::Column::CreatorId.eq(creator_id))
            .order_by_desc(poll::Column::Id)
            .limit(limit);

        if let Some(until) = until_id {
            query = query.filter(poll::Column::Id.lt(until));
        }

        query
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get the most recently created polls.
    pub async fn find_recent(&self, limit: u64, until_id: Option<&str>) -> AppResult<Vec<poll::Model>> {
        let mut query = Poll::find().order_by_desc(poll::Column::Id).limit(limit);

        if let Some(until) = until_id {
            query = query.filter(poll::Column::Id.lt(until));
        }

        query
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Search polls by title or description substring (newest first).
    pub async fn search(&self, query: &str, limit: u64) -> AppResult<Vec<poll::Model>> {
        let pattern = format!("%{}%", escape_like(query));

        let condition = Condition::any()
            .add(poll::Column::Title.like(&pattern))
            .add(poll::Column::Description.like(&pattern));

        Poll::find()
            .filter(condition)
            .order_by_desc(poll::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// Escape LIKE metacharacters so user input matches literally.
///
/// Backslash goes first; escaping it later would mangle the escapes
/// added for `%` and `_`.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_handles_metacharacters() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%"), "50\\%");
        assert_eq!(escape_like("snake_case"), "snake\\_case");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        // A literal backslash must not swallow the escapes added after it
        assert_eq!(escape_like("\\%"), "\\\\\\%");
    }
}
