//! Poll service.

use crate::services::event_publisher::EventPublisherService;
use pollo_common::{AppError, AppResult, Config, IdGenerator};
use pollo_db::{
    entities::{poll, poll_option, user},
    repositories::{PollOptionRepository, PollRepository},
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Minimum number of options a poll must have.
const MIN_OPTIONS: usize = 2;

/// Maximum number of options a poll can have.
const MAX_OPTIONS: usize = 10;

/// Maximum length of a single option text.
const MAX_OPTION_LEN: usize = 100;

/// Maximum length of a poll title.
const MAX_TITLE_LEN: usize = 200;

/// Maximum length of a poll description.
const MAX_DESCRIPTION_LEN: usize = 1000;

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    db: Arc<DatabaseConnection>,
    poll_repo: PollRepository,
    option_repo: PollOptionRepository,
    event_publisher: Option<EventPublisherService>,
    id_gen: IdGenerator,
    server_url: String,
}

/// Input for creating a new poll.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollInput {
    pub title: String,

    pub description: Option<String>,

    /// Option texts in display order. Blank entries are dropped.
    pub options: Vec<String>,

    #[serde(default)]
    pub allow_multiple: bool,

    #[serde(default)]
    pub require_login: bool,

    #[serde(default = "default_show_voter_list")]
    pub show_voter_list: bool,

    #[serde(default)]
    pub allow_change_vote: bool,
}

const fn default_show_voter_list() -> bool {
    true
}

/// A poll together with its options.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollWithOptions {
    #[serde(flatten)]
    pub poll: poll::Model,
    pub options: Vec<poll_option::Model>,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        poll_repo: PollRepository,
        option_repo: PollOptionRepository,
        config: &Config,
    ) -> Self {
        Self {
            db,
            poll_repo,
            option_repo,
            event_publisher: None,
            id_gen: IdGenerator::new(),
            server_url: config.server.url.clone(),
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// Create a new poll with its options.
    ///
    /// The creator's display name and avatar are snapshotted onto the poll
    /// row; later profile edits leave existing polls untouched.
    pub async fn create(
        &self,
        creator: &user::Model,
        input: CreatePollInput,
    ) -> AppResult<PollWithOptions> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::BadRequest("Poll title is required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::BadRequest(
                "Poll title cannot exceed 200 characters".to_string(),
            ));
        }

        let description = input
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(ToString::to_string);
        if let Some(ref description) = description {
            if description.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(AppError::BadRequest(
                    "Poll description cannot exceed 1000 characters".to_string(),
                ));
            }
        }

        // Blank entries are dropped before the minimum check
        let options = Self::normalize_options(&input.options);
        if options.len() < MIN_OPTIONS {
            return Err(AppError::BadRequest(
                "Poll must have at least 2 options".to_string(),
            ));
        }
        if options.len() > MAX_OPTIONS {
            return Err(AppError::BadRequest(
                "Poll can have at most 10 options".to_string(),
            ));
        }
        for option in &options {
            if option.chars().count() > MAX_OPTION_LEN {
                return Err(AppError::BadRequest(
                    "Option text cannot exceed 100 characters".to_string(),
                ));
            }
        }

        let poll_id = self.id_gen.generate();
        let creator_name = creator
            .name
            .clone()
            .unwrap_or_else(|| creator.username.clone());

        let poll_model = poll::ActiveModel {
            id: Set(poll_id.clone()),
            title: Set(title.to_string()),
            description: Set(description),
            creator_id: Set(creator.id.clone()),
            creator_name: Set(creator_name),
            creator_avatar_url: Set(creator.avatar_url.clone()),
            is_open: Set(true),
            total_votes: Set(0),
            allow_multiple: Set(input.allow_multiple),
            require_login: Set(input.require_login),
            show_voter_list: Set(input.show_voter_list),
            allow_change_vote: Set(input.allow_change_vote),
            created_at: Set(chrono::Utc::now().into()),
        };
        // Poll and option rows land together or not at all
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let created = poll_model
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut created_options = Vec::with_capacity(options.len());
        for (i, text) in options.into_iter().enumerate() {
            let option_model = poll_option::ActiveModel {
                id: Set(self.id_gen.generate()),
                poll_id: Set(poll_id.clone()),
                text: Set(text),
                vote_count: Set(0),
                position: Set(i as i32),
            };
            let option = option_model
                .insert(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            created_options.push(option);
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(PollWithOptions {
            poll: created,
            options: created_options,
        })
    }

    /// Get a poll with its options.
    pub async fn get(&self, poll_id: &str) -> AppResult<PollWithOptions> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        let options = self.option_repo.find_by_poll(poll_id).await?;

        Ok(PollWithOptions { poll, options })
    }

    /// Open or close a poll. Only the creator may do this.
    pub async fn toggle_open(&self, poll_id: &str, user_id: &str) -> AppResult<poll::Model> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        if poll.creator_id != user_id {
            return Err(AppError::Forbidden(
                "Only the poll creator can open or close it".to_string(),
            ));
        }

        let next_state = !poll.is_open;
        let mut active: poll::ActiveModel = poll.into();
        active.is_open = Set(next_state);
        let updated = self.poll_repo.update(active).await?;

        if let Some(ref event_publisher) = self.event_publisher {
            if let Err(e) = event_publisher
                .publish_poll_state_changed(poll_id, updated.is_open)
                .await
            {
                tracing::warn!(error = %e, "Failed to publish poll state event");
            }
        }

        Ok(updated)
    }

    /// Delete a poll. Only the creator may do this.
    ///
    /// Options and votes go with it through the schema-level cascade.
    pub async fn delete(&self, poll_id: &str, user_id: &str) -> AppResult<()> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        if poll.creator_id != user_id {
            return Err(AppError::Forbidden(
                "Only the poll creator can delete it".to_string(),
            ));
        }

        self.poll_repo.delete(poll_id).await?;

        if let Some(ref event_publisher) = self.event_publisher {
            if let Err(e) = event_publisher.publish_poll_deleted(poll_id).await {
                tracing::warn!(error = %e, "Failed to publish poll deleted event");
            }
        }

        Ok(())
    }

    /// Get polls created by a user, newest first.
    pub async fn get_user_polls(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<poll::Model>> {
        self.poll_repo
            .find_by_creator(user_id, limit, until_id)
            .await
    }

    /// Get the most recent polls, newest first.
    pub async fn get_recent(
        &self,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<poll::Model>> {
        self.poll_repo.find_recent(limit, until_id).await
    }

    /// Search polls by title or description substring.
    pub async fn search(&self, query: &str, limit: u64) -> AppResult<Vec<poll::Model>> {
        self.poll_repo.search(query, limit).await
    }

    /// URL of the poll's voting page.
    #[must_use]
    pub fn share_url(&self, poll_id: &str) -> String {
        format!("{}/poll/{}", self.server_url, poll_id)
    }

    /// URL of the poll's embeddable widget.
    #[must_use]
    pub fn embed_url(&self, poll_id: &str) -> String {
        format!("{}/embed/{}", self.server_url, poll_id)
    }

    /// Trim option texts and drop blank entries, preserving order.
    fn normalize_options(options: &[String]) -> Vec<String> {
        options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}
