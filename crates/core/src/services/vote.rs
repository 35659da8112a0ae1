use crate::services::event_publisher::{EventPublisherService, OptionTally};
use pollo_common::{AppError, AppResult, IdGenerator};
use pollo_db::{
    entities::{poll, poll_option, user, vote},
    repositories::{PollRepository, VoteRepository},
};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, IsolationLevel, QueryFilter, QueryOrder, Set,
    TransactionTrait, sea_query::Expr,
};
use serde::Serialize;
use std::sync::Arc;

/// Accepted prefixes for client-minted anonymous voter ids.
const ANON_ID_PREFIXES: [&str; 2] = ["anon_", "embed_"];

/// Longest accepted anonymous voter id.
const MAX_ANON_ID_LEN: usize = 64;

/// Who is casting a vote.
///
/// Carried explicitly through the eligibility gate and the tally
/// transaction so every layer agrees on the voter id and on what gets
/// snapshotted onto vote rows.
#[derive(Debug, Clone)]
pub enum VoterIdentity {
    /// A signed-in user.
    Authenticated {
        user_id: String,
        name: Option<String>,
        avatar_url: Option<String>,
    },
    /// A browser-minted id (`anon_` or `embed_` prefixed).
    Anonymous { anon_id: String },
}

impl VoterIdentity {
    /// Identity of a signed-in user, with display metadata to snapshot.
    #[must_use]
    pub fn from_user(user: &user::Model) -> Self {
        Self::Authenticated {
            user_id: user.id.clone(),
            name: Some(user.name.clone().unwrap_or_else(|| user.username.clone())),
            avatar_url: user.avatar_url.clone(),
        }
    }

    /// Anonymous identity from a client-supplied id.
    ///
    /// The id is checked for shape only and otherwise treated as opaque.
    pub fn anonymous(anon_id: impl Into<String>) -> AppResult<Self> {
        let anon_id = anon_id.into();
        validate_anon_id(&anon_id)?;
        Ok(Self::Anonymous { anon_id })
    }

    /// The id recorded on vote rows.
    #[must_use]
    pub fn voter_id(&self) -> &str {
        match self {
            Self::Authenticated { user_id, .. } => user_id,
            Self::Anonymous { anon_id } => anon_id,
        }
    }

    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous { .. })
    }

    /// Display name snapshotted onto vote rows; anonymous voters have none.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Authenticated { name, .. } => name.as_deref(),
            Self::Anonymous { .. } => None,
        }
    }

    /// Avatar URL snapshotted onto vote rows; anonymous voters have none.
    #[must_use]
    pub fn avatar_url(&self) -> Option<&str> {
        match self {
            Self::Authenticated { avatar_url, .. } => avatar_url.as_deref(),
            Self::Anonymous { .. } => None,
        }
    }
}

fn validate_anon_id(anon_id: &str) -> AppResult<()> {
    let suffix = ANON_ID_PREFIXES
        .iter()
        .find_map(|prefix| anon_id.strip_prefix(prefix));

    match suffix {
        Some(rest)
            if !rest.is_empty()
                && anon_id.len() <= MAX_ANON_ID_LEN
                && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            Ok(())
        }
        _ => Err(AppError::BadRequest(
            "Invalid anonymous voter id".to_string(),
        )),
    }
}

/// A voter's working set of picked options.
///
/// Single-choice polls replace the current pick; multiple-choice polls
/// toggle each option independently. Picking an already-selected option
/// always deselects it.
#[derive(Debug, Clone)]
pub struct Selection {
    allow_multiple: bool,
    selected: Vec<String>,
}

impl Selection {
    #[must_use]
    pub const fn new(allow_multiple: bool) -> Self {
        Self {
            allow_multiple,
            selected: Vec::new(),
        }
    }

    /// Build a selection by toggling each id in order.
    #[must_use]
    pub fn from_ids(allow_multiple: bool, option_ids: impl IntoIterator<Item = String>) -> Self {
        let mut selection = Self::new(allow_multiple);
        for option_id in option_ids {
            selection.toggle(&option_id);
        }
        selection
    }

    /// Select or deselect an option.
    pub fn toggle(&mut self, option_id: &str) {
        if let Some(pos) = self.selected.iter().position(|id| id == option_id) {
            self.selected.remove(pos);
        } else {
            if !self.allow_multiple {
                self.selected.clear();
            }
            self.selected.push(option_id.to_string());
        }
    }

    #[must_use]
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    #[must_use]
    pub fn contains(&self, option_id: &str) -> bool {
        self.selected.iter().any(|id| id == option_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.selected.len()
    }
}

/// Whether a voter has already voted in a poll, and for which options.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteStatus {
    pub has_voted: bool,
    /// Previously chosen option ids, deduplicated, oldest first.
    pub option_ids: Vec<String>,
}

/// Outcome of a committed tally transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub poll_id: String,
    /// Ids of the vote rows written, one per selected option.
    pub vote_ids: Vec<String>,
    /// Per-option counts including the votes just cast.
    pub tally: Vec<OptionTally>,
    pub total_votes: i32,
}

/// Vote casting: the eligibility gate plus the atomic tally transaction.
#[derive(Clone)]
pub struct VoteService {
    db: Arc<DatabaseConnection>,
    poll_repo: PollRepository,
    vote_repo: VoteRepository,
    event_publisher: Option<EventPublisherService>,
    id_gen: IdGenerator,
}

impl VoteService {
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        poll_repo: PollRepository,
        vote_repo: VoteRepository,
    ) -> Self {
        Self {
            db,
            poll_repo,
            vote_repo,
            event_publisher: None,
            id_gen: IdGenerator::new(),
        }
    }

    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// Which options a voter has already picked in a poll.
    pub async fn vote_status(&self, poll_id: &str, voter_id: &str) -> AppResult<VoteStatus> {
        let votes = self
            .vote_repo
            .find_by_poll_and_voter(poll_id, voter_id)
            .await?;

        let mut option_ids: Vec<String> = Vec::new();
        for vote in &votes {
            if !option_ids.contains(&vote.option_id) {
                option_ids.push(vote.option_id.clone());
            }
        }

        Ok(VoteStatus {
            has_voted: !votes.is_empty(),
            option_ids,
        })
    }

    /// Check whether an identity may cast a vote in a poll.
    ///
    /// Anonymous voters are turned away from login-required polls, and
    /// repeat voters are turned away unless the poll allows changing
    /// votes. Runs before, not inside, the tally transaction.
    pub async fn check_eligibility(
        &self,
        poll_id: &str,
        identity: &VoterIdentity,
    ) -> AppResult<()> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;

        if poll.require_login && identity.is_anonymous() {
            return Err(AppError::Unauthorized);
        }

        let has_voted = self
            .vote_repo
            .has_voted(poll_id, identity.voter_id())
            .await?;
        if has_voted && !poll.allow_change_vote {
            return Err(AppError::Forbidden(
                "You have already voted in this poll".to_string(),
            ));
        }

        Ok(())
    }

    /// The full submission flow: eligibility gate, then tally transaction.
    ///
    /// The gate's lookups are not atomic with the transaction, so two
    /// submissions from the same voter can race past it; the transaction
    /// itself only enforces that the poll exists and is open.
    pub async fn submit(
        &self,
        poll_id: &str,
        option_ids: Vec<String>,
        identity: &VoterIdentity,
    ) -> AppResult<VoteReceipt> {
        self.check_eligibility(poll_id, identity).await?;
        self.cast(poll_id, option_ids, identity).await
    }

    /// Record votes for the selected options in a single transaction.
    ///
    /// Writes one immutable vote row per option, bumps each option's
    /// count and the poll's total, and commits all of it or none of it.
    /// Serialization failures and deadlocks surface as `Conflict`.
    pub async fn cast(
        &self,
        poll_id: &str,
        option_ids: Vec<String>,
        identity: &VoterIdentity,
    ) -> AppResult<VoteReceipt> {
        // Serializable: a close or counter write racing this transaction
        // aborts it with a serialization failure instead of committing
        // against stale reads.
        let txn = self
            .db
            .begin_with_config(Some(IsolationLevel::Serializable), None)
            .await
            .map_err(|e| map_db_err(&e))?;

        let poll = poll::Entity::find_by_id(poll_id)
            .one(&txn)
            .await
            .map_err(|e| map_db_err(&e))?
            .ok_or_else(|| AppError::PollNotFound(poll_id.to_string()))?;

        if !poll.is_open {
            return Err(AppError::PollClosed(poll_id.to_string()));
        }

        if !poll.allow_multiple && option_ids.len() > 1 {
            return Err(AppError::BadRequest(
                "This poll accepts one option per ballot".to_string(),
            ));
        }

        let selection = Selection::from_ids(poll.allow_multiple, option_ids);
        if selection.is_empty() {
            return Err(AppError::BadRequest("No options selected".to_string()));
        }

        let options = poll_option::Entity::find()
            .filter(poll_option::Column::PollId.eq(poll_id))
            .order_by_asc(poll_option::Column::Position)
            .all(&txn)
            .await
            .map_err(|e| map_db_err(&e))?;

        for option_id in selection.selected() {
            if !options.iter().any(|o| o.id == *option_id) {
                return Err(AppError::BadRequest(format!(
                    "Option {option_id} does not belong to this poll"
                )));
            }
        }

        let now = chrono::Utc::now();
        let mut vote_ids = Vec::with_capacity(selection.len());

        for option_id in selection.selected() {
            let vote_id = self.id_gen.generate();
            let new_vote = vote::ActiveModel {
                id: Set(vote_id.clone()),
                poll_id: Set(poll_id.to_string()),
                option_id: Set(option_id.clone()),
                voter_id: Set(identity.voter_id().to_string()),
                voter_name: Set(identity.display_name().map(ToString::to_string)),
                voter_avatar_url: Set(identity.avatar_url().map(ToString::to_string)),
                is_anonymous: Set(identity.is_anonymous()),
                created_at: Set(now.into()),
            };
            vote::Entity::insert(new_vote)
                .exec(&txn)
                .await
                .map_err(|e| map_db_err(&e))?;

            poll_option::Entity::update_many()
                .col_expr(
                    poll_option::Column::VoteCount,
                    Expr::col(poll_option::Column::VoteCount).add(1),
                )
                .filter(poll_option::Column::Id.eq(option_id.as_str()))
                .exec(&txn)
                .await
                .map_err(|e| map_db_err(&e))?;

            vote_ids.push(vote_id);
        }

        // The total update re-checks is_open: a close that lands after the
        // read above must not gain a vote, whatever the isolation level.
        let cast_count = selection.len() as i32;
        let total_update = poll::Entity::update_many()
            .col_expr(
                poll::Column::TotalVotes,
                Expr::col(poll::Column::TotalVotes).add(cast_count),
            )
            .filter(poll::Column::Id.eq(poll_id))
            .filter(poll::Column::IsOpen.eq(true))
            .exec(&txn)
            .await
            .map_err(|e| map_db_err(&e))?;
        if total_update.rows_affected == 0 {
            return Err(AppError::PollClosed(poll_id.to_string()));
        }

        txn.commit().await.map_err(|e| map_db_err(&e))?;

        let tally: Vec<OptionTally> = options
            .iter()
            .map(|o| OptionTally {
                option_id: o.id.clone(),
                vote_count: o.vote_count + i32::from(selection.contains(&o.id)),
            })
            .collect();
        let total_votes = poll.total_votes + cast_count;

        if let Some(ref event_publisher) = self.event_publisher {
            if let Err(e) = event_publisher
                .publish_vote_cast(poll_id, &tally, total_votes)
                .await
            {
                tracing::warn!(error = %e, poll_id = %poll_id, "Failed to publish vote cast event");
            }
        }

        Ok(VoteReceipt {
            poll_id: poll_id.to_string(),
            vote_ids,
            tally,
            total_votes,
        })
    }
}

/// Serialization aborts and deadlocks map to `Conflict`; everything
/// else is a plain database error.
///
/// Postgres reports serialization failures as SQLSTATE 40001 with the
/// message "could not serialize access due to ..."; both forms are
/// matched here since drivers differ in which one survives into the
/// error string.
fn map_db_err(e: &sea_orm::DbErr) -> AppError {
    let msg = e.to_string();
    if msg.contains("could not serialize") || msg.contains("40001") || msg.contains("deadlock") {
        AppError::Conflict("Vote conflicted with a concurrent update".to_string())
    } else {
        AppError::Database(msg)
    }
}
