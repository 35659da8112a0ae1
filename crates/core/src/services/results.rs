use pollo_common::{AppError, AppResult};
use pollo_db::{
    entities::{poll, poll_option, vote},
    repositories::{PollOptionRepository, PollRepository, VoteRepository},
};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;

/// Default number of entries in the recent-voter feed.
pub const DEFAULT_VOTERS_LIMIT: u64 = 10;

/// Live tally for one option.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResult {
    pub id: String,
    pub text: String,
    pub vote_count: i32,
    /// Share of the poll total, rounded to the nearest whole percent.
    pub percentage: i32,
    pub position: i32,
}

/// Aggregated results for a poll at a point in time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResults {
    pub poll_id: String,
    pub total_votes: i32,
    pub options: Vec<OptionResult>,
}

/// One entry in the recent-voter feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentVoter {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_anonymous: bool,
    pub option_id: String,
    pub voted_at: DateTimeWithTimeZone,
}

impl RecentVoter {
    /// Anonymous votes carry no identity, whatever the row says.
    fn from_vote(vote: vote::Model) -> Self {
        let (name, avatar_url) = if vote.is_anonymous {
            (None, None)
        } else {
            (vote.voter_name, vote.voter_avatar_url)
        };
        Self {
            name,
            avatar_url,
            is_anonymous: vote.is_anonymous,
            option_id: vote.option_id,
            voted_at: vote.created_at,
        }
    }
}

/// Read-side projections: aggregated tallies and the recent-voter feed.
#[derive(Clone)]
pub struct ResultsService {
    poll_repo: PollRepository,
    option_repo: PollOptionRepository,
    vote_repo: VoteRepository,
}

impl ResultsService {
    #[must_use]
    pub const fn new(
        poll_repo: PollRepository,
        option_repo: PollOptionRepository,
        vote_repo: VoteRepository,
    ) -> Self {
        Self {
            poll_repo,
            option_repo,
            vote_repo,
        }
    }

    /// Current aggregated results for a poll.
    pub async fn get_results(&self, poll_id: &str) -> AppResult<PollResults> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        let options = self.option_repo.find_by_poll(poll_id).await?;
        Ok(Self::project(&poll, options))
    }

    /// Project option rows into percentages against the poll's own total.
    ///
    /// The stored `total_votes` is the denominator even when it briefly
    /// disagrees with the sum of option counts.
    #[must_use]
    pub fn project(poll: &poll::Model, options: Vec<poll_option::Model>) -> PollResults {
        let total = poll.total_votes;
        let options = options
            .into_iter()
            .map(|o| OptionResult {
                percentage: percentage(o.vote_count, total),
                id: o.id,
                text: o.text,
                vote_count: o.vote_count,
                position: o.position,
            })
            .collect();

        PollResults {
            poll_id: poll.id.clone(),
            total_votes: total,
            options,
        }
    }

    /// Recent voters for a poll, newest first.
    ///
    /// Polls with a hidden voter list only answer to their creator.
    pub async fn recent_voters(
        &self,
        poll_id: &str,
        requester: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<RecentVoter>> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        if !poll.show_voter_list && requester != Some(poll.creator_id.as_str()) {
            return Err(AppError::Forbidden(
                "Voter list is hidden for this poll".to_string(),
            ));
        }

        let votes = self.vote_repo.find_recent_by_poll(poll_id, limit).await?;
        Ok(votes.into_iter().map(RecentVoter::from_vote).collect())
    }
}

fn percentage(vote_count: i32, total_votes: i32) -> i32 {
    if total_votes > 0 {
        (f64::from(vote_count) / f64::from(total_votes) * 100.0).round() as i32
    } else {
        0
    }
}
