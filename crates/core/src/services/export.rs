use pollo_common::{AppError, AppResult};
use pollo_db::{
    entities::{poll_option, vote},
    repositories::{PollOptionRepository, PollRepository, VoteRepository},
};
use std::collections::HashMap;

/// A rendered CSV export ready to ship as a download.
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub filename: String,
    pub content: String,
}

/// CSV export of a poll's individual votes.
#[derive(Clone)]
pub struct ExportService {
    poll_repo: PollRepository,
    option_repo: PollOptionRepository,
    vote_repo: VoteRepository,
}

impl ExportService {
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

    /// Render every vote in a poll as CSV.
    ///
    /// Follows the same visibility rule as the voter list: polls with a
    /// hidden voter list only export for their creator.
    pub async fn export_csv(&self, poll_id: &str, requester: Option<&str>) -> AppResult<CsvExport> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        if !poll.show_voter_list && requester != Some(poll.creator_id.as_str()) {
            return Err(AppError::Forbidden(
                "Voter list is hidden for this poll".to_string(),
            ));
        }

        let options = self.option_repo.find_by_poll(poll_id).await?;
        let votes = self.vote_repo.find_all_by_poll(poll_id).await?;

        Ok(CsvExport {
            filename: format!("poll_results_{}.csv", poll.id),
            content: render_csv(&options, &votes),
        })
    }
}

/// One row per vote: voter name, option text, RFC 3339 timestamp.
///
/// Every field is quoted. Anonymous or unnamed voters render as
/// `Anonymous`, votes whose option no longer resolves as `Unknown`.
fn render_csv(options: &[poll_option::Model], votes: &[vote::Model]) -> String {
    let texts: HashMap<&str, &str> = options
        .iter()
        .map(|o| (o.id.as_str(), o.text.as_str()))
        .collect();

    let mut out = String::from("Voter,Option,Timestamp\n");
    for vote in votes {
        let voter = if vote.is_anonymous {
            "Anonymous"
        } else {
            vote.voter_name.as_deref().unwrap_or("Anonymous")
        };
        let option = texts
            .get(vote.option_id.as_str())
            .copied()
            .unwrap_or("Unknown");

        out.push_str(&csv_field(voter));
        out.push(',');
        out.push_str(&csv_field(option));
        out.push(',');
        out.push_str(&csv_field(&vote.created_at.to_rfc3339()));
        out.push('\n');
    }
    out
}

/// Quote a field, doubling any embedded quotes.
fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pollo_db::entities::poll;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    fn test_poll() -> poll::Model {
        poll::Model {
            id: "poll1".to_string(),
            title: "Favorite color?".to_string(),
            description: None,
            creator_id: "user1".to_string(),
            creator_name: "alice".to_string(),
            creator_avatar_url: None,
            is_open: true,
            total_votes: 0,
            allow_multiple: false,
            require_login: false,
            show_voter_list: true,
            allow_change_vote: false,
            created_at: chrono::Utc::now().into(),
        }
    }

    fn test_option(id: &str, text: &str) -> poll_option::Model {
        poll_option::Model {
            id: id.to_string(),
            poll_id: "poll1".to_string(),
            text: text.to_string(),
            vote_count: 0,
            position: 0,
        }
    }

    fn test_vote(option_id: &str, voter_name: Option<&str>, is_anonymous: bool) -> vote::Model {
        vote::Model {
            id: format!("vote_{option_id}"),
            poll_id: "poll1".to_string(),
            option_id: option_id.to_string(),
            voter_id: "user1".to_string(),
            voter_name: voter_name.map(ToString::to_string),
            voter_avatar_url: None,
            is_anonymous,
            created_at: chrono::Utc::now().into(),
        }
    }

    fn service_with(db: MockDatabase) -> ExportService {
        let db = Arc::new(db.into_connection());
        ExportService::new(
            PollRepository::new(Arc::clone(&db)),
            PollOptionRepository::new(Arc::clone(&db)),
            VoteRepository::new(db),
        )
    }

    #[test]
    fn csv_field_doubles_embedded_quotes() {
        assert_eq!(csv_field("plain"), "\"plain\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn render_csv_quotes_every_field() {
        let options = vec![test_option("opt_a", "Red")];
        let votes = vec![test_vote("opt_a", Some("Bob \"The Builder\""), false)];

        let csv = render_csv(&options, &votes);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Voter,Option,Timestamp"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"Bob \"\"The Builder\"\"\",\"Red\",\""));
    }

    #[test]
    fn render_csv_falls_back_for_missing_identity_and_option() {
        let options = vec![test_option("opt_a", "Red")];
        let votes = vec![
            test_vote("opt_a", Some("leaked"), true),
            test_vote("opt_gone", None, false),
        ];

        let csv = render_csv(&options, &votes);
        let rows: Vec<&str> = csv.lines().skip(1).collect();
        assert!(rows[0].starts_with("\"Anonymous\",\"Red\""));
        assert!(rows[1].starts_with("\"Anonymous\",\"Unknown\""));
    }

    #[test]
    fn render_csv_without_votes_is_header_only() {
        let csv = render_csv(&[], &[]);
        assert_eq!(csv, "Voter,Option,Timestamp\n");
    }

    #[tokio::test]
    async fn export_names_file_after_poll() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![test_poll()]])
            .append_query_results([vec![test_option("opt_a", "Red")]])
            .append_query_results([vec![test_vote("opt_a", Some("alice"), false)]]);
        let service = service_with(db);

        let export = service.export_csv("poll1", None).await.unwrap();
        assert_eq!(export.filename, "poll_results_poll1.csv");
        assert!(export.content.starts_with("Voter,Option,Timestamp\n"));
    }

    #[tokio::test]
    async fn export_hidden_list_rejects_non_creator() {
        let mut poll = test_poll();
        poll.show_voter_list = false;
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![poll]]);
        let service = service_with(db);

        let result = service.export_csv("poll1", Some("someone_else")).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
