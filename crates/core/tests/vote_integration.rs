//! Vote flow integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test vote_integration -- --ignored`
//!
//! Setup test database:
//!   docker-compose -f docker-compose.test.yml up -d test-db
//!
//! Each test creates its own database so they can run in parallel.

#![allow(clippy::unwrap_used)]

use pollo_common::AppError;
use pollo_common::config::{Config, DatabaseConfig, ServerConfig};
use pollo_core::{CreatePollInput, PollService, ResultsService, VoteService, VoterIdentity};
use pollo_db::entities::{poll, poll_option, user};
use pollo_db::repositories::{PollOptionRepository, PollRepository, UserRepository, VoteRepository};
use pollo_db::test_utils::TestDatabase;
use sea_orm::Set;
use std::sync::Arc;

struct TestContext {
    db: TestDatabase,
    polls: PollRepository,
    options: PollOptionRepository,
    votes: VoteRepository,
    vote_service: VoteService,
    results_service: ResultsService,
}

impl TestContext {
    async fn new() -> Self {
        let db = TestDatabase::create_unique().await.expect("Failed to connect");
        pollo_db::migrate(db.connection()).await.unwrap();

        let conn = db.conn.clone();
        let users = UserRepository::new(Arc::clone(&conn));
        let polls = PollRepository::new(Arc::clone(&conn));
        let options = PollOptionRepository::new(Arc::clone(&conn));
        let votes = VoteRepository::new(Arc::clone(&conn));

        users
            .create(user::ActiveModel {
                id: Set("u_alice".to_string()),
                username: Set("alice".to_string()),
                username_lower: Set("alice".to_string()),
                name: Set(None),
                avatar_url: Set(None),
                password_hash: Set("hash".to_string()),
                token: Set(Some("token_alice".to_string())),
                created_at: Set(chrono::Utc::now().into()),
                updated_at: Set(None),
            })
            .await
            .unwrap();

        let vote_service = VoteService::new(
            Arc::clone(&conn),
            PollRepository::new(Arc::clone(&conn)),
            VoteRepository::new(Arc::clone(&conn)),
        );
        let results_service = ResultsService::new(
            PollRepository::new(Arc::clone(&conn)),
            PollOptionRepository::new(Arc::clone(&conn)),
            VoteRepository::new(conn),
        );

        Self {
            db,
            polls,
            options,
            votes,
            vote_service,
            results_service,
        }
    }

    async fn create_poll(&self, id: &str, option_ids: &[&str], configure: impl FnOnce(&mut poll::ActiveModel)) {
        let mut model = poll::ActiveModel {
            id: Set(id.to_string()),
            title: Set("Favorite color?".to_string()),
            description: Set(None),
            creator_id: Set("u_alice".to_string()),
            creator_name: Set("alice".to_string()),
            creator_avatar_url: Set(None),
            is_open: Set(true),
            total_votes: Set(0),
            allow_multiple: Set(false),
            require_login: Set(false),
            show_voter_list: Set(true),
            allow_change_vote: Set(false),
            created_at: Set(chrono::Utc::now().into()),
        };
        configure(&mut model);
        self.polls.create(model).await.unwrap();

        for (i, option_id) in option_ids.iter().enumerate() {
            self.options
                .create(poll_option::ActiveModel {
                    id: Set((*option_id).to_string()),
                    poll_id: Set(id.to_string()),
                    text: Set(format!("Option {i}")),
                    vote_count: Set(0),
                    position: Set(i as i32),
                })
                .await
                .unwrap();
        }
    }

    async fn finish(self) {
        self.db.drop_database().await.unwrap();
    }
}

fn anon(id: &str) -> VoterIdentity {
    VoterIdentity::anonymous(id).unwrap()
}

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            url: "https://polls.example.com".to_string(),
        },
        database: DatabaseConfig {
            url: "postgres://localhost/test".to_string(),
            max_connections: 10,
            min_connections: 1,
        },
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn cast_writes_row_and_counters_together() {
    let ctx = TestContext::new().await;
    ctx.create_poll("p1", &["o_red", "o_blue"], |_| {}).await;

    let receipt = ctx
        .vote_service
        .cast("p1", vec!["o_red".to_string()], &anon("anon_voter1"))
        .await
        .unwrap();

    assert_eq!(receipt.vote_ids.len(), 1);
    assert_eq!(receipt.total_votes, 1);

    let poll = ctx.polls.get_by_id("p1").await.unwrap();
    assert_eq!(poll.total_votes, 1);

    let options = ctx.options.find_by_poll("p1").await.unwrap();
    assert_eq!(options[0].vote_count, 1);
    assert_eq!(options[1].vote_count, 0);
    assert_eq!(ctx.votes.count_by_poll("p1").await.unwrap(), 1);

    ctx.finish().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn cast_multiple_options_counts_each_once() {
    let ctx = TestContext::new().await;
    ctx.create_poll("p1", &["o_red", "o_blue", "o_green"], |m| {
        m.allow_multiple = Set(true);
    })
    .await;

    let receipt = ctx
        .vote_service
        .cast(
            "p1",
            vec!["o_red".to_string(), "o_green".to_string()],
            &anon("anon_voter1"),
        )
        .await
        .unwrap();

    assert_eq!(receipt.vote_ids.len(), 2);
    assert_eq!(receipt.total_votes, 2);

    let options = ctx.options.find_by_poll("p1").await.unwrap();
    assert_eq!(options[0].vote_count, 1);
    assert_eq!(options[1].vote_count, 0);
    assert_eq!(options[2].vote_count, 1);

    let poll = ctx.polls.get_by_id("p1").await.unwrap();
    assert_eq!(poll.total_votes, 2);
    assert_eq!(ctx.votes.count_by_poll("p1").await.unwrap(), 2);

    ctx.finish().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn closed_poll_rejects_cast_without_side_effects() {
    let ctx = TestContext::new().await;
    ctx.create_poll("p1", &["o_red", "o_blue"], |m| {
        m.is_open = Set(false);
    })
    .await;

    let result = ctx
        .vote_service
        .cast("p1", vec!["o_red".to_string()], &anon("anon_voter1"))
        .await;
    assert!(matches!(result, Err(AppError::PollClosed(_))));

    let poll = ctx.polls.get_by_id("p1").await.unwrap();
    assert_eq!(poll.total_votes, 0);
    assert_eq!(ctx.votes.count_by_poll("p1").await.unwrap(), 0);

    ctx.finish().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn option_counts_sum_to_poll_total() {
    let ctx = TestContext::new().await;
    ctx.create_poll("p1", &["o_red", "o_blue", "o_green"], |_| {})
        .await;

    for i in 0..5 {
        let option = match i % 3 {
            0 => "o_red",
            1 => "o_blue",
            _ => "o_green",
        };
        ctx.vote_service
            .cast("p1", vec![option.to_string()], &anon(&format!("anon_voter{i}")))
            .await
            .unwrap();
    }

    let poll = ctx.polls.get_by_id("p1").await.unwrap();
    let options = ctx.options.find_by_poll("p1").await.unwrap();
    let sum: i32 = options.iter().map(|o| o.vote_count).sum();

    assert_eq!(poll.total_votes, 5);
    assert_eq!(sum, poll.total_votes);

    ctx.finish().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn cast_alone_does_not_enforce_voter_uniqueness() {
    // The repeat-voter check lives in the eligibility gate, outside the
    // transaction; two raw casts from the same voter both commit.
    let ctx = TestContext::new().await;
    ctx.create_poll("p1", &["o_red", "o_blue"], |_| {}).await;

    let identity = anon("anon_voter1");
    ctx.vote_service
        .cast("p1", vec!["o_red".to_string()], &identity)
        .await
        .unwrap();
    ctx.vote_service
        .cast("p1", vec!["o_blue".to_string()], &identity)
        .await
        .unwrap();

    assert_eq!(ctx.votes.count_by_poll("p1").await.unwrap(), 2);
    let poll = ctx.polls.get_by_id("p1").await.unwrap();
    assert_eq!(poll.total_votes, 2);

    ctx.finish().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn submit_blocks_repeat_voter() {
    let ctx = TestContext::new().await;
    ctx.create_poll("p1", &["o_red", "o_blue"], |_| {}).await;

    let identity = anon("anon_voter1");
    ctx.vote_service
        .submit("p1", vec!["o_red".to_string()], &identity)
        .await
        .unwrap();

    let second = ctx
        .vote_service
        .submit("p1", vec!["o_blue".to_string()], &identity)
        .await;
    assert!(matches!(second, Err(AppError::Forbidden(_))));
    assert_eq!(ctx.votes.count_by_poll("p1").await.unwrap(), 1);

    ctx.finish().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn submit_appends_ballots_when_change_allowed() {
    let ctx = TestContext::new().await;
    ctx.create_poll("p1", &["o_red", "o_blue"], |m| {
        m.allow_change_vote = Set(true);
    })
    .await;

    let identity = anon("anon_voter1");
    ctx.vote_service
        .submit("p1", vec!["o_red".to_string()], &identity)
        .await
        .unwrap();
    ctx.vote_service
        .submit("p1", vec!["o_blue".to_string()], &identity)
        .await
        .unwrap();

    // Prior ballots are never deleted; the new one is appended
    assert_eq!(ctx.votes.count_by_poll("p1").await.unwrap(), 2);
    let status = ctx.vote_service.vote_status("p1", "anon_voter1").await.unwrap();
    assert_eq!(
        status.option_ids,
        vec!["o_red".to_string(), "o_blue".to_string()]
    );

    ctx.finish().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn submit_rejects_anonymous_on_login_required_poll() {
    let ctx = TestContext::new().await;
    ctx.create_poll("p1", &["o_red", "o_blue"], |m| {
        m.require_login = Set(true);
    })
    .await;

    let result = ctx
        .vote_service
        .submit("p1", vec!["o_red".to_string()], &anon("anon_voter1"))
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized)));
    assert_eq!(ctx.votes.count_by_poll("p1").await.unwrap(), 0);

    ctx.finish().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn create_poll_commits_poll_and_options_together() {
    let ctx = TestContext::new().await;

    let conn = ctx.db.conn.clone();
    let poll_service = PollService::new(
        conn.clone(),
        PollRepository::new(conn.clone()),
        PollOptionRepository::new(conn),
        &test_config(),
    );

    let creator = user::Model {
        id: "u_alice".to_string(),
        username: "alice".to_string(),
        username_lower: "alice".to_string(),
        name: None,
        avatar_url: None,
        password_hash: "hash".to_string(),
        token: Some("token_alice".to_string()),
        created_at: chrono::Utc::now().into(),
        updated_at: None,
    };

    let created = poll_service
        .create(
            &creator,
            CreatePollInput {
                title: "Lunch?".to_string(),
                description: None,
                options: vec!["Pizza".to_string(), "Sushi".to_string()],
                allow_multiple: false,
                require_login: false,
                show_voter_list: true,
                allow_change_vote: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(created.options.len(), 2);

    // Poll row and option rows are visible together after the commit
    let fetched = poll_service.get(&created.poll.id).await.unwrap();
    assert_eq!(fetched.poll.title, "Lunch?");
    assert_eq!(fetched.options.len(), 2);
    assert_eq!(fetched.options[0].text, "Pizza");
    assert_eq!(fetched.options[1].text, "Sushi");

    ctx.finish().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn results_reflect_committed_votes() {
    let ctx = TestContext::new().await;
    ctx.create_poll("p1", &["o_red", "o_blue"], |_| {}).await;

    for i in 0..3 {
        ctx.vote_service
            .cast("p1", vec!["o_red".to_string()], &anon(&format!("anon_voter{i}")))
            .await
            .unwrap();
    }
    ctx.vote_service
        .cast("p1", vec!["o_blue".to_string()], &anon("anon_voter9"))
        .await
        .unwrap();

    let results = ctx.results_service.get_results("p1").await.unwrap();
    assert_eq!(results.total_votes, 4);
    assert_eq!(results.options[0].vote_count, 3);
    assert_eq!(results.options[0].percentage, 75);
    assert_eq!(results.options[1].vote_count, 1);
    assert_eq!(results.options[1].percentage, 25);

    ctx.finish().await;
}
