//! API integration tests.
//!
//! These tests verify the API endpoints work correctly together.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::redundant_clone)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use pollo_api::{RateLimiterState, StreamingState, middleware::AppState, router as api_router};
use pollo_common::config::{Config, DatabaseConfig, ServerConfig};
use pollo_core::{ExportService, PollService, ResultsService, UserService, VoteService};
use pollo_db::entities::poll;
use pollo_db::repositories::{
    PollOptionRepository, PollRepository, UserRepository, VoteRepository,
};
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
use std::sync::Arc;
use tower::ServiceExt;

/// Create a test configuration.
fn create_test_config() -> Config {
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

/// Create a mock database connection.
fn create_mock_db() -> DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }])
        .into_connection()
}

/// Create test app state over the given database.
fn create_test_state(db: DatabaseConnection) -> AppState {
    let db = Arc::new(db);
    let config = create_test_config();

    let user_repo = UserRepository::new(Arc::clone(&db));
    let poll_repo = PollRepository::new(Arc::clone(&db));
    let option_repo = PollOptionRepository::new(Arc::clone(&db));
    let vote_repo = VoteRepository::new(Arc::clone(&db));

    let user_service = UserService::new(user_repo);
    let poll_service = PollService::new(
        Arc::clone(&db),
        poll_repo.clone(),
        option_repo.clone(),
        &config,
    );
    let vote_service = VoteService::new(Arc::clone(&db), poll_repo.clone(), vote_repo.clone());
    let results_service =
        ResultsService::new(poll_repo.clone(), option_repo.clone(), vote_repo.clone());
    let export_service = ExportService::new(poll_repo, option_repo, vote_repo);

    AppState {
        user_service,
        poll_service,
        vote_service,
        results_service,
        export_service,
        streaming: StreamingState::new(),
    }
}

/// Create the test router over an empty mock database.
fn create_test_router() -> Router {
    create_test_router_with(create_mock_db())
}

/// Create the test router over a prepared mock database.
fn create_test_router_with(db: DatabaseConnection) -> Router {
    api_router(RateLimiterState::new()).with_state(create_test_state(db))
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let app = create_test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/nonexistent/endpoint")
                .method("GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signup_with_invalid_json_returns_error() {
    let app = create_test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/signup")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from("invalid json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(
        response.status() == StatusCode::BAD_REQUEST
            || response.status() == StatusCode::UNPROCESSABLE_ENTITY
    );
}

#[tokio::test]
async fn test_signup_with_short_password_returns_validation_error() {
    let app = create_test_router();

    // Rejected by request validation before any database access
    let response = app
        .oneshot(
            Request::builder()
                .uri("/signup")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"username":"alice","password":"short"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signup_tier_limits_repeated_attempts() {
    let app = create_test_router();

    let signup_request = || {
        Request::builder()
            .uri("/signup")
            .method("POST")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"username":"alice","password":"short"}"#))
            .unwrap()
    };

    // The signup tier allows 5 attempts per window, counted before the
    // handler runs, so even rejected bodies spend the budget
    for _ in 0..5 {
        let response = app.clone().oneshot(signup_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app.oneshot(signup_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_signin_without_credentials_returns_error() {
    let app = create_test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/signin")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"username":"nonexistent","password":"wrongpassword"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    // Mock DB has no user row; exact status depends on where the lookup fails
    let status = response.status();
    assert!(
        status == StatusCode::BAD_REQUEST
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn test_create_poll_requires_auth() {
    let app = create_test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/polls/create")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"title":"Lunch?","options":["Pizza","Sushi"]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_vote_without_identity_returns_bad_request() {
    let app = create_test_router();

    // No bearer token and no voterId: rejected before touching the poll
    let response = app
        .oneshot(
            Request::builder()
                .uri("/polls/vote")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"pollId":"poll1","optionIds":["opt1"]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_vote_with_malformed_anon_id_rejected() {
    let app = create_test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/polls/vote")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"pollId":"poll1","optionIds":["opt1"],"voterId":"not-a-valid-id"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_show_unknown_poll_returns_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<poll::Model>::new()])
        .into_connection();
    let app = create_test_router_with(db);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/polls/show")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"pollId":"missing"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_embed_show_unknown_poll_returns_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<poll::Model>::new()])
        .into_connection();
    let app = create_test_router_with(db);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/embed/show")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"pollId":"missing"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_has_voted_without_identity_returns_empty_status() {
    let app = create_test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/polls/has-voted")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"pollId":"poll1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["hasVoted"], false);
    assert_eq!(body["data"]["optionIds"], serde_json::json!([]));
}

#[tokio::test]
async fn test_sse_poll_stream_returns_stream() {
    let app = create_test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/streaming/sse/poll/poll1")
                .method("GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // SSE returns text/event-stream content type
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap_or(""));
    assert!(content_type.is_some());
    assert!(content_type.unwrap().contains("text/event-stream"));
}
