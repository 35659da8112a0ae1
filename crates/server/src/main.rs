//! Pollo server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware, routing::get};
use pollo_api::{
    StreamingEventPublisher, StreamingState, middleware::AppState,
    rate_limit::RateLimiterState, router as api_router, streaming_handler,
};
use pollo_common::Config;
use pollo_core::{
    EventPublisherService, ExportService, PollService, ResultsService, UserService, VoteService,
};
use pollo_db::repositories::{
    PollOptionRepository, PollRepository, UserRepository, VoteRepository,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pollo=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting pollo server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = pollo_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    pollo_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let db = Arc::new(db);
    let user_repo = UserRepository::new(Arc::clone(&db));
    let poll_repo = PollRepository::new(Arc::clone(&db));
    let option_repo = PollOptionRepository::new(Arc::clone(&db));
    let vote_repo = VoteRepository::new(Arc::clone(&db));

    // Initialize services
    let user_service = UserService::new(user_repo);
    let mut poll_service = PollService::new(
        Arc::clone(&db),
        poll_repo.clone(),
        option_repo.clone(),
        &config,
    );
    let mut vote_service = VoteService::new(Arc::clone(&db), poll_repo.clone(), vote_repo.clone());
    let results_service =
        ResultsService::new(poll_repo.clone(), option_repo.clone(), vote_repo.clone());
    let export_service = ExportService::new(poll_repo, option_repo, vote_repo);

    // Initialize streaming state and wire it into the mutating services
    let streaming = StreamingState::new();
    let event_publisher: EventPublisherService =
        Arc::new(StreamingEventPublisher::new(streaming.clone()));
    poll_service.set_event_publisher(event_publisher.clone());
    vote_service.set_event_publisher(event_publisher);

    // Initialize rate limiter
    let rate_limiter = RateLimiterState::new();

    // Periodically drop idle rate-limit keys and poll channels
    let cleanup_limiter = rate_limiter.clone();
    let cleanup_streaming = streaming.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            cleanup_limiter.user_limiter.cleanup(3600).await;
            cleanup_limiter.ip_limiter.cleanup(3600).await;
            cleanup_streaming.cleanup().await;
        }
    });

    // Create app state
    let state = AppState {
        user_service,
        poll_service,
        vote_service,
        results_service,
        export_service,
        streaming,
    };

    // Build router
    let app = Router::new()
        .route("/streaming", get(streaming_handler))
        .nest("/api", api_router(rate_limiter.clone()))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            pollo_api::rate_limit::rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            pollo_api::middleware::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
