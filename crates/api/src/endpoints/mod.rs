//! API endpoints.

mod auth;
mod embed;
mod polls;

use axum::Router;

use crate::middleware::AppState;
use crate::rate_limit::RateLimiterState;
use crate::sse;

/// Create the API router. Tiered rate limits attach to the mutation,
/// export, and auth routes; the caller layers the standard tier.
pub fn router(rate_limiter: RateLimiterState) -> Router<AppState> {
    Router::new()
        .merge(auth::router(rate_limiter.clone()))
        .nest("/polls", polls::router(rate_limiter))
        .nest("/embed", embed::router())
        .nest("/streaming/sse", sse::router())
}
