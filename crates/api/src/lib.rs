//! HTTP API layer for pollo-rs.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: poll lifecycle, voting, results, auth, embeds
//! - **Extractors**: bearer-token authentication
//! - **Middleware**: auth resolution, rate limiting
//! - **Streaming**: WebSocket and Server-Sent Events
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod rate_limit;
pub mod response;
pub mod sse;
pub mod streaming;

pub use endpoints::router;
pub use rate_limit::{ApiRateLimiter, RateLimitConfig, RateLimiterState};
pub use streaming::{PollEvent, StreamingEventPublisher, StreamingState, streaming_handler};
