//! API rate limiting.
//!
//! A fixed-window, in-memory limiter keyed by user id for signed-in
//! callers and by client IP otherwise. The standard tier wraps the
//! whole API in the binary; poll mutations, CSV export, and the auth
//! endpoints carry tighter tiers layered on their routes.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::RwLock;

/// Requests allowed per fixed window.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Per-tier limits.
pub mod limits {
    use super::RateLimitConfig;

    /// Reads: poll views, results, vote-status lookups.
    pub const STANDARD: RateLimitConfig = RateLimitConfig::new(300, 60);

    /// Mutations: casting votes, creating/toggling/deleting polls.
    pub const WRITE: RateLimitConfig = RateLimitConfig::new(30, 60);

    /// Expensive reads: CSV export.
    pub const HEAVY: RateLimitConfig = RateLimitConfig::new(10, 60);

    /// Signin attempts.
    pub const AUTH: RateLimitConfig = RateLimitConfig::new(10, 300);

    /// Account creation.
    pub const SIGNUP: RateLimitConfig = RateLimitConfig::new(5, 3600);
}

/// One key's current window.
#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window request counters over a shared key map.
#[derive(Clone, Default)]
pub struct ApiRateLimiter {
    windows: Arc<RwLock<HashMap<String, Window>>>,
}

impl ApiRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request against `key`, rolling the window over when it
    /// has lapsed.
    pub async fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        let mut windows = self.windows.write().await;
        let now = Instant::now();
        let window = Duration::from_secs(config.window_secs);

        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(entry.started) >= window {
            entry.count = 0;
            entry.started = now;
        }

        let reset = window
            .saturating_sub(now.duration_since(entry.started))
            .as_secs();

        if entry.count >= config.max_requests {
            return RateLimitResult::Limited {
                retry_after: reset,
                remaining: 0,
                limit: config.max_requests,
            };
        }

        entry.count += 1;
        RateLimitResult::Allowed {
            remaining: config.max_requests.saturating_sub(entry.count),
            limit: config.max_requests,
            reset,
        }
    }

    /// Drop windows that lapsed more than one extra window ago.
    pub async fn cleanup(&self, max_window_secs: u64) {
        let mut windows = self.windows.write().await;
        let cutoff = Duration::from_secs(max_window_secs * 2);
        let now = Instant::now();

        windows.retain(|_, w| now.duration_since(w.started) < cutoff);
    }

    /// Number of tracked keys.
    pub async fn key_count(&self) -> usize {
        self.windows.read().await.len()
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone)]
pub enum RateLimitResult {
    Allowed {
        remaining: u32,
        limit: u32,
        /// Seconds until the window resets.
        reset: u64,
    },
    Limited {
        retry_after: u64,
        remaining: u32,
        limit: u32,
    },
}

/// Shared limiter pair handed to the middleware layers.
#[derive(Clone, Default)]
pub struct RateLimiterState {
    /// Counters for signed-in callers, keyed by user id.
    pub user_limiter: ApiRateLimiter,
    /// Counters for everyone else, keyed by client IP.
    pub ip_limiter: ApiRateLimiter,
}

impl RateLimiterState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// 429 response with a Retry-After hint.
#[derive(Debug)]
pub struct RateLimitError {
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "RATE_LIMIT_EXCEEDED",
                "message": "Too many requests",
                "retryAfter": self.retry_after
            }
        });

        (
            StatusCode::TOO_MANY_REQUESTS,
            [
                ("Retry-After", self.retry_after.to_string()),
                ("Content-Type", "application/json".to_string()),
            ],
            body.to_string(),
        )
            .into_response()
    }
}

/// Client address from proxy headers; direct connections have neither.
fn client_ip(req: &Request<Body>) -> Option<IpAddr> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
        && let Ok(ip) = first.trim().parse::<IpAddr>()
    {
        return Some(ip);
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && let Ok(ip) = value.parse::<IpAddr>()
    {
        return Some(ip);
    }

    None
}

/// Standard tier, layered on the whole API.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiterState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, RateLimitError> {
    limit_request(limiter, req, next, &limits::STANDARD).await
}

/// Write tier for poll mutations and vote casting.
pub async fn rate_limit_write_middleware(
    State(limiter): State<RateLimiterState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, RateLimitError> {
    limit_request(limiter, req, next, &limits::WRITE).await
}

/// Heavy tier for CSV export.
pub async fn rate_limit_heavy_middleware(
    State(limiter): State<RateLimiterState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, RateLimitError> {
    limit_request(limiter, req, next, &limits::HEAVY).await
}

/// Auth tier for signin attempts.
pub async fn rate_limit_auth_middleware(
    State(limiter): State<RateLimiterState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, RateLimitError> {
    limit_request(limiter, req, next, &limits::AUTH).await
}

/// Signup tier for account creation.
pub async fn rate_limit_signup_middleware(
    State(limiter): State<RateLimiterState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, RateLimitError> {
    limit_request(limiter, req, next, &limits::SIGNUP).await
}

async fn limit_request(
    limiter: RateLimiterState,
    req: Request<Body>,
    next: Next,
    config: &RateLimitConfig,
) -> Result<Response, RateLimitError> {
    // The auth middleware stores the user model in extensions; without
    // it we fall back to the client IP, and failing that a shared key.
    let result = if let Some(user) = req.extensions().get::<pollo_db::entities::user::Model>() {
        let key = format!("user:{}", user.id);
        limiter.user_limiter.check(&key, config).await
    } else if let Some(ip) = client_ip(&req) {
        let key = format!("ip:{ip}");
        limiter.ip_limiter.check(&key, config).await
    } else {
        limiter.ip_limiter.check("unknown", config).await
    };

    match result {
        RateLimitResult::Allowed {
            remaining,
            limit,
            reset,
        } => {
            let mut response = next.run(req).await;

            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", limit.into());
            headers.insert("X-RateLimit-Remaining", remaining.into());
            headers.insert("X-RateLimit-Reset", reset.into());

            Ok(response)
        }
        RateLimitResult::Limited { retry_after, .. } => Err(RateLimitError { retry_after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limiter_allows_up_to_the_configured_count() {
        let limiter = ApiRateLimiter::new();
        let config = RateLimitConfig::new(5, 60);

        for _ in 0..5 {
            match limiter.check("voter", &config).await {
                RateLimitResult::Allowed { .. } => {}
                RateLimitResult::Limited { .. } => panic!("Expected Allowed"),
            }
        }
    }

    #[tokio::test]
    async fn limiter_blocks_once_the_window_is_spent() {
        let limiter = ApiRateLimiter::new();
        let config = RateLimitConfig::new(3, 60);

        for _ in 0..3 {
            limiter.check("voter", &config).await;
        }

        match limiter.check("voter", &config).await {
            RateLimitResult::Limited { retry_after, .. } => assert!(retry_after > 0),
            RateLimitResult::Allowed { .. } => panic!("Expected Limited"),
        }
    }

    #[tokio::test]
    async fn limiter_tracks_keys_independently() {
        let limiter = ApiRateLimiter::new();
        let config = RateLimitConfig::new(2, 60);

        limiter.check("voter_a", &config).await;
        limiter.check("voter_a", &config).await;

        match limiter.check("voter_b", &config).await {
            RateLimitResult::Allowed { .. } => {}
            RateLimitResult::Limited { .. } => panic!("Expected Allowed for voter_b"),
        }
    }

    #[tokio::test]
    async fn allowed_result_reports_remaining_budget() {
        let limiter = ApiRateLimiter::new();
        let config = RateLimitConfig::new(10, 60);

        match limiter.check("voter", &config).await {
            RateLimitResult::Allowed {
                remaining,
                limit,
                reset,
            } => {
                assert_eq!(limit, 10);
                assert_eq!(remaining, 9);
                assert!(reset <= 60);
            }
            RateLimitResult::Limited { .. } => panic!("Expected Allowed"),
        }
    }

    #[tokio::test]
    async fn cleanup_keeps_windows_inside_the_grace_period() {
        let limiter = ApiRateLimiter::new();
        let config = RateLimitConfig::new(10, 60);

        limiter.check("voter_a", &config).await;
        limiter.check("voter_b", &config).await;
        assert_eq!(limiter.key_count().await, 2);

        // Both windows are fresh, so a cleanup pass keeps them
        limiter.cleanup(60).await;
        assert_eq!(limiter.key_count().await, 2);
    }
}
