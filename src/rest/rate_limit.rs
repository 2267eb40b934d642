//! Per-origin request quota for the REST API.
//!
//! Sliding one-minute window per client IP. Requests over the quota get a
//! 429 with the standard error envelope.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::AppContext;

const WINDOW: Duration = Duration::from_secs(60);

pub struct RateLimiter {
    max_per_minute: u32,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a hit for `origin`. Returns `false` when the origin is over
    /// its quota for the current window.
    pub fn check(&self, origin: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().expect("rate limiter lock");

        // Drop windows that have gone fully stale so the map cannot grow
        // without bound.
        hits.retain(|_, stamps| stamps.iter().any(|t| now.duration_since(*t) < WINDOW));

        let stamps = hits.entry(origin.to_string()).or_default();
        stamps.retain(|t| now.duration_since(*t) < WINDOW);
        if stamps.len() >= self.max_per_minute as usize {
            return false;
        }
        stamps.push(now);
        true
    }
}

pub async fn enforce(
    State(ctx): State<Arc<AppContext>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "local".to_string());

    if !ctx.limiter.check(&origin) {
        warn!(origin = %origin, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error_code": "rate_limited",
                "message": format!(
                    "rate limit exceeded: maximum {} requests per minute",
                    ctx.config.rate_limit_per_minute
                ),
                "timestamp": chrono::Utc::now(),
            })),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_quota_then_blocks() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("1.2.3.4"));
        assert!(!limiter.check("1.2.3.4"));
    }

    #[test]
    fn origins_are_independent() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("5.6.7.8"));
        assert!(!limiter.check("1.2.3.4"));
    }
}
