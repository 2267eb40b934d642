pub mod analyzers;
pub mod config;
pub mod diff;
pub mod fetch;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod redact;
pub mod report;
pub mod rest;
pub mod retry;
pub mod service;
pub mod store;

use std::sync::Arc;

use config::DaemonConfig;
use rest::rate_limit::RateLimiter;
use service::ReviewService;
use store::ReviewStore;

/// Shared application state passed to every route handler.
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub service: Arc<ReviewService>,
    pub store: ReviewStore,
    pub limiter: RateLimiter,
    pub started_at: std::time::Instant,
}
