use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use reviewd::config::{DaemonConfig, LlmSettings};
use reviewd::llm::HttpLlmGateway;
use reviewd::rest::{self, rate_limit::RateLimiter};
use reviewd::service::ReviewService;
use reviewd::store::ReviewStore;
use reviewd::AppContext;

#[derive(Parser)]
#[command(
    name = "reviewd",
    about = "Automated pull-request review daemon",
    version
)]
struct Args {
    /// HTTP API bind address
    #[arg(long, default_value = "127.0.0.1", env = "REVIEWD_HOST")]
    host: String,

    /// HTTP API port
    #[arg(long, default_value_t = 4400, env = "REVIEWD_PORT")]
    port: u16,

    /// Data directory for the SQLite database
    #[arg(long, env = "REVIEWD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "REVIEWD_LOG")]
    log: String,

    /// API key for the model service
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    llm_api_key: String,

    /// OpenAI-compatible chat-completions base URL
    #[arg(long, env = "LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// Model override; defaults to the per-analyzer model table
    #[arg(long, env = "LLM_MODEL")]
    llm_model: Option<String>,

    /// Hosted-repo access token (required for private repositories)
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Per-origin API quota (requests per minute)
    #[arg(long, default_value_t = 10, env = "REVIEWD_RATE_LIMIT")]
    rate_limit: u32,

    /// Per-analyzer deadline in seconds
    #[arg(long, default_value_t = 300, env = "REVIEWD_ANALYZER_TIMEOUT")]
    analyzer_timeout: u64,

    /// Whole-review deadline in seconds
    #[arg(long, default_value_t = 600, env = "REVIEWD_REVIEW_TIMEOUT")]
    review_timeout: u64,

    /// Maximum files per reviewed diff
    #[arg(long, default_value_t = 50, env = "REVIEWD_MAX_FILES")]
    max_files: usize,

    /// Maximum diff size in lines
    #[arg(long, default_value_t = 10_000, env = "REVIEWD_MAX_DIFF_LINES")]
    max_diff_lines: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log)
        .compact()
        .init();

    let mut config = DaemonConfig::new(args.host, args.port, args.data_dir, args.log);
    config.llm = LlmSettings {
        api_key: Some(args.llm_api_key),
        model: args.llm_model,
        ..LlmSettings::default()
    };
    if let Some(base_url) = args.llm_base_url {
        config.llm.base_url = base_url;
    }
    config.github_token = args.github_token;
    config.rate_limit_per_minute = args.rate_limit;
    config.analyzer_timeout = std::time::Duration::from_secs(args.analyzer_timeout);
    config.review_timeout = std::time::Duration::from_secs(args.review_timeout);
    config.max_files_per_review = args.max_files;
    config.max_diff_lines = args.max_diff_lines;
    let config = Arc::new(config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        data_dir = %config.data_dir.display(),
        "reviewd starting"
    );

    let store = ReviewStore::open(&config.data_dir)
        .await
        .context("opening review store")?;

    let gateway = Arc::new(HttpLlmGateway::new(&config.llm).context("initializing LLM gateway")?);

    let service = Arc::new(ReviewService::new(
        Arc::clone(&config),
        gateway,
        store.clone(),
    ));

    let ctx = Arc::new(AppContext {
        limiter: RateLimiter::new(config.rate_limit_per_minute),
        config,
        service,
        store,
        started_at: std::time::Instant::now(),
    });

    rest::start_rest_server(ctx).await
}
