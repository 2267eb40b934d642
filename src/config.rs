use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the daemon, built in `main.rs` from CLI flags
/// and environment variables.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    pub llm: LlmSettings,
    /// Hosted-repo access token. Required for private repositories only;
    /// a per-request token overrides it.
    pub github_token: Option<String>,
    pub github_api_base: String,
    /// Per-origin request quota for the REST API.
    pub rate_limit_per_minute: u32,
    pub analyzer_timeout: Duration,
    pub review_timeout: Duration,
    pub max_files_per_review: usize,
    pub max_diff_lines: usize,
}

/// Settings for the external model service.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// OpenAI-compatible chat-completions endpoint base.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Overrides the per-agent model table when set.
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            api_key: None,
            model: None,
            temperature: 0.1,
            max_tokens: 4000,
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl DaemonConfig {
    pub fn new(host: String, port: u16, data_dir: Option<PathBuf>, log: String) -> Self {
        Self {
            host,
            port,
            data_dir: data_dir.unwrap_or_else(default_data_dir),
            log,
            llm: LlmSettings::default(),
            github_token: None,
            github_api_base: "https://api.github.com".to_string(),
            rate_limit_per_minute: 10,
            analyzer_timeout: Duration::from_secs(300),
            review_timeout: Duration::from_secs(600),
            max_files_per_review: 50,
            max_diff_lines: 10_000,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("reviewd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/reviewd or ~/.local/share/reviewd
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("reviewd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("reviewd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("reviewd");
        }
    }
    // Fallback
    PathBuf::from(".reviewd")
}
