// SPDX-License-Identifier: MIT
//! LLM gateway — one chat-completions request per invocation.
//!
//! The gateway is shared by all analyzers and is safe for concurrent calls;
//! its only cross-call mutable state is a request counter used to derive
//! backoff jitter. Credentials live inside the gateway and are scrubbed
//! from every error message before it leaves this module.

use std::sync::atomic::AtomicU64;
use std::time::Duration;

use serde_json::json;

use crate::config::LlmSettings;
use crate::redact::Redactor;
use crate::retry::{counter_jitter, retry_with_backoff, RetryConfig};

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    Timeout,
    Transport,
    Auth,
    RateLimited,
    Parse,
}

impl LlmErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmErrorKind::Timeout => "timeout",
            LlmErrorKind::Transport => "transport",
            LlmErrorKind::Auth => "auth",
            LlmErrorKind::RateLimited => "rate_limited",
            LlmErrorKind::Parse => "parse",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("llm {}: {message}", kind.as_str())]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// Whether another attempt could plausibly succeed. Auth failures and
    /// deterministic client errors are final; transport hiccups and rate
    /// limits are not.
    pub retryable: bool,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        let retryable = matches!(kind, LlmErrorKind::Transport | LlmErrorKind::RateLimited);
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    fn terminal(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: false,
        }
    }
}

// ─── Agent → model binding ────────────────────────────────────────────────────

/// Static analyzer-to-model table. Unknown agent IDs fall back to
/// [`DEFAULT_MODEL`].
const AGENT_MODELS: &[(&str, &str)] = &[
    ("logic_analyzer", "meta/llama-3.1-70b-instruct"),
    ("readability_analyzer", "meta/llama-3.1-70b-instruct"),
    ("performance_analyzer", "meta/llama-3.1-70b-instruct"),
    // Strongest model for security
    ("security_analyzer", "meta/llama-3.1-405b-instruct"),
];

pub const DEFAULT_MODEL: &str = "meta/llama-3.1-8b-instruct";

pub fn model_for(agent_id: &str) -> &'static str {
    AGENT_MODELS
        .iter()
        .find(|(id, _)| *id == agent_id)
        .map(|(_, model)| *model)
        .unwrap_or(DEFAULT_MODEL)
}

// ─── Call options ─────────────────────────────────────────────────────────────

/// Per-call parameters. `model: None` selects from the agent table.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.1,
            max_tokens: 4000,
            timeout: Duration::from_secs(300),
        }
    }
}

impl CallOptions {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: settings.request_timeout,
        }
    }
}

// ─── Client trait ─────────────────────────────────────────────────────────────

/// Seam between analyzers and the model service. Tests substitute a stub;
/// production uses [`HttpLlmGateway`].
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one (system, user) message pair and return the raw reply text.
    async fn invoke(
        &self,
        agent_id: &str,
        system_prompt: &str,
        user_prompt: &str,
        opts: &CallOptions,
    ) -> Result<String, LlmError>;
}

// ─── HTTP gateway ─────────────────────────────────────────────────────────────

/// Gateway to an OpenAI-compatible chat-completions endpoint.
pub struct HttpLlmGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    redactor: Redactor,
    /// Request counter; feeds backoff jitter, nothing else.
    requests: AtomicU64,
}

impl HttpLlmGateway {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| LlmError::terminal(LlmErrorKind::Auth, "no LLM API key configured"))?;
        // Timeouts are enforced per call; the builder only pins connect time.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::terminal(LlmErrorKind::Transport, e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            redactor: Redactor::new([api_key.clone()]),
            api_key,
            requests: AtomicU64::new(0),
        })
    }

    async fn request_once(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        opts: &CallOptions,
    ) -> Result<String, LlmError> {
        let payload = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": opts.temperature,
            "max_tokens": opts.max_tokens,
        });

        let send = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send();

        let response = match tokio::time::timeout(opts.timeout, send).await {
            Err(_) => {
                return Err(LlmError::terminal(
                    LlmErrorKind::Timeout,
                    format!("no reply within {}s", opts.timeout.as_secs()),
                ))
            }
            Ok(Err(e)) => {
                return Err(LlmError::new(
                    LlmErrorKind::Transport,
                    self.redactor.scrub(&e.to_string()),
                ))
            }
            Ok(Ok(r)) => r,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = self.redactor.scrub(&format!("status {status}: {body}"));
            return Err(match status.as_u16() {
                401 | 403 => LlmError::terminal(LlmErrorKind::Auth, message),
                429 => LlmError::new(LlmErrorKind::RateLimited, message),
                code if code >= 500 => LlmError::new(LlmErrorKind::Transport, message),
                // Other 4xx are deterministic client errors — never retried.
                _ => LlmError::terminal(LlmErrorKind::Transport, message),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::terminal(LlmErrorKind::Parse, self.redactor.scrub(&e.to_string())))?;

        extract_content(&body)
            .ok_or_else(|| LlmError::terminal(LlmErrorKind::Parse, "reply has no message content"))
    }
}

/// Pull the assistant text out of a chat-completions reply. Thinking models
/// sometimes put their text in `reasoning_content` instead of `content`.
fn extract_content(body: &serde_json::Value) -> Option<String> {
    let message = body.get("choices")?.get(0)?.get("message")?;
    message
        .get("content")
        .and_then(|v| v.as_str())
        .or_else(|| message.get("reasoning_content").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

#[async_trait::async_trait]
impl LlmClient for HttpLlmGateway {
    async fn invoke(
        &self,
        agent_id: &str,
        system_prompt: &str,
        user_prompt: &str,
        opts: &CallOptions,
    ) -> Result<String, LlmError> {
        let model = opts
            .model
            .clone()
            .unwrap_or_else(|| model_for(agent_id).to_string());

        // One initial attempt plus two retries on transient failures.
        // Timeouts are not retried here — the analyzer deadline governs.
        let retry = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: counter_jitter(&self.requests, Duration::from_millis(250)),
        };

        retry_with_backoff(&retry, |e: &LlmError| e.retryable, || {
            self.request_once(&model, system_prompt, user_prompt, opts)
        })
        .await
    }
}
