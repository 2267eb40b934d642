// SPDX-License-Identifier: MIT
//! Change fetcher — pull-request metadata and diff from the GitHub API.
//!
//! Two provider operations: *metadata* (`GET /repos/{repo}/pulls/{n}`) and
//! *diff* (same URL with the diff media type). Transient failures retry with
//! backoff; the access token goes into the outbound request only and is
//! scrubbed from every error message.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::PrMetadata;
use crate::redact::Redactor;
use crate::retry::{retry_with_backoff, RetryConfig};

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    NotFound,
    Auth,
    RateLimited,
    Transport,
    UrlFormat,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::NotFound => "not_found",
            FetchErrorKind::Auth => "auth",
            FetchErrorKind::RateLimited => "rate_limited",
            FetchErrorKind::Transport => "transport",
            FetchErrorKind::UrlFormat => "url_format",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("change source {}: {message}", kind.as_str())]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Transport | FetchErrorKind::RateLimited
        )
    }
}

// ─── PR URL parsing ───────────────────────────────────────────────────────────

static PR_URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"github\.com/([^/\s]+/[^/\s]+)/pull/(\d+)").expect("regex: pull url"),
        Regex::new(r"github\.com/([^/\s]+/[^/\s]+)/pulls/(\d+)").expect("regex: pulls url"),
        Regex::new(r"api\.github\.com/repos/([^/\s]+/[^/\s]+)/pulls/(\d+)")
            .expect("regex: api url"),
    ]
});

/// Extract `(owner/name, pr_number)` from a GitHub pull-request URL.
/// Malformed inputs fail deterministically with `url_format`.
pub fn parse_pr_url(url: &str) -> Result<(String, u64), FetchError> {
    for pattern in PR_URL_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(url) {
            let repository = caps[1].to_string();
            let pr_number: u64 = caps[2]
                .parse()
                .map_err(|_| FetchError::new(FetchErrorKind::UrlFormat, "PR number overflow"))?;
            return Ok((repository, pr_number));
        }
    }
    Err(FetchError::new(
        FetchErrorKind::UrlFormat,
        format!("invalid pull request URL: {url} (expected https://github.com/owner/repo/pull/123)"),
    ))
}

/// Basic shape check for an `owner/name` repository string.
pub fn validate_repository(repo: &str) -> Result<(), FetchError> {
    let mut parts = repo.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(()),
        _ => Err(FetchError::new(
            FetchErrorKind::UrlFormat,
            format!("repository must be owner/name, got {repo:?}"),
        )),
    }
}

// ─── Fetcher ──────────────────────────────────────────────────────────────────

pub struct ChangeFetcher {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
    redactor: Redactor,
}

impl ChangeFetcher {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("reviewd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::new(FetchErrorKind::Transport, e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            redactor: Redactor::new(token.iter().cloned()),
            token,
        })
    }

    /// Fetch metadata and unified diff for one pull request.
    pub async fn fetch(
        &self,
        repository: &str,
        pr_number: u64,
    ) -> Result<(PrMetadata, String), FetchError> {
        validate_repository(repository)?;
        let metadata = self.fetch_metadata(repository, pr_number).await?;
        let diff = self.fetch_diff(repository, pr_number).await?;
        Ok((metadata, diff))
    }

    async fn fetch_metadata(
        &self,
        repository: &str,
        pr_number: u64,
    ) -> Result<PrMetadata, FetchError> {
        let url = format!("{}/repos/{}/pulls/{}", self.api_base, repository, pr_number);
        let body: serde_json::Value = self
            .get_with_retry(&url, "application/vnd.github.v3+json")
            .await?
            .json()
            .await
            .map_err(|e| self.transport_err(e))?;

        let text = |v: &serde_json::Value| v.as_str().unwrap_or_default().to_string();
        Ok(PrMetadata {
            repository: repository.to_string(),
            pr_number,
            title: text(&body["title"]),
            author: text(&body["user"]["login"]),
            head_commit_sha: text(&body["head"]["sha"]),
            base_branch: text(&body["base"]["ref"]),
            head_branch: text(&body["head"]["ref"]),
        })
    }

    async fn fetch_diff(&self, repository: &str, pr_number: u64) -> Result<String, FetchError> {
        let url = format!("{}/repos/{}/pulls/{}", self.api_base, repository, pr_number);
        self.get_with_retry(&url, "application/vnd.github.v3.diff")
            .await?
            .text()
            .await
            .map_err(|e| self.transport_err(e))
    }

    /// One GET with the given accept header, retried on transient failures.
    async fn get_with_retry(
        &self,
        url: &str,
        accept: &str,
    ) -> Result<reqwest::Response, FetchError> {
        let retry = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: Duration::ZERO,
        };
        retry_with_backoff(&retry, FetchError::is_transient, || self.get_once(url, accept)).await
    }

    async fn get_once(&self, url: &str, accept: &str) -> Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(url).header("Accept", accept);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.transport_err(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = self.redactor.scrub(&format!("status {status}: {body}"));
        Err(match status.as_u16() {
            401 => FetchError::new(FetchErrorKind::Auth, message),
            403 if body.to_lowercase().contains("rate limit") => {
                FetchError::new(FetchErrorKind::RateLimited, message)
            }
            403 => FetchError::new(FetchErrorKind::Auth, message),
            404 => FetchError::new(
                FetchErrorKind::NotFound,
                "repository or pull request not found",
            ),
            429 => FetchError::new(FetchErrorKind::RateLimited, message),
            _ => FetchError::new(FetchErrorKind::Transport, message),
        })
    }

    fn transport_err(&self, e: reqwest::Error) -> FetchError {
        FetchError::new(
            FetchErrorKind::Transport,
            self.redactor.scrub(&e.to_string()),
        )
    }
}
