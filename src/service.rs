// SPDX-License-Identifier: MIT
//! Review service — the end-to-end pipeline controller.
//!
//! fetch → parse → orchestrate → aggregate → persist. Pre-analyzer errors
//! (validation, fetch, parse) abort the pipeline; analyzer failures are
//! demoted to diagnostics; a storage failure on the final save still fails
//! the review; the review-level deadline aborts without persisting.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::config::DaemonConfig;
use crate::diff::{self, ParseError};
use crate::fetch::{parse_pr_url, ChangeFetcher, FetchError};
use crate::llm::{CallOptions, LlmClient};
use crate::models::{
    AnalyzerFailure, ChangeSource, PrMetadata, ReviewConfig, ReviewContext, ReviewResult,
};
use crate::orchestrator::Orchestrator;
use crate::report::{build_report, Comment};
use crate::store::ReviewStore;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("validation: {0}")]
    Validation(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("storage: {0}")]
    Storage(String),
    #[error("review cancelled: global deadline exceeded")]
    Cancelled,
}

/// Everything one review run produced. `result` is the persisted part;
/// markdown and diagnostics only travel in the response.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub result: ReviewResult,
    pub markdown: String,
    pub comments: Vec<Comment>,
    pub diagnostics: Vec<AnalyzerFailure>,
}

// ─── Service ──────────────────────────────────────────────────────────────────

pub struct ReviewService {
    config: Arc<DaemonConfig>,
    gateway: Arc<dyn LlmClient>,
    store: ReviewStore,
}

impl ReviewService {
    pub fn new(config: Arc<DaemonConfig>, gateway: Arc<dyn LlmClient>, store: ReviewStore) -> Self {
        Self {
            config,
            gateway,
            store,
        }
    }

    /// Run the full pipeline for one change source.
    pub async fn review(
        &self,
        source: ChangeSource,
        config: ReviewConfig,
    ) -> Result<ReviewOutcome, ReviewError> {
        if config.enabled_categories.is_empty() {
            return Err(ReviewError::Validation(
                "at least one analysis category must be enabled".to_string(),
            ));
        }

        let (metadata, diff_text) = self.resolve_source(source).await?;

        let line_count = diff_text.lines().count();
        if line_count > self.config.max_diff_lines {
            return Err(ReviewError::Validation(format!(
                "diff has {line_count} lines, exceeding the limit of {}",
                self.config.max_diff_lines
            )));
        }

        let parsed = diff::parse(&diff_text)?;
        if parsed.files.len() > self.config.max_files_per_review {
            return Err(ReviewError::Validation(format!(
                "diff touches {} files, exceeding the limit of {}",
                parsed.files.len(),
                self.config.max_files_per_review
            )));
        }

        info!(
            repository = %metadata.repository,
            pr_number = metadata.pr_number,
            files = parsed.files.len(),
            "starting review"
        );

        // Nothing reviewable: complete with zero findings instead of
        // bothering the analyzers.
        let (findings, diagnostics) = if parsed.files_analyzed() == 0 {
            (Vec::new(), Vec::new())
        } else {
            let ctx = Arc::new(ReviewContext {
                diff: parsed.clone(),
                config: config.clone(),
                metadata: Some(metadata.clone()),
            });
            let orchestrator = Orchestrator::new(
                Arc::clone(&self.gateway),
                self.config.analyzer_timeout,
                CallOptions::from_settings(&self.config.llm),
            );
            match tokio::time::timeout(self.config.review_timeout, orchestrator.run(ctx)).await {
                Ok(outcome) => outcome,
                // Completed analyzers' findings are discarded; nothing is
                // persisted for a cancelled review.
                Err(_) => return Err(ReviewError::Cancelled),
            }
        };

        let report = build_report(findings, &parsed, &config);

        let result = ReviewResult {
            review_id: Uuid::new_v4(),
            commit_sha: metadata.head_commit_sha.clone(),
            metadata,
            config,
            findings: report.findings,
            summary: report.summary,
            timestamp: Utc::now(),
        };

        self.store
            .save(&result)
            .await
            .map_err(|e| ReviewError::Storage(e.to_string()))?;

        info!(
            review_id = %result.review_id,
            findings = result.findings.len(),
            failures = diagnostics.len(),
            "review persisted"
        );

        Ok(ReviewOutcome {
            result,
            markdown: report.markdown,
            comments: report.comments,
            diagnostics,
        })
    }

    /// Normalize any change source into `(metadata, diff_text)`.
    async fn resolve_source(
        &self,
        source: ChangeSource,
    ) -> Result<(PrMetadata, String), ReviewError> {
        match source {
            ChangeSource::Manual {
                diff,
                repository,
                pr_number,
            } => Ok((PrMetadata::manual(repository, pr_number), diff)),
            ChangeSource::Remote {
                url,
                repository,
                pr_number,
                access_token,
            } => {
                let (repository, pr_number) = match url {
                    Some(url) => parse_pr_url(&url)?,
                    None => {
                        let repository = repository.ok_or_else(|| {
                            ReviewError::Validation("repository is required".to_string())
                        })?;
                        let pr_number = pr_number.ok_or_else(|| {
                            ReviewError::Validation("pr_number is required".to_string())
                        })?;
                        (repository, pr_number)
                    }
                };
                let token = access_token.or_else(|| self.config.github_token.clone());
                let fetcher = ChangeFetcher::new(&self.config.github_api_base, token)?;
                let (metadata, diff_text) = fetcher.fetch(&repository, pr_number).await?;
                Ok((metadata, diff_text))
            }
        }
    }
}
