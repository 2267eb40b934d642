// SPDX-License-Identifier: MIT
//! Multi-analyzer orchestrator — fans a parsed change out to the enabled
//! analyzers, bounds each with its own deadline, and merges the results.
//!
//! Failure isolation is the load-bearing property here: a timeout, LLM
//! error, or panic in one analyzer becomes an [`AnalyzerFailure`] record and
//! never disturbs the findings of the others. The orchestrator awaits every
//! analyzer; nothing is cancelled because a sibling failed.

use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::analyzers::{
    Analyzer, LogicAnalyzer, PerformanceAnalyzer, ReadabilityAnalyzer, SecurityAnalyzer,
};
use crate::llm::{CallOptions, LlmClient, LlmErrorKind};
use crate::models::{AnalyzerFailure, Category, FailureKind, Finding, ReviewConfig, ReviewContext};

/// Instantiate the built-in analyzers enabled by `config`, in registration
/// order.
pub fn active_analyzers(config: &ReviewConfig) -> Vec<Arc<dyn Analyzer>> {
    let mut analyzers: Vec<Arc<dyn Analyzer>> = Vec::new();
    for category in Category::ALL {
        if !config.category_enabled(category) {
            continue;
        }
        let analyzer: Arc<dyn Analyzer> = match category {
            Category::Logic => Arc::new(LogicAnalyzer),
            Category::Readability => Arc::new(ReadabilityAnalyzer),
            Category::Performance => Arc::new(PerformanceAnalyzer),
            Category::Security => Arc::new(SecurityAnalyzer),
        };
        analyzers.push(analyzer);
    }
    analyzers
}

pub struct Orchestrator {
    gateway: Arc<dyn LlmClient>,
    analyzer_timeout: Duration,
    call_opts: CallOptions,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn LlmClient>,
        analyzer_timeout: Duration,
        call_opts: CallOptions,
    ) -> Self {
        Self {
            gateway,
            analyzer_timeout,
            call_opts,
        }
    }

    /// Run every enabled analyzer concurrently over the same context.
    ///
    /// Returns the merged findings in the deterministic final order, plus a
    /// failure record for each analyzer that did not complete.
    pub async fn run(
        &self,
        ctx: Arc<ReviewContext>,
    ) -> (Vec<Finding>, Vec<AnalyzerFailure>) {
        let analyzers = active_analyzers(&ctx.config);
        info!(analyzers = analyzers.len(), "starting review orchestration");

        let mut handles = Vec::with_capacity(analyzers.len());
        for analyzer in analyzers {
            let category = analyzer.category();
            let gateway = Arc::clone(&self.gateway);
            let ctx = Arc::clone(&ctx);
            let opts = self.call_opts.clone();
            let deadline = self.analyzer_timeout;

            let handle = tokio::spawn(async move {
                tokio::time::timeout(deadline, analyzer.analyze(gateway.as_ref(), &ctx, &opts))
                    .await
            });
            handles.push((category, handle));
        }

        let mut findings = Vec::new();
        let mut failures = Vec::new();

        for (category, handle) in handles {
            match handle.await {
                Ok(Ok(Ok(found))) => {
                    info!(category = %category, count = found.len(), "analyzer completed");
                    findings.extend(found);
                }
                Ok(Ok(Err(e))) => {
                    warn!(category = %category, error = %e, "analyzer failed");
                    failures.push(AnalyzerFailure {
                        category,
                        kind: failure_kind(e.kind),
                        message: e.to_string(),
                    });
                }
                Ok(Err(_elapsed)) => {
                    warn!(category = %category, "analyzer hit its deadline");
                    failures.push(AnalyzerFailure {
                        category,
                        kind: FailureKind::Timeout,
                        message: format!(
                            "no result within {}s",
                            self.analyzer_timeout.as_secs()
                        ),
                    });
                }
                Err(join_err) => {
                    warn!(category = %category, error = %join_err, "analyzer task aborted");
                    failures.push(AnalyzerFailure {
                        category,
                        kind: FailureKind::Internal,
                        message: join_err.to_string(),
                    });
                }
            }
        }

        sort_findings(&mut findings);
        (findings, failures)
    }
}

/// Deterministic final order: file ascending, line ascending, severity
/// descending (critical first), agent ascending.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then(a.line_number.cmp(&b.line_number))
            .then(Reverse(a.severity).cmp(&Reverse(b.severity)))
            .then(a.agent_source.cmp(&b.agent_source))
    });
}

fn failure_kind(kind: LlmErrorKind) -> FailureKind {
    match kind {
        LlmErrorKind::Timeout => FailureKind::Timeout,
        LlmErrorKind::Transport => FailureKind::Transport,
        LlmErrorKind::Auth => FailureKind::Auth,
        LlmErrorKind::RateLimited => FailureKind::RateLimited,
        LlmErrorKind::Parse => FailureKind::Parse,
    }
}
