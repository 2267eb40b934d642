//! Integration tests for the multi-analyzer orchestrator.
//!
//! Covers:
//! 1. Disabled categories never reach the LLM gateway
//! 2. One analyzer timing out leaves the others' findings intact
//! 3. One analyzer erroring leaves the others' findings intact
//! 4. Deterministic merged ordering

mod common;

use std::sync::Arc;
use std::time::Duration;

use reviewd::diff::parse;
use reviewd::llm::{CallOptions, LlmErrorKind};
use reviewd::models::{Category, FailureKind, ReviewConfig, Severity};
use reviewd::orchestrator::Orchestrator;

use common::StubLlm;

fn orchestrator(stub: Arc<StubLlm>, timeout: Duration) -> Orchestrator {
    Orchestrator::new(stub, timeout, CallOptions::default())
}

// ─── Test 1: disabled categories make no gateway calls ────────────────────────

#[tokio::test]
async fn disabled_categories_make_no_llm_calls() {
    let stub = StubLlm::silent();
    let config = ReviewConfig {
        enabled_categories: vec![Category::Logic],
        ..ReviewConfig::default()
    };
    let ctx = common::context_for(parse(common::SIMPLE_DIFF).unwrap(), config);

    let (findings, failures) = orchestrator(stub.clone(), Duration::from_secs(5))
        .run(ctx)
        .await;

    assert!(findings.is_empty());
    assert!(failures.is_empty());
    let calls = stub.calls();
    assert!(!calls.is_empty());
    assert!(calls.iter().all(|agent| agent == "logic_analyzer"));
}

// ─── Test 2: analyzer timeout is isolated ─────────────────────────────────────

#[tokio::test]
async fn timed_out_analyzer_is_recorded_others_survive() {
    let reply = r#"[{"line": 2, "description": "SQL injection", "severity": "critical",
                     "suggestion": "parameterize the query"}]"#;
    let stub = Arc::new(
        StubLlm::new()
            .with_reply("security_analyzer", reply)
            .with_delay("performance_analyzer", Duration::from_millis(500)),
    );
    let ctx = common::context_for(
        parse(common::SQL_INJECTION_DIFF).unwrap(),
        ReviewConfig::default(),
    );

    let (findings, failures) = orchestrator(stub, Duration::from_millis(100)).run(ctx).await;

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].category, Category::Security);
    assert_eq!(findings[0].severity, Severity::Critical);

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].category, Category::Performance);
    assert_eq!(failures[0].kind, FailureKind::Timeout);
}

// ─── Test 3: analyzer error is isolated ───────────────────────────────────────

#[tokio::test]
async fn failing_analyzer_is_recorded_others_survive() {
    let reply = r#"[{"line": 2, "description": "needs a docstring",
                     "suggestion": "add one", "severity": "low"}]"#;
    let stub = Arc::new(
        StubLlm::new()
            .with_reply("readability_analyzer", reply)
            .with_failure("logic_analyzer", LlmErrorKind::Transport),
    );
    let ctx = common::context_for(
        parse(common::SQL_INJECTION_DIFF).unwrap(),
        ReviewConfig::default(),
    );

    let (findings, failures) = orchestrator(stub, Duration::from_secs(5)).run(ctx).await;

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].agent_source, "readability_analyzer");

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].category, Category::Logic);
    assert_eq!(failures[0].kind, FailureKind::Transport);
}

// ─── Test 4: deterministic ordering ───────────────────────────────────────────

#[tokio::test]
async fn merged_findings_are_deterministically_ordered() {
    // Both analyzers flag the same line; the critical one must sort first,
    // then ties break on agent name.
    let logic = r#"[{"line": 2, "description": "logic issue", "severity": "medium"}]"#;
    let security = r#"[{"line": 2, "description": "injection", "severity": "critical",
                        "suggestion": "parameterize"}]"#;
    let stub = Arc::new(
        StubLlm::new()
            .with_reply("logic_analyzer", logic)
            .with_reply("security_analyzer", security),
    );
    let config = ReviewConfig {
        enabled_categories: vec![Category::Logic, Category::Security],
        ..ReviewConfig::default()
    };
    let ctx = common::context_for(parse(common::SQL_INJECTION_DIFF).unwrap(), config);

    for _ in 0..3 {
        let (findings, _) = orchestrator(stub.clone(), Duration::from_secs(5))
            .run(ctx.clone())
            .await;
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].agent_source, "security_analyzer");
        assert_eq!(findings[1].agent_source, "logic_analyzer");
    }
}
