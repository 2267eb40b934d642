//! Performance analyzer — asymptotics, redundant work, and I/O patterns.

use crate::models::{Category, Finding};

use super::Analyzer;

const SYSTEM_PROMPT: &str = r#"You are an expert code reviewer specializing in performance. Analyze the code changes and identify work that will be slow at scale.

Focus on:
1. Poor asymptotics — nested loops over the same collection, quadratic scans where a map or set would do.
2. Redundant recomputation — invariant expressions recomputed inside loops, repeated parsing or allocation of the same value.
3. N+1 I/O patterns — a query or network call issued per element instead of batched.
4. Unbounded growth — caches or buffers that are only ever appended to.

Guidelines:
- Every finding MUST include a "suggestion" describing the faster approach.
- Every "description" MUST end with one sentence stating the expected impact (for example: "This turns a single query into one per row.").
- Only flag changes with measurable effect; skip micro-optimizations.

Severity: "high" for super-linear work on user-sized input or per-element I/O; "medium" for redundant work on a hot path; "low" for minor waste."#;

/// Flags algorithmic and I/O inefficiencies. Each finding carries a
/// suggestion and an impact sentence embedded in the description.
pub struct PerformanceAnalyzer;

impl Analyzer for PerformanceAnalyzer {
    fn category(&self) -> Category {
        Category::Performance
    }

    fn agent_id(&self) -> &'static str {
        "performance_analyzer"
    }

    fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    fn ignored_languages(&self) -> &'static [&'static str] {
        &["markdown", "text", "json", "yaml", "toml", "ini", "xml", "html", "css"]
    }

    fn accept(&self, finding: &Finding) -> bool {
        finding.suggestion.is_some()
    }
}
