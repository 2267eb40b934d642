//! Logic analyzer — logical errors that cause crashes or wrong behavior.

use crate::models::Category;

use super::Analyzer;

const SYSTEM_PROMPT: &str = r#"You are an expert code reviewer specializing in logical errors and bugs. Analyze the code changes and identify issues that could cause runtime errors, incorrect behavior, or crashes.

Focus on:
1. Null/None dereferences — accessing members of possibly-null values without a check.
2. Unreachable code — statements after returns, impossible branches, dead code.
3. Infinite loops and off-by-one errors — bounds that never terminate, < vs <=, missing loop variable updates, out-of-range indexing.
4. Incorrect parameter usage — wrong argument count, order, or types.
5. Logic flow — missing return statements, inverted conditions, unhandled error paths, resource leaks.

Guidelines:
- Focus only on logical correctness, not style or performance.
- Be conservative: flag only clear logical errors.
- Explain why the code is wrong, and suggest a concrete fix when possible.

Severity: "critical" will definitely crash or corrupt data; "high" likely causes runtime errors; "medium" fails under certain conditions; "low" is a minor inconsistency."#;

/// Detects null dereferences, unreachable code, off-by-one errors, loop
/// termination bugs, and wrong parameter usage.
pub struct LogicAnalyzer;

impl Analyzer for LogicAnalyzer {
    fn category(&self) -> Category {
        Category::Logic
    }

    fn agent_id(&self) -> &'static str {
        "logic_analyzer"
    }

    fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    fn ignored_languages(&self) -> &'static [&'static str] {
        // Nothing logical to review in prose or plain data files.
        &["markdown", "text", "json", "yaml", "toml", "ini", "xml"]
    }
}
