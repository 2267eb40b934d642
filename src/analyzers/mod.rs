// SPDX-License-Identifier: MIT
//! Analyzer agents — the shared base every category builds on.
//!
//! An analyzer walks the non-binary files of a [`ReviewContext`], asks the
//! LLM gateway for findings on each one, and parses the reply with a parser
//! that is tolerant of prose around the JSON but strict about the objects
//! inside it.

pub mod logic;
pub mod performance;
pub mod readability;
pub mod security;

use std::collections::BTreeMap;

use crate::llm::{CallOptions, LlmClient, LlmError, LlmErrorKind};
use crate::models::{Category, FileChange, Finding, PrMetadata, ReviewContext, Severity};

pub use logic::LogicAnalyzer;
pub use performance::PerformanceAnalyzer;
pub use readability::ReadabilityAnalyzer;
pub use security::SecurityAnalyzer;

/// Output contract appended to every system prompt. Forces post-change line
/// numbers, the closed severity set, and non-empty descriptions.
const OUTPUT_FORMAT: &str = r#"
Output format:
Return your findings as a JSON array. Each element must be an object with:
- "line": integer line number in the post-change file (the file as it looks after the change)
- "description": non-empty explanation of the issue
- "severity": one of "low", "medium", "high", "critical"
- "suggestion": concrete fix recommendation (optional unless your instructions require it)

Return an empty array [] if no issues are found. Do not wrap the array in prose."#;

/// A bounded worker that turns a review context into findings for one
/// category.
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    fn category(&self) -> Category;

    /// Stable identifier used for `agent_source` and model binding.
    fn agent_id(&self) -> &'static str;

    fn system_prompt(&self) -> &'static str;

    /// Languages this analyzer skips entirely.
    fn ignored_languages(&self) -> &'static [&'static str] {
        &[]
    }

    /// Hook for specializations to append extra context to the per-file
    /// prompt (the security analyzer adds its pre-scan hints here).
    fn augment_user_prompt(&self, _file: &FileChange, prompt: String) -> String {
        prompt
    }

    /// Specialization-specific acceptance check applied to each parsed
    /// finding. The readability and security analyzers require suggestions.
    fn accept(&self, _finding: &Finding) -> bool {
        true
    }

    /// Run the per-file loop. One gateway call per eligible file; the first
    /// gateway or parse failure aborts this analyzer (the orchestrator
    /// records it — other analyzers are unaffected).
    async fn analyze(
        &self,
        gateway: &dyn LlmClient,
        ctx: &ReviewContext,
        opts: &CallOptions,
    ) -> Result<Vec<Finding>, LlmError> {
        let system = compose_system_prompt(self.system_prompt(), ctx.config.custom_rules.as_ref());
        let mut findings = Vec::new();

        for file in &ctx.diff.files {
            if file.is_binary || file.change_count() == 0 {
                continue;
            }
            if self.ignored_languages().contains(&file.language.as_str()) {
                continue;
            }

            let prompt =
                self.augment_user_prompt(file, build_file_prompt(file, ctx.metadata.as_ref()));
            let reply = gateway
                .invoke(self.agent_id(), &system, &prompt, opts)
                .await?;
            let parsed = parse_findings(&reply, file, self.category(), self.agent_id())?;
            findings.extend(parsed.into_iter().filter(|f| self.accept(f)));
        }

        Ok(findings)
    }
}

// ─── Prompt assembly ──────────────────────────────────────────────────────────

/// System prompt plus the shared output contract and any caller-supplied
/// custom rules (passed verbatim — untrusted prompt substitution).
pub fn compose_system_prompt(
    base: &str,
    custom_rules: Option<&BTreeMap<String, String>>,
) -> String {
    let mut prompt = format!("{base}\n{OUTPUT_FORMAT}");
    if let Some(rules) = custom_rules {
        if !rules.is_empty() {
            prompt.push_str("\n\nCustom rules:\n");
            for (key, value) in rules {
                prompt.push_str(&format!("- {key}: {value}\n"));
            }
        }
    }
    prompt
}

/// Render one file's change events the way analyzers see them: numbered
/// `+`/`-`/`~` lines grouped by kind.
pub fn build_file_prompt(file: &FileChange, metadata: Option<&PrMetadata>) -> String {
    let mut parts = Vec::new();

    if let Some(meta) = metadata {
        if !meta.title.is_empty() {
            parts.push(format!("Pull Request: {}", meta.title));
            parts.push(format!("Repository: {}", meta.repository));
            parts.push(String::new());
        }
    }

    parts.push("Code changes to analyze:".to_string());
    parts.push(format!("File: {}", file.file_path));
    parts.push(format!("Language: {}", file.language));

    if !file.additions.is_empty() {
        parts.push("\nAdditions:".to_string());
        for change in &file.additions {
            parts.push(format!("+{}: {}", change.line_number, change.content));
        }
    }
    if !file.deletions.is_empty() {
        parts.push("\nDeletions:".to_string());
        for change in &file.deletions {
            parts.push(format!("-{}: {}", change.line_number, change.content));
        }
    }
    if !file.modifications.is_empty() {
        parts.push("\nModifications:".to_string());
        for change in &file.modifications {
            parts.push(format!("~{}: {}", change.line_number, change.content));
        }
    }

    parts.push(
        "\nAnalyze the changes above and return findings relevant to your specialization."
            .to_string(),
    );
    parts.join("\n")
}

// ─── Reply parsing ────────────────────────────────────────────────────────────

/// Parse an LLM reply into findings for `file`.
///
/// Tolerant about surrounding prose (the first balanced JSON array is
/// extracted), strict about the objects: anything lacking a positive `line`
/// or a non-empty `description` is discarded, unknown severities clamp to
/// `medium`.
pub fn parse_findings(
    reply: &str,
    file: &FileChange,
    category: Category,
    agent_id: &str,
) -> Result<Vec<Finding>, LlmError> {
    let array_text = extract_json_array(reply).ok_or_else(|| {
        LlmError::new(LlmErrorKind::Parse, "reply contains no JSON array")
    })?;

    let items: Vec<serde_json::Value> = serde_json::from_str(array_text)
        .map_err(|e| LlmError::new(LlmErrorKind::Parse, format!("invalid JSON array: {e}")))?;

    let mut findings = Vec::new();
    for item in items {
        let Some(obj) = item.as_object() else { continue };

        let line = obj
            .get("line")
            .or_else(|| obj.get("line_number"))
            .and_then(|v| v.as_u64());
        let Some(line) = line.filter(|&n| n > 0 && n <= u32::MAX as u64) else {
            continue;
        };

        let description = obj
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default();
        if description.is_empty() {
            continue;
        }

        let severity = obj
            .get("severity")
            .and_then(|v| v.as_str())
            .and_then(Severity::parse)
            .unwrap_or(Severity::Medium);

        let suggestion = obj
            .get("suggestion")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        findings.push(Finding {
            file_path: file.file_path.clone(),
            line_number: line as u32,
            severity,
            category,
            description: description.to_string(),
            suggestion,
            agent_source: agent_id.to_string(),
        });
    }
    Ok(findings)
}

/// Locate the first `[` and its matching `]`, skipping brackets inside JSON
/// strings. Returns the array slice, or `None` when the text holds no
/// balanced array.
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LineChange;

    fn sample_file() -> FileChange {
        FileChange {
            file_path: "src/query.py".to_string(),
            language: "python".to_string(),
            is_binary: false,
            additions: vec![LineChange::add(12, "query = \"SELECT * FROM u\" + uid")],
            deletions: vec![],
            modifications: vec![],
        }
    }

    #[test]
    fn extracts_array_from_prose() {
        let reply = "Sure! Here are the findings:\n[{\"line\": 12, \"description\": \"bad\"}]\nHope that helps.";
        assert_eq!(
            extract_json_array(reply),
            Some("[{\"line\": 12, \"description\": \"bad\"}]")
        );
    }

    #[test]
    fn ignores_brackets_inside_strings() {
        let reply = r#"[{"line": 1, "description": "array access a[0] here"}]"#;
        let arr = extract_json_array(reply).unwrap();
        assert!(arr.ends_with("}]"));
        let parsed: Vec<serde_json::Value> = serde_json::from_str(arr).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn parse_discards_incomplete_objects() {
        let reply = r#"[
            {"line": 12, "description": "SQL injection", "severity": "critical"},
            {"description": "missing line"},
            {"line": 3},
            {"line": 0, "description": "bad line number"}
        ]"#;
        let findings =
            parse_findings(reply, &sample_file(), Category::Security, "security_analyzer")
                .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line_number, 12);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].agent_source, "security_analyzer");
    }

    #[test]
    fn parse_clamps_unknown_severity_to_medium() {
        let reply = r#"[{"line": 12, "description": "something", "severity": "apocalyptic"}]"#;
        let findings =
            parse_findings(reply, &sample_file(), Category::Logic, "logic_analyzer").unwrap();
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[test]
    fn parse_without_array_is_error() {
        let err = parse_findings("no issues!", &sample_file(), Category::Logic, "logic_analyzer")
            .unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Parse);
    }

    #[test]
    fn empty_array_is_no_findings() {
        let findings =
            parse_findings("[]", &sample_file(), Category::Logic, "logic_analyzer").unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn file_prompt_lists_numbered_changes() {
        let prompt = build_file_prompt(&sample_file(), None);
        assert!(prompt.contains("File: src/query.py"));
        assert!(prompt.contains("+12: query ="));
    }
}
