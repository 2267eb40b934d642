// SPDX-License-Identifier: MIT
//! Security analyzer — vulnerabilities in the changed code.
//!
//! Before calling the model this analyzer runs a cheap regex pre-scan over
//! the added lines and feeds the hits into the prompt as hints, so the model
//! looks where the obvious anti-patterns are.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Category, FileChange, Finding};

use super::Analyzer;

const SYSTEM_PROMPT: &str = r#"You are an expert security reviewer. Analyze the code changes and identify vulnerabilities that could lead to data breaches, unauthorized access, or system compromise.

Focus on:
1. Injection — SQL/command/template injection via string concatenation or interpolation of untrusted input.
2. Missing input validation — unchecked parameters, path traversal, type confusion.
3. Authentication and authorization weaknesses — missing checks, hardcoded credentials, broken session handling.
4. Secret exposure — credentials in code, sensitive data in logs or error messages.
5. Cryptographic issues — MD5/SHA1/DES, hardcoded keys, insecure randomness.
6. Unsafe deserialization and eval of untrusted data.

Guidelines:
- Every finding MUST include a "severity" reflecting exploitability and impact, and a "suggestion" with specific remediation (secure code to use instead).
- Reference the vulnerability class in the description (e.g. "SQL injection").
- Be thorough but avoid false positives.

Severity: "critical" is immediately exploitable with high impact; "high" is exploitable with significant impact; "medium" needs specific conditions; "low" is a hardening gap."#;

// ─── Pre-scan patterns ────────────────────────────────────────────────────────

struct ScanPattern {
    regex: Regex,
    hint: &'static str,
}

static SCAN_PATTERNS: Lazy<Vec<ScanPattern>> = Lazy::new(|| {
    let pattern = |re: &str, hint: &'static str| ScanPattern {
        regex: Regex::new(re).expect("security scan regex"),
        hint,
    };
    vec![
        pattern(
            r#"(?i)(select|insert|update|delete)\s.*("\s*\+|'\s*\+|\{|%s|\.format\()"#,
            "possible SQL built by string concatenation",
        ),
        pattern(
            r"(?i)(\.innerHTML\s*=|dangerouslySetInnerHTML|document\.write\()",
            "possible XSS sink",
        ),
        pattern(
            r#"(?i)(password|secret|api[_-]?key|token)\s*[:=]\s*["'][^"']{8,}["']"#,
            "possible hardcoded credential",
        ),
        pattern(
            r"(?i)\b(md5|sha1)\s*\(|hashlib\.(md5|sha1)",
            "weak hash algorithm",
        ),
        pattern(
            r"(?i)(log|logger|console|print)\w*[.(].*(password|token|secret|api_key)",
            "possible sensitive data in logs",
        ),
        pattern(
            r"(?i)(pickle\.loads|yaml\.load\(|\beval\s*\(|readObject\(\))",
            "unsafe deserialization or eval",
        ),
    ]
});

/// Scan added and modified lines for security anti-patterns. Returns one
/// hint string per hit, ready to embed in the prompt.
fn pre_scan(file: &FileChange) -> Vec<String> {
    let mut hints = Vec::new();
    let changed = file.additions.iter().chain(file.modifications.iter());
    for change in changed {
        for pattern in SCAN_PATTERNS.iter() {
            if pattern.regex.is_match(&change.content) {
                hints.push(format!("- line {}: {}", change.line_number, pattern.hint));
            }
        }
    }
    hints
}

fn language_guideline(language: &str) -> Option<&'static str> {
    match language {
        "python" => Some(
            "Python: watch for pickle deserialization, raw SQL strings, subprocess command injection, unsafe yaml.load",
        ),
        "javascript" | "typescript" => Some(
            "JavaScript/TypeScript: check innerHTML/XSS sinks, eval, prototype pollution, template-literal SQL",
        ),
        "java" => Some("Java: look for SQL injection, XXE, insecure deserialization, path traversal"),
        "c" | "cpp" => Some(
            "C/C++: check buffer overflows, format string bugs, use-after-free, integer overflow",
        ),
        "go" => Some("Go: watch SQL injection, command injection, path traversal, insecure TLS config"),
        _ => None,
    }
}

/// Detects injection, validation gaps, auth weaknesses, and secret
/// exposure. Runs a regex pre-scan whose hits are fed to the model as hints.
pub struct SecurityAnalyzer;

impl Analyzer for SecurityAnalyzer {
    fn category(&self) -> Category {
        Category::Security
    }

    fn agent_id(&self) -> &'static str {
        "security_analyzer"
    }

    fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    fn augment_user_prompt(&self, file: &FileChange, mut prompt: String) -> String {
        if let Some(guideline) = language_guideline(&file.language) {
            prompt.push_str("\n\nLanguage-specific guidance:\n- ");
            prompt.push_str(guideline);
        }
        let hints = pre_scan(file);
        if !hints.is_empty() {
            prompt.push_str("\n\nPre-analysis pattern hits (verify each):\n");
            prompt.push_str(&hints.join("\n"));
        }
        prompt
    }

    fn accept(&self, finding: &Finding) -> bool {
        // Remediation guidance is mandatory for security findings.
        finding.suggestion.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LineChange;

    fn file_with(lines: &[(u32, &str)]) -> FileChange {
        FileChange {
            file_path: "app.py".to_string(),
            language: "python".to_string(),
            is_binary: false,
            additions: lines
                .iter()
                .map(|(n, content)| LineChange::add(*n, *content))
                .collect(),
            deletions: vec![],
            modifications: vec![],
        }
    }

    #[test]
    fn pre_scan_flags_sql_concatenation() {
        let file = file_with(&[(12, r#"query = "SELECT * FROM u WHERE id=" + uid"#)]);
        let hints = pre_scan(&file);
        assert_eq!(hints.len(), 1);
        assert!(hints[0].contains("line 12"));
        assert!(hints[0].contains("SQL"));
    }

    #[test]
    fn pre_scan_flags_hardcoded_secret_and_weak_hash() {
        let file = file_with(&[
            (3, r#"api_key = "abcd1234efgh5678""#),
            (9, "digest = hashlib.md5(data)"),
        ]);
        let hints = pre_scan(&file);
        assert_eq!(hints.len(), 2);
    }

    #[test]
    fn pre_scan_ignores_clean_lines() {
        let file = file_with(&[(1, "total = a + b")]);
        assert!(pre_scan(&file).is_empty());
    }

    #[test]
    fn prompt_augmented_with_hints() {
        let analyzer = SecurityAnalyzer;
        let file = file_with(&[(12, r#"query = "SELECT * FROM u" + uid"#)]);
        let prompt = analyzer.augment_user_prompt(&file, "base".to_string());
        assert!(prompt.starts_with("base"));
        assert!(prompt.contains("Pre-analysis pattern hits"));
        assert!(prompt.contains("Language-specific guidance"));
    }
}
