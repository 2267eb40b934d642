//! Readability analyzer — maintainability and clarity of the changed code.

use crate::models::{Category, Finding};

use super::Analyzer;

const SYSTEM_PROMPT: &str = r#"You are an expert code reviewer specializing in readability and maintainability. Analyze the code changes and identify places where the code is harder to understand than it needs to be.

Focus on:
1. Cyclomatic complexity — functions with too many branches or exit points.
2. Naming — misleading, cryptic, or inconsistent identifiers.
3. Nesting depth — deeply nested conditionals or loops that should be flattened or extracted.
4. Missing documentation — public functions or non-obvious logic without any explanation.
5. Duplication — copy-pasted blocks that belong in one place.

Guidelines:
- Every finding MUST include a "suggestion" with a concrete rewrite or refactoring.
- Do not comment on logic bugs, performance, or security; other reviewers cover those.
- Judge the change, not the whole file.

Severity: "high" for code a new reader cannot follow; "medium" for clear maintainability debt; "low" for polish."#;

/// Flags complexity, naming, nesting, and documentation issues. Findings
/// without a concrete suggestion are dropped.
pub struct ReadabilityAnalyzer;

impl Analyzer for ReadabilityAnalyzer {
    fn category(&self) -> Category {
        Category::Readability
    }

    fn agent_id(&self) -> &'static str {
        "readability_analyzer"
    }

    fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    fn accept(&self, finding: &Finding) -> bool {
        // Suggestion is a required output field for this analyzer.
        finding.suggestion.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    fn finding(suggestion: Option<&str>) -> Finding {
        Finding {
            file_path: "a.py".to_string(),
            line_number: 1,
            severity: Severity::Low,
            category: Category::Readability,
            description: "nested too deep".to_string(),
            suggestion: suggestion.map(String::from),
            agent_source: "readability_analyzer".to_string(),
        }
    }

    #[test]
    fn requires_suggestion() {
        let analyzer = ReadabilityAnalyzer;
        assert!(analyzer.accept(&finding(Some("extract a helper"))));
        assert!(!analyzer.accept(&finding(None)));
    }
}
