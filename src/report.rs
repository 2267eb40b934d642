// SPDX-License-Identifier: MIT
//! Finding aggregation and report rendering.
//!
//! Takes the orchestrator's merged findings, applies the configured severity
//! threshold, drops findings pointing at lines the diff does not contain,
//! groups the survivors by (file, line), and renders the Markdown report
//! plus the summary statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Finding, ParsedDiff, ReviewConfig, ReviewSummary, Severity};

/// One logical review comment: every finding attached to a single
/// (file, line) position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub file_path: String,
    pub line_number: u32,
    pub findings: Vec<Finding>,
}

/// Aggregated output of one review run.
#[derive(Debug, Clone)]
pub struct ReviewReport {
    /// Findings surviving the threshold and line-validity filters, in the
    /// orchestrator's deterministic order.
    pub findings: Vec<Finding>,
    pub comments: Vec<Comment>,
    pub summary: ReviewSummary,
    pub markdown: String,
}

/// Build the report. `findings` must already be in final sorted order.
pub fn build_report(
    findings: Vec<Finding>,
    diff: &ParsedDiff,
    config: &ReviewConfig,
) -> ReviewReport {
    let findings: Vec<Finding> = findings
        .into_iter()
        .filter(|f| f.severity >= config.severity_threshold)
        .filter(|f| line_exists(diff, f))
        .collect();

    let summary = summarize(&findings, diff);

    // BTreeMap keys give file-then-line ordering for free.
    let mut grouped: BTreeMap<(String, u32), Vec<Finding>> = BTreeMap::new();
    for finding in &findings {
        grouped
            .entry((finding.file_path.clone(), finding.line_number))
            .or_default()
            .push(finding.clone());
    }
    let comments: Vec<Comment> = grouped
        .into_iter()
        .map(|((file_path, line_number), findings)| Comment {
            file_path,
            line_number,
            findings,
        })
        .collect();

    let markdown = if findings.is_empty() {
        render_positive(&summary)
    } else {
        render_markdown(&comments, &summary)
    };

    ReviewReport {
        findings,
        comments,
        summary,
        markdown,
    }
}

/// Out-of-range findings are dropped here, per the aggregation invariant.
fn line_exists(diff: &ParsedDiff, finding: &Finding) -> bool {
    diff.file(&finding.file_path)
        .is_some_and(|f| f.touches_line(finding.line_number))
}

fn summarize(findings: &[Finding], diff: &ParsedDiff) -> ReviewSummary {
    let mut by_severity = BTreeMap::new();
    let mut by_category = BTreeMap::new();
    for finding in findings {
        *by_severity.entry(finding.severity).or_insert(0) += 1;
        *by_category.entry(finding.category).or_insert(0) += 1;
    }
    ReviewSummary {
        total_findings: findings.len(),
        by_severity,
        by_category,
        files_analyzed: diff.files_analyzed(),
        lines_changed: diff.lines_changed(),
    }
}

// ─── Markdown rendering ───────────────────────────────────────────────────────

/// Escape text that came from untrusted sources (code, model output) so it
/// cannot inject Markdown structure into the report.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '`' | '*' | '_' | '[' | ']' | '<' | '>' | '#' | '|' | '~' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn severity_badge(severity: Severity) -> String {
    format!("**[{}]**", severity.as_str().to_uppercase())
}

fn render_markdown(comments: &[Comment], summary: &ReviewSummary) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("# Code Review Results".to_string());
    lines.push(String::new());
    lines.push("## Summary".to_string());
    lines.push(String::new());
    lines.push(format!("- **Total issues found:** {}", summary.total_findings));
    lines.push(format!("- **Files analyzed:** {}", summary.files_analyzed));
    lines.push(format!("- **Lines changed:** {}", summary.lines_changed));
    lines.push(String::new());

    if !summary.by_severity.is_empty() {
        lines.push("### By Severity".to_string());
        // Critical first.
        for (severity, count) in summary.by_severity.iter().rev() {
            lines.push(format!("- **{}:** {count}", title_case(severity.as_str())));
        }
        lines.push(String::new());
    }
    if !summary.by_category.is_empty() {
        lines.push("### By Category".to_string());
        let mut counts: Vec<_> = summary.by_category.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (category, count) in counts {
            lines.push(format!("- **{}:** {count}", title_case(category.as_str())));
        }
        lines.push(String::new());
    }

    lines.push("---".to_string());
    lines.push(String::new());
    lines.push("## Detailed Findings".to_string());

    let mut current_file: Option<&str> = None;
    for comment in comments {
        if current_file != Some(comment.file_path.as_str()) {
            current_file = Some(comment.file_path.as_str());
            lines.push(String::new());
            lines.push(format!("### `{}`", escape_markdown(&comment.file_path)));
        }
        lines.push(String::new());
        lines.push(format!("#### Line {}", comment.line_number));
        lines.push(String::new());
        if comment.findings.len() > 1 {
            lines.push(format!(
                "**{} issues found on this line:**",
                comment.findings.len()
            ));
            lines.push(String::new());
        }
        for (i, finding) in comment.findings.iter().enumerate() {
            lines.push(format!(
                "{} `{}`",
                severity_badge(finding.severity),
                finding.category.as_str()
            ));
            lines.push(String::new());
            lines.push(format!(
                "**Description:** {}",
                escape_markdown(&finding.description)
            ));
            lines.push(String::new());
            if let Some(suggestion) = &finding.suggestion {
                lines.push(format!("**Suggestion:** {}", escape_markdown(suggestion)));
                lines.push(String::new());
            }
            lines.push(format!("*Detected by: {}*", finding.agent_source));
            if i + 1 < comment.findings.len() {
                lines.push(String::new());
                lines.push("---".to_string());
                lines.push(String::new());
            }
        }
    }
    lines.push(String::new());

    lines.join("\n")
}

fn render_positive(summary: &ReviewSummary) -> String {
    format!(
        "# Code Review Results\n\n\
         ## No issues detected\n\n\
         Great work! The review did not identify any issues:\n\n\
         - **Logic:** no logical errors or bugs detected\n\
         - **Readability:** code is clear and maintainable\n\
         - **Performance:** no performance concerns identified\n\
         - **Security:** no security vulnerabilities found\n\n\
         ---\n\n\
         - **Files analyzed:** {}\n\
         - **Lines changed:** {}\n",
        summary.files_analyzed, summary.lines_changed
    )
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
