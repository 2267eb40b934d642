// SPDX-License-Identifier: MIT
//! Data models for the review pipeline.
//!
//! All types are `Serialize`/`Deserialize` so they can travel over the REST
//! API and be stored in the `reviews` and `findings` SQLite tables.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Severity ─────────────────────────────────────────────────────────────────

/// Finding severity. The derived `Ord` gives the total order
/// `low < medium < high < critical` used by threshold filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse a severity label. Returns `None` for unknown values so callers
    /// can decide between rejecting and clamping.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Analysis category ────────────────────────────────────────────────────────

/// One category per built-in analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Logic,
    Readability,
    Performance,
    Security,
}

impl Category {
    /// All built-in categories, in the order analyzers are registered.
    pub const ALL: [Category; 4] = [
        Category::Logic,
        Category::Readability,
        Category::Performance,
        Category::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Logic => "logic",
            Category::Readability => "readability",
            Category::Performance => "performance",
            Category::Security => "security",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "logic" => Some(Category::Logic),
            "readability" => Some(Category::Readability),
            "performance" => Some(Category::Performance),
            "security" => Some(Category::Security),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Diff representation ──────────────────────────────────────────────────────

/// Kind of a single line event in a parsed diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Delete,
    Modify,
}

/// A single classified line event.
///
/// `line_number` is the post-change number for adds and modifies and the
/// pre-change number for deletes. Modifies additionally carry the pre-change
/// side in `old_line_number`/`old_content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChange {
    pub kind: ChangeKind,
    pub line_number: u32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_content: Option<String>,
}

impl LineChange {
    pub fn add(line_number: u32, content: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Add,
            line_number,
            content: content.into(),
            old_line_number: None,
            old_content: None,
        }
    }

    pub fn delete(line_number: u32, content: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            line_number,
            content: content.into(),
            old_line_number: None,
            old_content: None,
        }
    }

    pub fn modify(
        line_number: u32,
        content: impl Into<String>,
        old_line_number: u32,
        old_content: impl Into<String>,
    ) -> Self {
        Self {
            kind: ChangeKind::Modify,
            line_number,
            content: content.into(),
            old_line_number: Some(old_line_number),
            old_content: Some(old_content.into()),
        }
    }
}

/// All change events for one file in a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub file_path: String,
    pub language: String,
    pub is_binary: bool,
    pub additions: Vec<LineChange>,
    pub deletions: Vec<LineChange>,
    pub modifications: Vec<LineChange>,
}

impl FileChange {
    /// Total number of recorded line events.
    pub fn change_count(&self) -> usize {
        self.additions.len() + self.deletions.len() + self.modifications.len()
    }

    /// Whether `line` matches a recorded change event in this file.
    /// Post-change numbers are checked for adds and modifies, pre-change
    /// numbers for deletes and the old side of modifies.
    pub fn touches_line(&self, line: u32) -> bool {
        self.additions.iter().any(|c| c.line_number == line)
            || self.modifications.iter().any(|c| {
                c.line_number == line || c.old_line_number == Some(line)
            })
            || self.deletions.iter().any(|c| c.line_number == line)
    }
}

/// Structured representation of a whole unified diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDiff {
    pub files: Vec<FileChange>,
}

impl ParsedDiff {
    /// Count of non-binary files — the `files_analyzed` summary figure.
    pub fn files_analyzed(&self) -> usize {
        self.files.iter().filter(|f| !f.is_binary).count()
    }

    /// Sum of line events over non-binary files.
    pub fn lines_changed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| !f.is_binary)
            .map(FileChange::change_count)
            .sum()
    }

    pub fn file(&self, path: &str) -> Option<&FileChange> {
        self.files.iter().find(|f| f.file_path == path)
    }
}

// ─── Review configuration ─────────────────────────────────────────────────────

/// Per-review configuration supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Findings below this severity are dropped during aggregation.
    #[serde(default = "default_threshold")]
    pub severity_threshold: Severity,
    /// Which analyzers run. Must be non-empty.
    #[serde(default = "default_categories")]
    pub enabled_categories: Vec<Category>,
    /// Free-form rules appended verbatim to every analyzer system prompt.
    /// Untrusted prompt substitution — never interpreted by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_rules: Option<BTreeMap<String, String>>,
}

fn default_threshold() -> Severity {
    Severity::Medium
}

fn default_categories() -> Vec<Category> {
    Category::ALL.to_vec()
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            severity_threshold: default_threshold(),
            enabled_categories: default_categories(),
            custom_rules: None,
        }
    }
}

impl ReviewConfig {
    pub fn category_enabled(&self, category: Category) -> bool {
        self.enabled_categories.contains(&category)
    }
}

// ─── Change source & metadata ─────────────────────────────────────────────────

/// Where the change under review comes from.
#[derive(Debug, Clone)]
pub enum ChangeSource {
    /// A hosted pull request, addressed by URL or by `owner/name` + number.
    Remote {
        url: Option<String>,
        repository: Option<String>,
        pr_number: Option<u64>,
        access_token: Option<String>,
    },
    /// A raw unified diff supplied directly by the caller.
    Manual {
        diff: String,
        repository: Option<String>,
        pr_number: Option<u64>,
    },
}

/// Pull-request metadata. All fields carry placeholder values on the
/// manual-diff path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrMetadata {
    pub repository: String,
    pub pr_number: u64,
    pub title: String,
    pub author: String,
    pub head_commit_sha: String,
    pub base_branch: String,
    pub head_branch: String,
}

impl PrMetadata {
    /// Placeholder metadata for reviews submitted as a raw diff.
    pub fn manual(repository: Option<String>, pr_number: Option<u64>) -> Self {
        Self {
            repository: repository.unwrap_or_else(|| "manual-review".to_string()),
            pr_number: pr_number.unwrap_or(0),
            title: "Manual Review".to_string(),
            author: String::new(),
            head_commit_sha: String::new(),
            base_branch: String::new(),
            head_branch: String::new(),
        }
    }
}

/// Immutable bundle handed to every analyzer.
#[derive(Debug, Clone)]
pub struct ReviewContext {
    pub diff: ParsedDiff,
    pub config: ReviewConfig,
    pub metadata: Option<PrMetadata>,
}

// ─── Findings ─────────────────────────────────────────────────────────────────

/// A structured critique tied to a file and line.
///
/// `description` is the canonical field; the wire representation additionally
/// exposes a `message` alias (see [`Finding::to_wire`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub file_path: String,
    pub line_number: u32,
    pub severity: Severity,
    pub category: Category,
    #[serde(alias = "message")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub agent_source: String,
}

impl Finding {
    /// Wire JSON with the backward-compatible `message` alias duplicated
    /// from `description`.
    pub fn to_wire(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "message".to_string(),
                serde_json::Value::String(self.description.clone()),
            );
        }
        value
    }
}

/// Terminal outcome of one analyzer that did not complete. Recorded in the
/// review diagnostics; never fails the review itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerFailure {
    pub category: Category,
    pub kind: FailureKind,
    pub message: String,
}

/// Why an analyzer produced no findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Transport,
    Auth,
    RateLimited,
    Parse,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Transport => "transport",
            FailureKind::Auth => "auth",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Parse => "parse",
            FailureKind::Internal => "internal",
        }
    }
}

// ─── Summary & result ─────────────────────────────────────────────────────────

/// Aggregate statistics for one review run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total_findings: usize,
    #[serde(default)]
    pub by_severity: BTreeMap<Severity, usize>,
    #[serde(default)]
    pub by_category: BTreeMap<Category, usize>,
    pub files_analyzed: usize,
    pub lines_changed: usize,
}

/// Persisted, externally addressable outcome of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub review_id: Uuid,
    pub metadata: PrMetadata,
    pub commit_sha: String,
    pub config: ReviewConfig,
    pub findings: Vec<Finding>,
    pub summary: ReviewSummary,
    pub timestamp: DateTime<Utc>,
}
