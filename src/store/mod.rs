// SPDX-License-Identifier: MIT
//! Review persistence — `reviews` and `findings` tables in SQLite.
//!
//! Saving a review is atomic: the review row and every finding row land in
//! one transaction or not at all. Queries return results ordered by
//! timestamp descending.

use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, SqlitePool};
use uuid::Uuid;

use crate::models::{
    Category, Finding, PrMetadata, ReviewConfig, ReviewResult, ReviewSummary, Severity,
};

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

const MIGRATIONS: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS reviews (
        review_id   TEXT PRIMARY KEY,
        repository  TEXT NOT NULL,
        pr_number   INTEGER NOT NULL,
        title       TEXT NOT NULL DEFAULT '',
        author      TEXT NOT NULL DEFAULT '',
        commit_sha  TEXT NOT NULL DEFAULT '',
        base_branch TEXT NOT NULL DEFAULT '',
        head_branch TEXT NOT NULL DEFAULT '',
        config      TEXT NOT NULL,
        summary     TEXT NOT NULL,
        timestamp   TEXT NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS findings (
        review_id    TEXT NOT NULL REFERENCES reviews(review_id) ON DELETE CASCADE,
        ordinal      INTEGER NOT NULL,
        file_path    TEXT NOT NULL,
        line_number  INTEGER NOT NULL,
        severity     TEXT NOT NULL,
        category     TEXT NOT NULL,
        description  TEXT NOT NULL,
        suggestion   TEXT,
        agent_source TEXT NOT NULL,
        PRIMARY KEY (review_id, ordinal)
    )",
    "CREATE INDEX IF NOT EXISTS idx_reviews_repo_pr ON reviews(repository, pr_number)",
    "CREATE INDEX IF NOT EXISTS idx_reviews_timestamp ON reviews(timestamp)",
];

// ─── Row types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReviewRow {
    review_id: String,
    repository: String,
    pr_number: i64,
    title: String,
    author: String,
    commit_sha: String,
    base_branch: String,
    head_branch: String,
    config: String,
    summary: String,
    timestamp: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct FindingRow {
    review_id: String,
    file_path: String,
    line_number: i64,
    severity: String,
    category: String,
    description: String,
    suggestion: Option<String>,
    agent_source: String,
}

impl FindingRow {
    fn into_finding(self) -> Result<Finding> {
        Ok(Finding {
            file_path: self.file_path,
            line_number: self.line_number as u32,
            severity: Severity::parse(&self.severity)
                .ok_or_else(|| anyhow!("unknown severity in findings table: {}", self.severity))?,
            category: Category::parse(&self.category)
                .ok_or_else(|| anyhow!("unknown category in findings table: {}", self.category))?,
            description: self.description,
            suggestion: self.suggestion,
            agent_source: self.agent_source,
        })
    }
}

impl ReviewRow {
    fn into_result(self, findings: Vec<Finding>) -> Result<ReviewResult> {
        let config: ReviewConfig =
            serde_json::from_str(&self.config).context("decoding stored review config")?;
        let summary: ReviewSummary =
            serde_json::from_str(&self.summary).context("decoding stored review summary")?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .context("decoding stored review timestamp")?
            .with_timezone(&Utc);
        Ok(ReviewResult {
            review_id: Uuid::parse_str(&self.review_id).context("decoding stored review id")?,
            metadata: PrMetadata {
                repository: self.repository,
                pr_number: self.pr_number as u64,
                title: self.title,
                author: self.author,
                head_commit_sha: self.commit_sha.clone(),
                base_branch: self.base_branch,
                head_branch: self.head_branch,
            },
            commit_sha: self.commit_sha,
            config,
            findings,
            summary,
            timestamp,
        })
    }
}

// ─── Query filters ────────────────────────────────────────────────────────────

/// Filters for the review history query.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub repository: Option<String>,
    pub pr_number: Option<u64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Keep only reviews with at least one finding at or above this severity.
    pub min_severity: Option<Severity>,
    /// Keep only reviews with at least one finding in this category.
    pub category: Option<Category>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ─── ReviewStore ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ReviewStore {
    pool: SqlitePool,
}

impl ReviewStore {
    /// Open (or create) the database under `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .context("creating data directory")?;
        let db_path = data_dir.join("reviewd.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests. Capped at one connection so every query
    /// sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        for sql in MIGRATIONS {
            sqlx::query(sql)
                .execute(pool)
                .await
                .context("running review store migration")?;
        }
        Ok(())
    }

    /// Liveness probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Persist a completed review atomically. Returns the review id.
    pub async fn save(&self, result: &ReviewResult) -> Result<Uuid> {
        with_timeout(async {
            let mut tx = self.pool.begin().await.context("opening save transaction")?;

            sqlx::query(
                r"INSERT INTO reviews
                  (review_id, repository, pr_number, title, author, commit_sha,
                   base_branch, head_branch, config, summary, timestamp)
                  VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )
            .bind(result.review_id.to_string())
            .bind(&result.metadata.repository)
            .bind(result.metadata.pr_number as i64)
            .bind(&result.metadata.title)
            .bind(&result.metadata.author)
            .bind(&result.commit_sha)
            .bind(&result.metadata.base_branch)
            .bind(&result.metadata.head_branch)
            .bind(serde_json::to_string(&result.config)?)
            .bind(serde_json::to_string(&result.summary)?)
            .bind(result.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .context("inserting review row")?;

            for (ordinal, finding) in result.findings.iter().enumerate() {
                sqlx::query(
                    r"INSERT INTO findings
                      (review_id, ordinal, file_path, line_number, severity,
                       category, description, suggestion, agent_source)
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .bind(result.review_id.to_string())
                .bind(ordinal as i64)
                .bind(&finding.file_path)
                .bind(finding.line_number as i64)
                .bind(finding.severity.as_str())
                .bind(finding.category.as_str())
                .bind(&finding.description)
                .bind(&finding.suggestion)
                .bind(&finding.agent_source)
                .execute(&mut *tx)
                .await
                .context("inserting finding row")?;
            }

            tx.commit().await.context("committing review save")?;
            Ok(result.review_id)
        })
        .await
    }

    /// Fetch one review with its findings.
    pub async fn get(&self, review_id: Uuid) -> Result<Option<ReviewResult>> {
        with_timeout(async {
            let row: Option<ReviewRow> =
                sqlx::query_as("SELECT * FROM reviews WHERE review_id = ?1")
                    .bind(review_id.to_string())
                    .fetch_optional(&self.pool)
                    .await
                    .context("fetching review row")?;

            let Some(row) = row else { return Ok(None) };
            let findings = self.load_findings(&[row.review_id.clone()]).await?;
            Ok(Some(row.into_result(findings)?))
        })
        .await
    }

    /// Query reviews with filters, newest first.
    pub async fn query(&self, filter: &HistoryFilter) -> Result<Vec<ReviewResult>> {
        with_timeout(async {
            let mut qb: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("SELECT * FROM reviews WHERE 1=1");

            if let Some(repository) = &filter.repository {
                qb.push(" AND repository = ").push_bind(repository);
            }
            if let Some(pr_number) = filter.pr_number {
                qb.push(" AND pr_number = ").push_bind(pr_number as i64);
            }
            if let Some(start) = filter.start {
                qb.push(" AND timestamp >= ").push_bind(start.to_rfc3339());
            }
            if let Some(end) = filter.end {
                qb.push(" AND timestamp <= ").push_bind(end.to_rfc3339());
            }
            if let Some(min) = filter.min_severity {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM findings f \
                      WHERE f.review_id = reviews.review_id AND f.severity IN (",
                );
                let mut first = true;
                for severity in [
                    Severity::Low,
                    Severity::Medium,
                    Severity::High,
                    Severity::Critical,
                ] {
                    if severity < min {
                        continue;
                    }
                    if !first {
                        qb.push(", ");
                    }
                    qb.push_bind(severity.as_str());
                    first = false;
                }
                qb.push("))");
            }
            if let Some(category) = filter.category {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM findings f \
                      WHERE f.review_id = reviews.review_id AND f.category = ",
                );
                qb.push_bind(category.as_str());
                qb.push(")");
            }

            qb.push(" ORDER BY timestamp DESC LIMIT ")
                .push_bind(filter.limit.unwrap_or(50).clamp(1, 1000));
            qb.push(" OFFSET ").push_bind(filter.offset.unwrap_or(0).max(0));

            let rows: Vec<ReviewRow> = qb
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .context("querying reviews")?;

            let ids: Vec<String> = rows.iter().map(|r| r.review_id.clone()).collect();
            let mut all_findings = self.load_findings_grouped(&ids).await?;

            rows.into_iter()
                .map(|row| {
                    let findings = all_findings.remove(&row.review_id).unwrap_or_default();
                    row.into_result(findings)
                })
                .collect()
        })
        .await
    }

    /// All reviews for one pull request, newest first.
    pub async fn by_pr(&self, repository: &str, pr_number: u64) -> Result<Vec<ReviewResult>> {
        self.query(&HistoryFilter {
            repository: Some(repository.to_string()),
            pr_number: Some(pr_number),
            limit: Some(1000),
            ..HistoryFilter::default()
        })
        .await
    }

    async fn load_findings(&self, review_ids: &[String]) -> Result<Vec<Finding>> {
        let grouped = self.load_findings_grouped(review_ids).await?;
        Ok(grouped.into_values().flatten().collect())
    }

    /// Batch-load findings for a set of reviews in one query.
    async fn load_findings_grouped(
        &self,
        review_ids: &[String],
    ) -> Result<std::collections::HashMap<String, Vec<Finding>>> {
        let mut grouped: std::collections::HashMap<String, Vec<Finding>> =
            std::collections::HashMap::new();
        if review_ids.is_empty() {
            return Ok(grouped);
        }

        let mut qb: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT * FROM findings WHERE review_id IN (");
        let mut separated = qb.separated(", ");
        for id in review_ids {
            separated.push_bind(id);
        }
        qb.push(") ORDER BY review_id, ordinal");

        let rows: Vec<FindingRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("loading findings")?;

        for row in rows {
            let review_id = row.review_id.clone();
            grouped
                .entry(review_id)
                .or_default()
                .push(row.into_finding()?);
        }
        Ok(grouped)
    }
}
