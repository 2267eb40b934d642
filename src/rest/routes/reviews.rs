// rest/routes/reviews.rs — Review REST routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::fetch::FetchErrorKind;
use crate::models::{AnalyzerFailure, Category, ChangeSource, ReviewConfig, ReviewResult, Severity};
use crate::service::ReviewError;
use crate::store::HistoryFilter;
use crate::AppContext;

type ApiError = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({
            "error_code": code,
            "message": message.into(),
            "timestamp": Utc::now(),
        })),
    )
}

fn map_review_error(err: ReviewError) -> ApiError {
    match &err {
        ReviewError::Validation(msg) => {
            error_response(StatusCode::BAD_REQUEST, "validation_error", msg.clone())
        }
        ReviewError::Parse(_) => {
            error_response(StatusCode::BAD_REQUEST, "diff_parse_error", err.to_string())
        }
        ReviewError::Fetch(fetch) => {
            let (status, code) = match fetch.kind {
                FetchErrorKind::UrlFormat => (StatusCode::BAD_REQUEST, "url_format"),
                FetchErrorKind::Auth => (StatusCode::UNAUTHORIZED, "upstream_auth"),
                FetchErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                FetchErrorKind::RateLimited => {
                    (StatusCode::TOO_MANY_REQUESTS, "upstream_rate_limited")
                }
                FetchErrorKind::Transport => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "upstream_transport")
                }
            };
            error_response(status, code, err.to_string())
        }
        ReviewError::Storage(_) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", err.to_string())
        }
        ReviewError::Cancelled => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "cancelled", err.to_string())
        }
    }
}

/// Serialize a `ReviewResult` into the wire `ReviewResponse`, duplicating
/// each finding's description into the `message` alias.
fn review_response(
    result: &ReviewResult,
    formatted_comments: &str,
    diagnostics: &[AnalyzerFailure],
) -> Value {
    json!({
        "review_id": result.review_id,
        "pr_metadata": result.metadata,
        "findings": result.findings.iter().map(|f| f.to_wire()).collect::<Vec<_>>(),
        "summary": result.summary,
        "formatted_comments": formatted_comments,
        "diagnostics": diagnostics,
        "timestamp": result.timestamp,
    })
}

// ─── POST /api/reviews ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub pr_url: Option<String>,
    pub repository: Option<String>,
    pub pr_number: Option<u64>,
    pub diff_content: Option<String>,
    pub access_token: Option<String>,
    pub config: Option<ReviewConfig>,
}

impl CreateReviewRequest {
    /// Exactly one change source: `pr_url`, `repository` + `pr_number`, or
    /// `diff_content` (which may carry repository/pr_number as labels).
    fn into_source(self) -> Result<ChangeSource, ApiError> {
        if let Some(diff) = self.diff_content {
            if self.pr_url.is_some() {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    "provide either pr_url or diff_content, not both",
                ));
            }
            return Ok(ChangeSource::Manual {
                diff,
                repository: self.repository,
                pr_number: self.pr_number,
            });
        }
        if let Some(url) = self.pr_url {
            if self.repository.is_some() || self.pr_number.is_some() {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    "provide either pr_url or repository + pr_number, not both",
                ));
            }
            return Ok(ChangeSource::Remote {
                url: Some(url),
                repository: None,
                pr_number: None,
                access_token: self.access_token,
            });
        }
        match (self.repository, self.pr_number) {
            (Some(repository), Some(pr_number)) => {
                if pr_number == 0 {
                    return Err(error_response(
                        StatusCode::BAD_REQUEST,
                        "validation_error",
                        "pr_number must be positive",
                    ));
                }
                Ok(ChangeSource::Remote {
                    url: None,
                    repository: Some(repository),
                    pr_number: Some(pr_number),
                    access_token: self.access_token,
                })
            }
            _ => Err(error_response(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "one of pr_url, repository + pr_number, or diff_content is required",
            )),
        }
    }
}

pub async fn create_review(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<CreateReviewRequest>,
) -> Result<Json<Value>, ApiError> {
    let config = body.config.clone().unwrap_or_default();
    let source = body.into_source()?;

    let outcome = ctx
        .service
        .review(source, config)
        .await
        .map_err(map_review_error)?;

    Ok(Json(review_response(
        &outcome.result,
        &outcome.markdown,
        &outcome.diagnostics,
    )))
}

// ─── GET /api/reviews/{id} ────────────────────────────────────────────────────

fn parse_review_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| {
        error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("invalid review id: {id}"),
        )
    })
}

fn not_found(id: &str) -> ApiError {
    error_response(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("review {id} not found"),
    )
}

pub async fn get_review(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let review_id = parse_review_id(&id)?;
    let result = ctx.store.get(review_id).await.map_err(|e| {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", e.to_string())
    })?;

    match result {
        // The rendered Markdown is not persisted; stored reviews return the
        // structured findings and summary only.
        Some(result) => Ok(Json(review_response(&result, "", &[]))),
        None => Err(not_found(&id)),
    }
}

// ─── GET /api/reviews/{id}/status ─────────────────────────────────────────────

pub async fn review_status(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let review_id = parse_review_id(&id)?;
    let result = ctx.store.get(review_id).await.map_err(|e| {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", e.to_string())
    })?;

    match result {
        Some(result) => Ok(Json(json!({
            "review_id": result.review_id,
            // The pipeline is synchronous: every stored review is complete.
            "status": "completed",
            "repository": result.metadata.repository,
            "pr_number": result.metadata.pr_number,
            "findings_count": result.findings.len(),
            "timestamp": result.timestamp,
        }))),
        None => Err(not_found(&id)),
    }
}

// ─── GET /api/reviews/history ─────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub repository: Option<String>,
    pub pr_number: Option<u64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub severity: Option<String>,
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn review_history(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let min_severity = match &query.severity {
        Some(s) => Some(Severity::parse(s).ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "validation_error",
                format!("unknown severity: {s}"),
            )
        })?),
        None => None,
    };
    let category = match &query.category {
        Some(c) => Some(Category::parse(c).ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "validation_error",
                format!("unknown category: {c}"),
            )
        })?),
        None => None,
    };

    let filter = HistoryFilter {
        repository: query.repository,
        pr_number: query.pr_number,
        start: query.start_date,
        end: query.end_date,
        min_severity,
        category,
        limit: query.limit,
        offset: query.offset,
    };

    let results = ctx.store.query(&filter).await.map_err(|e| {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", e.to_string())
    })?;

    let reviews: Vec<Value> = results
        .iter()
        .map(|r| review_response(r, "", &[]))
        .collect();
    Ok(Json(json!({ "reviews": reviews })))
}
