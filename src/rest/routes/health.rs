use crate::AppContext;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let database = match ctx.store.ping().await {
        Ok(()) => "ok",
        Err(_) => "error",
    };
    let uptime = ctx.started_at.elapsed().as_secs();
    Json(json!({
        "status": if database == "ok" { "ok" } else { "degraded" },
        "database": database,
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
