// rest/mod.rs — Public REST API server.
//
// Axum HTTP server exposing the review pipeline.
//
// Endpoints:
//   POST /api/reviews
//   GET  /api/reviews/history
//   GET  /api/reviews/{id}
//   GET  /api/reviews/{id}/status
//   GET  /health

pub mod rate_limit;
pub mod routes;

use anyhow::Result;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.host, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let api = Router::new()
        .route("/api/reviews", post(routes::reviews::create_review))
        .route("/api/reviews/history", get(routes::reviews::review_history))
        .route("/api/reviews/:id", get(routes::reviews::get_review))
        .route(
            "/api/reviews/:id/status",
            get(routes::reviews::review_status),
        )
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            rate_limit::enforce,
        ));

    Router::new()
        // Health is exempt from the per-origin quota.
        .route("/health", get(routes::health::health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
