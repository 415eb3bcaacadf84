//! Operational HTTP surface.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `GET /outbox/stats`: `{"unpublished": n, "stuck": n}`
//! - `POST /outbox/publish`: one cycle now, `{"published": n, "failed": n}`
//! - `GET /outbox/health`: `{"status": "UP", "state": "..."}`
//! - `GET /outbox/stuck?limit=n`: stuck entries with `last_error`
//! - `POST /outbox/entries/:id/fail`: operator gives up on an entry
//! - `POST /outbox/entries/:id/reset`: operator resets `retry_count`
//!
//! ## Example
//!
//! ```ignore
//! let ops = PublisherBuilder::new()/* ... */.build_operations()?;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! ferry_core::http::serve(ops, listener, shutdown_signal()).await?;
//! ```

use std::future::Future;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::app::Operations;
use crate::domain::{EntryId, StoreError};
use crate::error::OutboxError;

/// Build an axum `Router` over the given operations.
pub fn router(ops: Operations) -> Router {
    Router::new()
        .route("/outbox/stats", get(stats_handler))
        .route("/outbox/publish", post(publish_handler))
        .route("/outbox/health", get(health_handler))
        .route("/outbox/stuck", get(stuck_handler))
        .route("/outbox/entries/:id/fail", post(fail_handler))
        .route("/outbox/entries/:id/reset", post(reset_handler))
        .with_state(ops)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(
    ops: Operations,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(ops))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Error body with a status derived from the failure.
struct ApiError(StatusCode, String);

impl From<OutboxError> for ApiError {
    fn from(e: OutboxError) -> Self {
        let status = match &e {
            OutboxError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            OutboxError::Store(StoreError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            OutboxError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %e, "operational request failed");
        }
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

fn parse_id(raw: &str) -> Result<EntryId, ApiError> {
    raw.parse()
        .map_err(|e: crate::domain::ParseIdError| ApiError(StatusCode::BAD_REQUEST, e.to_string()))
}

async fn stats_handler(State(ops): State<Operations>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(ops.stats().await?))
}

async fn publish_handler(State(ops): State<Operations>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(ops.trigger().await?))
}

async fn health_handler(State(ops): State<Operations>) -> impl IntoResponse {
    Json(ops.health())
}

#[derive(Debug, Deserialize)]
struct StuckQuery {
    limit: Option<usize>,
}

async fn stuck_handler(
    State(ops): State<Operations>,
    Query(query): Query<StuckQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(Operations::DEFAULT_STUCK_LIMIT);
    Ok(Json(ops.list_stuck(limit).await?))
}

async fn fail_handler(
    State(ops): State<Operations>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = ops.mark_failed(parse_id(&id)?).await?;
    Ok(Json(json!({ "id": entry.id, "status": entry.status })))
}

async fn reset_handler(
    State(ops): State<Operations>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = ops.reset_retries(parse_id(&id)?).await?;
    Ok(Json(json!({
        "id": entry.id,
        "status": entry.status,
        "retry_count": entry.retry_count,
    })))
}
