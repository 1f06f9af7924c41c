use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::error::{EngineError, StoreResult};
use crate::metrics;
use crate::services::AppState;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    Forbidden(String),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::ProfileNotFound(_) | EngineError::QuestionNotFound(_) => {
                ApiError::NotFound(message)
            }
            EngineError::SessionNotResumed(_) => ApiError::Unauthorized(message),
            EngineError::OutOfLives => ApiError::Forbidden(message),
            EngineError::DuplicateEmail(_) => ApiError::Conflict(message),
            EngineError::JokerUnavailable(_)
            | EngineError::InsufficientXp { .. }
            | EngineError::InvalidInput(_) => ApiError::BadRequest(message),
            EngineError::Store(e) => {
                tracing::error!("Local store failure: {}", e);
                ApiError::Internal("local store failure".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        let body = json!({
            "message": message,
            "status": status.as_u16()
        });
        (status, Json(body)).into_response()
    }
}

/// Engine endpoints only serve identities resumed in this process.
pub(crate) fn require_session(state: &AppState, identity: &str) -> Result<(), ApiError> {
    state.sessions.ensure_resumed(identity).map_err(ApiError::from)
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let local_store = state
        .store
        .read("health", |conn| -> StoreResult<()> {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await;

    let (status_code, status, store_status) = match local_store {
        Ok(()) => (StatusCode::OK, "healthy", json!({ "status": "healthy" })),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "unhealthy",
            json!({ "status": "unhealthy", "error": e.to_string() }),
        ),
    };
    let mirror = if state.replication.is_enabled() {
        "enabled"
    } else {
        "disabled"
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "mentor-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": {
                "local_store": store_status,
                "remote_mirror": { "status": mirror }
            }
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

pub mod learners;
pub mod questions;
pub mod sessions;
