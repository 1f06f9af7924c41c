use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use super::ApiError;
use crate::extractors::AppJson;
use crate::models::profile::{LoginRequest, RegisterRequest, ResumeRequest, SessionResponse};
use crate::services::{session_service::SessionService, AppState};

fn service(state: &AppState) -> SessionService {
    SessionService::new(
        state.store.clone(),
        state.replication.clone(),
        state.sessions.clone(),
        state.clock.clone(),
    )
}

/// POST /api/v1/learners
pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = service(&state).register(&req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/sessions/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    Ok(Json(service(&state).login(&req).await?))
}

/// POST /api/v1/sessions/resume
pub async fn resume(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ResumeRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    Ok(Json(service(&state).resume(&req.identity).await?))
}
