use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::extractors::AppJson;
use crate::models::question::{VoteRequest, VoteResponse};
use crate::services::{question_service::QuestionService, AppState};

/// POST /api/v1/questions/{id}/votes
pub async fn vote(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<i64>,
    AppJson(req): AppJson<VoteRequest>,
) -> Result<Json<VoteResponse>, ApiError> {
    let service = QuestionService::new(&state);
    Ok(Json(service.vote(question_id, req.vote).await?))
}
