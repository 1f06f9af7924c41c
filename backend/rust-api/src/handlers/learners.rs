use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::{require_session, ApiError};
use crate::extractors::AppJson;
use crate::models::answer::{
    AnswerResult, JokerKind, JokerRequest, JokerResponse, NextQuestionResponse,
    SubmitAnswerRequest,
};
use crate::models::crisis::CrisisStatus;
use crate::models::profile::UserProfile;
use crate::models::progress::{GlossaryEntry, LearnerStats};
use crate::services::{
    answer_service::AnswerService, lifeline_service::LifelineService,
    question_service::QuestionService, AppState,
};

fn answers(state: &AppState) -> AnswerService {
    AnswerService::new(
        state.store.clone(),
        state.replication.clone(),
        state.clock.clone(),
    )
}

fn lifelines(state: &AppState) -> LifelineService {
    LifelineService::new(
        state.store.clone(),
        state.replication.clone(),
        state.clock.clone(),
    )
}

/// GET /api/v1/learners/{id}
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    require_session(&state, &identity)?;
    Ok(Json(answers(&state).profile(&identity).await?))
}

/// GET /api/v1/learners/{id}/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<LearnerStats>, ApiError> {
    require_session(&state, &identity)?;
    Ok(Json(answers(&state).stats(&identity).await?))
}

/// GET /api/v1/learners/{id}/glossary
pub async fn get_glossary(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<Vec<GlossaryEntry>>, ApiError> {
    require_session(&state, &identity)?;
    Ok(Json(answers(&state).glossary(&identity).await?))
}

/// GET /api/v1/learners/{id}/question
pub async fn next_question(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<NextQuestionResponse>, ApiError> {
    require_session(&state, &identity)?;
    let service = QuestionService::new(&state);
    Ok(Json(service.next_question(&identity).await?))
}

/// POST /api/v1/learners/{id}/answers
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<Json<AnswerResult>, ApiError> {
    require_session(&state, &identity)?;
    Ok(Json(answers(&state).validate(&identity, &req).await?))
}

/// POST /api/v1/learners/{id}/crisis/timeout
///
/// Client-side time's-up signal. The deadline is re-checked here; an early
/// signal changes nothing.
pub async fn crisis_timeout(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<CrisisStatus>, ApiError> {
    require_session(&state, &identity)?;
    Ok(Json(state.crisis_service().expire_if_due(&identity).await?))
}

/// POST /api/v1/learners/{id}/jokers/{kind}
pub async fn use_joker(
    State(state): State<Arc<AppState>>,
    Path((identity, kind)): Path<(String, JokerKind)>,
    AppJson(req): AppJson<JokerRequest>,
) -> Result<Json<JokerResponse>, ApiError> {
    require_session(&state, &identity)?;
    Ok(Json(lifelines(&state)
        .use_joker(&identity, kind, req.question_id)
        .await?))
}

/// POST /api/v1/learners/{id}/grace
pub async fn grant_grace(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    require_session(&state, &identity)?;
    Ok(Json(lifelines(&state).grant_grace(&identity).await?))
}

/// POST /api/v1/learners/{id}/restock
pub async fn restock(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    require_session(&state, &identity)?;
    Ok(Json(lifelines(&state).restock(&identity).await?))
}
