use crate::api::extract::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::{Difficulty, LeaderboardEntry, PublicQuiz, QuizAttempt, QuizSummary, SubmittedAnswer};
use crate::services::AttemptResult;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct QuizListQuery {
    pub category: Option<String>,
    pub difficulty: Option<String>,
    #[serde(default = "default_page_size")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_page_size() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

pub async fn list_quizzes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuizListQuery>,
) -> AppResult<Json<Vec<QuizSummary>>> {
    let difficulty = query
        .difficulty
        .as_deref()
        .map(Difficulty::from_str)
        .transpose()
        .map_err(AppError::Validation)?;
    let category = query.category.as_deref().filter(|c| !c.trim().is_empty());

    let quizzes = state
        .quizzes
        .list_published(category, difficulty, query.limit, query.offset)
        .await?;
    Ok(Json(quizzes))
}

pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<Uuid>,
) -> AppResult<Json<PublicQuiz>> {
    Ok(Json(state.quizzes.get_public_quiz(quiz_id).await?))
}

pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Path(quiz_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<QuizAttempt>)> {
    let attempt = state.quizzes.start_attempt(ctx.user.id, quiz_id).await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<SubmitRequest>,
) -> AppResult<Json<AttemptResult>> {
    let result = state
        .quizzes
        .submit_attempt(ctx.user.id, attempt_id, &payload.answers)
        .await?;
    Ok(Json(result))
}

pub async fn attempt_history(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<QuizAttempt>>> {
    let attempts = state
        .quizzes
        .attempt_history(ctx.user.id, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(attempts))
}

pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<LeaderboardEntry>>> {
    let entries = state
        .quizzes
        .leaderboard(quiz_id, query.limit.unwrap_or(10))
        .await?;
    Ok(Json(entries))
}
