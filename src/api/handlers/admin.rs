//! Admin surface: dashboard, quiz management, users, wallets, prizes and
//! security monitoring. Every handler requires an admin session.

use super::Pagination;
use crate::api::extract::AdminUser;
use crate::error::{AppError, AppResult};
use crate::models::{
    Prize, PrizeRedemption, QuizDetail, QuizDraft, RedemptionStatus, SecurityEvent,
    SecuritySeverity, User, WalletTransaction,
};
use crate::security::SecuritySummary;
use crate::services::{DashboardStats, PrizeInput};
use crate::websocket::{Channel, ChannelMember};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub stats: DashboardStats,
    pub online_admins: Vec<ChannelMember>,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(default = "default_true")]
    pub published: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub amount: Decimal,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RedemptionQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RedemptionStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SecurityEventQuery {
    pub limit: Option<i64>,
    pub min_severity: Option<String>,
    pub ip: Option<String>,
    pub since_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub hours: Option<i64>,
}

fn parse_redemption_status(raw: &str) -> AppResult<RedemptionStatus> {
    RedemptionStatus::from_str(raw).map_err(AppError::Validation)
}

/// Look-back window in hours, at most 30 days
fn since_hours(hours: Option<i64>) -> chrono::DateTime<Utc> {
    Utc::now() - Duration::hours(hours.unwrap_or(24).clamp(1, 24 * 30))
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<DashboardResponse>> {
    let stats = state.admin.dashboard_stats().await?;
    let online_admins = state
        .ws_hub
        .channel_members(&Channel::AdminDashboard.to_string())
        .await;
    Ok(Json(DashboardResponse {
        stats,
        online_admins,
    }))
}

pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(draft): Json<QuizDraft>,
) -> AppResult<(StatusCode, Json<QuizDetail>)> {
    let detail = state.admin.create_quiz(admin.user.id, &draft).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(quiz_id): Path<Uuid>,
) -> AppResult<Json<QuizDetail>> {
    Ok(Json(state.admin.get_quiz(quiz_id).await?))
}

pub async fn update_quiz(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(quiz_id): Path<Uuid>,
    Json(draft): Json<QuizDraft>,
) -> AppResult<Json<QuizDetail>> {
    Ok(Json(state.admin.update_quiz(admin.user.id, quiz_id, &draft).await?))
}

pub async fn publish_quiz(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(quiz_id): Path<Uuid>,
    Json(payload): Json<PublishRequest>,
) -> AppResult<Json<QuizDetail>> {
    let detail = state
        .admin
        .set_published(admin.user.id, quiz_id, payload.published)
        .await?;
    Ok(Json(detail))
}

pub async fn delete_quiz(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(quiz_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.admin.delete_quiz(admin.user.id, quiz_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.admin.list_users(page.limit, page.offset).await?))
}

pub async fn set_user_active(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<SetActiveRequest>,
) -> AppResult<Json<User>> {
    let user = state
        .admin
        .set_user_active(admin.user.id, user_id, payload.active)
        .await?;
    Ok(Json(user))
}

pub async fn adjust_wallet(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AdjustRequest>,
) -> AppResult<(StatusCode, Json<WalletTransaction>)> {
    let entry = state
        .wallets
        .admin_adjust(admin.user.id, user_id, payload.amount, &payload.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn create_prize(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(input): Json<PrizeInput>,
) -> AppResult<(StatusCode, Json<Prize>)> {
    let prize = state.prizes.create_prize(admin.user.id, &input).await?;
    Ok((StatusCode::CREATED, Json(prize)))
}

pub async fn update_prize(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(prize_id): Path<Uuid>,
    Json(input): Json<PrizeInput>,
) -> AppResult<Json<Prize>> {
    Ok(Json(state.prizes.update_prize(admin.user.id, prize_id, &input).await?))
}

pub async fn list_redemptions(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<RedemptionQuery>,
) -> AppResult<Json<Vec<PrizeRedemption>>> {
    let status = query
        .status
        .as_deref()
        .map(parse_redemption_status)
        .transpose()?;
    let redemptions = state
        .prizes
        .list_redemptions(status, query.limit.unwrap_or(100))
        .await?;
    Ok(Json(redemptions))
}

pub async fn update_redemption(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(redemption_id): Path<Uuid>,
    Json(payload): Json<RedemptionStatusRequest>,
) -> AppResult<Json<PrizeRedemption>> {
    let next = parse_redemption_status(&payload.status)?;
    let redemption = state
        .prizes
        .update_redemption_status(admin.user.id, redemption_id, next)
        .await?;
    Ok(Json(redemption))
}

pub async fn security_events(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<SecurityEventQuery>,
) -> AppResult<Json<Vec<SecurityEvent>>> {
    if let Some(ip) = query.ip.as_deref().filter(|ip| !ip.is_empty()) {
        let events = state
            .security
            .events_for_ip(ip, since_hours(query.since_hours))
            .await?;
        return Ok(Json(events));
    }

    let min_severity = query
        .min_severity
        .as_deref()
        .map(SecuritySeverity::from_str)
        .transpose()
        .map_err(AppError::Validation)?
        .unwrap_or(SecuritySeverity::Low);
    let events = state
        .security
        .recent_events(query.limit.unwrap_or(100), min_severity)
        .await?;
    Ok(Json(events))
}

pub async fn security_summary(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Json<SecuritySummary>> {
    Ok(Json(state.security.summary(since_hours(query.hours)).await?))
}
