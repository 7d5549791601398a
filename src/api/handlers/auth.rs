use crate::api::extract::{AdminUser, AuthUser};
use crate::api::middleware::csrf_cookie_name;
use crate::api::request::ClientInfo;
use crate::auth::{clear_cookie, session_cookie};
use crate::error::AppResult;
use crate::models::{SessionKind, User};
use crate::services::LoginOutcome;
use crate::AppState;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub token: String,
    pub token_type: &'static str,
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

fn login_response(state: &AppState, outcome: LoginOutcome) -> impl IntoResponse {
    let secure = state.config.is_production();
    let max_age = (outcome.expires_at - Utc::now()).num_seconds().max(0);
    let cookies = [
        (
            SET_COOKIE,
            session_cookie(outcome.kind.cookie_name(), &outcome.token, max_age, true, secure),
        ),
        (
            SET_COOKIE,
            session_cookie(csrf_cookie_name(outcome.kind), &outcome.csrf_token, max_age, false, secure),
        ),
    ];

    (
        AppendHeaders(cookies),
        Json(SessionResponse {
            user: outcome.user,
            token: outcome.token,
            token_type: "bearer",
            csrf_token: outcome.csrf_token,
            expires_at: outcome.expires_at,
        }),
    )
}

fn logout_response(kind: SessionKind) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        AppendHeaders([
            (SET_COOKIE, clear_cookie(kind.cookie_name())),
            (SET_COOKIE, clear_cookie(csrf_cookie_name(kind))),
        ]),
    )
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let user = state
        .sessions
        .register(&payload.email, &payload.display_name, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .sessions
        .login(&payload.email, &payload.password, client.meta())
        .await?;
    Ok(login_response(&state, outcome))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
) -> AppResult<impl IntoResponse> {
    state.sessions.end_session(&ctx).await?;
    Ok(logout_response(SessionKind::User))
}

pub async fn me(AuthUser(ctx): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        is_admin: ctx.user.is_admin(),
        user: ctx.user,
    })
}

/// Issue a fresh CSRF token for the current session
pub async fn csrf_token(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
) -> impl IntoResponse {
    let token = state.sessions.csrf_token(&ctx);
    let cookie = session_cookie(
        csrf_cookie_name(SessionKind::User),
        &token,
        state.config.security.session_ttl_secs,
        false,
        state.config.is_production(),
    );
    (
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(CsrfResponse { csrf_token: token }),
    )
}

pub async fn admin_login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .sessions
        .admin_login(&payload.email, &payload.password, client.meta())
        .await?;
    Ok(login_response(&state, outcome))
}

pub async fn admin_logout(
    State(state): State<Arc<AppState>>,
    AdminUser(ctx): AdminUser,
) -> AppResult<impl IntoResponse> {
    state.sessions.end_session(&ctx).await?;
    Ok(logout_response(SessionKind::Admin))
}
