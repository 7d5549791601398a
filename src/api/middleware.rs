//! Rate-limit and CSRF middleware.

use super::request::client_ip;
use crate::auth::{bearer_token, cookie_value, hash_token};
use crate::csrf::CSRF_HEADER;
use crate::error::AppError;
use crate::models::{NewSecurityEvent, SecurityEventType, SessionKind};
use crate::rate_limit::RateLimitDecision;
use crate::AppState;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

/// Session kind guarding a path
pub fn session_kind_for_path(path: &str) -> SessionKind {
    if path.starts_with("/api/admin") {
        SessionKind::Admin
    } else {
        SessionKind::User
    }
}

/// Cookie carrying the readable CSRF token for a session kind
pub fn csrf_cookie_name(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::User => crate::csrf::CSRF_COOKIE,
        SessionKind::Admin => "admin_csrf_token",
    }
}

fn set_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
}

/// Count the request against the caller's window; 429 once exhausted
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let ip = client_ip(request.headers(), request.extensions());
    let key = ip.as_deref().unwrap_or("unknown");

    let policy = state.rate_limiter.policy_for_path(&path);
    let decision = state.rate_limiter.check(key, policy).await;

    if !decision.allowed {
        let mut event = NewSecurityEvent::new(SecurityEventType::RateLimitExceeded)
            .path(path.as_str())
            .details(serde_json::json!({ "policy": policy.name, "limit": decision.limit }));
        if let Some(ip) = &ip {
            event = event.ip(ip.as_str());
        }
        state.security.record_detached(event);

        let mut response = AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs(),
        }
        .into_response();
        set_rate_limit_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(request).await;
    set_rate_limit_headers(response.headers_mut(), &decision);
    response
}

/// Routes that establish a session rather than act within one
const SESSIONLESS_PATHS: &[&str] = &["/api/auth/login", "/api/auth/register", "/api/admin/login"];

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Double-submit check for cookie-authenticated, state-changing requests
pub async fn csrf_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !is_state_changing(request.method()) || bearer_token(request.headers()).is_some() {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    if SESSIONLESS_PATHS.contains(&path.as_str()) {
        return next.run(request).await;
    }
    let kind = session_kind_for_path(&path);
    let headers = request.headers();

    // Without a session cookie there is no ambient authority to protect
    let Some(session) = cookie_value(headers, kind.cookie_name()) else {
        return next.run(request).await;
    };

    let header_token = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let cookie_token = cookie_value(headers, csrf_cookie_name(kind));

    let valid = match (&header_token, &cookie_token) {
        (Some(header), Some(cookie)) => {
            header == cookie && state.csrf.verify(&hash_token(&session), header)
        }
        _ => false,
    };

    if valid {
        return next.run(request).await;
    }

    let reason = match (&header_token, &cookie_token) {
        (None, _) => "missing header",
        (_, None) => "missing cookie",
        _ => "token mismatch",
    };
    debug!("CSRF check failed for {} {}: {}", request.method(), path, reason);

    let mut event = NewSecurityEvent::new(SecurityEventType::CsrfViolation)
        .path(path.as_str())
        .details(serde_json::json!({ "reason": reason, "method": request.method().as_str() }));
    if let Some(ip) = client_ip(request.headers(), request.extensions()) {
        event = event.ip(ip);
    }
    state.security.record_detached(event);

    AppError::Forbidden("CSRF token missing or invalid".to_string()).into_response()
}
