//! Session extractors for handlers.

use super::request::client_ip;
use crate::auth::{bearer_token, cookie_value};
use crate::error::AppError;
use crate::models::{NewSecurityEvent, SecurityEventType, SessionKind};
use crate::services::AuthContext;
use crate::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::sync::Arc;

/// Session token for `kind`: bearer header first, then the session cookie
pub fn session_token(headers: &HeaderMap, kind: SessionKind) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_value(headers, kind.cookie_name()))
}

fn security_event(parts: &Parts, event_type: SecurityEventType) -> NewSecurityEvent {
    let mut event = NewSecurityEvent::new(event_type).path(parts.uri.path());
    if let Some(ip) = client_ip(&parts.headers, &parts.extensions) {
        event = event.ip(ip);
    }
    event
}

/// Caller with a valid player session
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthContext);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, SessionKind::User)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

        match state.sessions.authenticate(&token, SessionKind::User).await {
            Ok(ctx) => Ok(AuthUser(ctx)),
            Err(e @ AppError::Unauthorized(_)) => {
                state
                    .security
                    .record_detached(security_event(parts, SecurityEventType::InvalidSession));
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

/// Caller with a valid admin session
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthContext);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, SessionKind::Admin)
            .ok_or_else(|| AppError::Unauthorized("Admin session required".to_string()))?;

        let err = match state.sessions.authenticate(&token, SessionKind::Admin).await {
            Ok(ctx) => return Ok(AdminUser(ctx)),
            Err(e @ AppError::Unauthorized(_)) | Err(e @ AppError::Forbidden(_)) => e,
            Err(e) => return Err(e),
        };

        // A live player session on an admin route is an access violation
        if let Ok(player) = state.sessions.authenticate(&token, SessionKind::User).await {
            state.security.record_detached(
                security_event(parts, SecurityEventType::AdminAccessDenied).user(player.user.id),
            );
            return Err(AppError::Forbidden("Administrator access required".to_string()));
        }

        state
            .security
            .record_detached(security_event(parts, SecurityEventType::InvalidSession));
        Err(err)
    }
}
