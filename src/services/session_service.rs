use crate::auth::{self, generate_token, hash_token};
use crate::config::SecurityConfig;
use crate::csrf::CsrfProtection;
use crate::error::{AppError, AppResult};
use crate::models::{NewSecurityEvent, SecurityEventType, SessionKind, User, UserRole};
use crate::repositories::{SessionRepository, UserRepository, WalletRepository};
use crate::security::SecurityMonitor;
use crate::transaction::TransactionManager;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub user: User,
    #[serde(skip_serializing)]
    pub token: String,
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
    pub kind: SessionKind,
}

/// Authenticated caller resolved from a session token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub session_id: Uuid,
    pub token_hash: String,
    pub kind: SessionKind,
    pub is_admin: bool,
}

/// Client metadata recorded with sessions and security events
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientMeta<'a> {
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

impl<'a> ClientMeta<'a> {
    fn ip_or_unknown(&self) -> &'a str {
        self.ip.unwrap_or("unknown")
    }
}

/// Service for registration, login and session lifecycle
pub struct SessionService {
    pool: PgPool,
    user_repo: Arc<UserRepository>,
    wallet_repo: Arc<WalletRepository>,
    session_repo: Arc<SessionRepository>,
    security: Arc<SecurityMonitor>,
    csrf: Arc<CsrfProtection>,
    transactions: Arc<TransactionManager>,
    session_ttl: Duration,
    admin_session_ttl: Duration,
}

impl SessionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        user_repo: Arc<UserRepository>,
        wallet_repo: Arc<WalletRepository>,
        session_repo: Arc<SessionRepository>,
        security: Arc<SecurityMonitor>,
        csrf: Arc<CsrfProtection>,
        transactions: Arc<TransactionManager>,
        config: &SecurityConfig,
    ) -> Self {
        Self {
            pool,
            user_repo,
            wallet_repo,
            session_repo,
            security,
            csrf,
            transactions,
            session_ttl: Duration::seconds(config.session_ttl_secs),
            admin_session_ttl: Duration::seconds(config.admin_session_ttl_secs),
        }
    }

    fn ttl(&self, kind: SessionKind) -> Duration {
        match kind {
            SessionKind::User => self.session_ttl,
            SessionKind::Admin => self.admin_session_ttl,
        }
    }

    /// Create an account and its empty wallet
    pub async fn register(&self, email: &str, display_name: &str, password: &str) -> AppResult<User> {
        let email = email.trim();
        let display_name = display_name.trim();

        auth::validate_email(email)?;
        auth::validate_password(password)?;
        if display_name.is_empty() || display_name.chars().count() > 64 {
            return Err(AppError::Validation(
                "Display name must be between 1 and 64 characters".to_string(),
            ));
        }

        if self.user_repo.find_by_email(email).await?.is_some() {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let password_hash = auth::hash_password(password)?;
        let password_hash = password_hash.as_str();
        let pool = &self.pool;
        let user_repo = &self.user_repo;
        let wallet_repo = &self.wallet_repo;

        let user = self
            .transactions
            .run_in_transaction(pool, "register", move |mut tx| async move {
                let user = user_repo
                    .create(&mut tx, email, display_name, password_hash, UserRole::User)
                    .await?;
                wallet_repo.create_wallet(&mut tx, user.id).await?;

                Ok::<_, AppError>((tx, user))
            })
            .await?;

        info!("Registered user {} ({})", user.id, user.email);
        Ok(user)
    }

    /// Verify credentials, reporting failures to the security monitor
    async fn check_credentials(&self, email: &str, password: &str, meta: ClientMeta<'_>) -> AppResult<User> {
        let user = self.user_repo.find_by_email(email.trim()).await?;
        let verified = match &user {
            Some(user) => auth::verify_password(&user.password_hash, password),
            None => auth::verify_unknown_account(password),
        };
        let user = match user {
            Some(user) if verified => user,
            _ => {
                if let Err(e) = self
                    .security
                    .record_failed_login(meta.ip_or_unknown(), email)
                    .await
                {
                    warn!("Failed to record failed login: {}", e);
                }
                return Err(AppError::Unauthorized("Invalid email or password".to_string()));
            }
        };

        if !user.is_active {
            return Err(AppError::Forbidden("Account is disabled".to_string()));
        }
        Ok(user)
    }

    async fn open_session(&self, user: User, kind: SessionKind, meta: ClientMeta<'_>) -> AppResult<LoginOutcome> {
        let token = generate_token();
        let token_hash = hash_token(&token);
        let expires_at = Utc::now() + self.ttl(kind);

        self.session_repo
            .create(kind, user.id, &token_hash, meta.ip, meta.user_agent, expires_at)
            .await?;

        Ok(LoginOutcome {
            csrf_token: self.csrf.issue(&token_hash),
            user,
            token,
            expires_at,
            kind,
        })
    }

    pub async fn login(&self, email: &str, password: &str, meta: ClientMeta<'_>) -> AppResult<LoginOutcome> {
        let user = self.check_credentials(email, password, meta).await?;

        let mut event = NewSecurityEvent::new(SecurityEventType::LoginSucceeded).user(user.id);
        if let Some(ip) = meta.ip {
            event = event.ip(ip);
        }
        self.security.record_detached(event);

        self.open_session(user, SessionKind::User, meta).await
    }

    /// Login to the admin surface; non-admin accounts are refused
    pub async fn admin_login(&self, email: &str, password: &str, meta: ClientMeta<'_>) -> AppResult<LoginOutcome> {
        let user = self.check_credentials(email, password, meta).await?;

        if !user.is_admin() {
            let mut event = NewSecurityEvent::new(SecurityEventType::AdminAccessDenied)
                .user(user.id)
                .path("/api/admin/login");
            if let Some(ip) = meta.ip {
                event = event.ip(ip);
            }
            self.security.record_detached(event);
            return Err(AppError::Forbidden("Administrator access required".to_string()));
        }

        let mut event = NewSecurityEvent::new(SecurityEventType::AdminLogin).user(user.id);
        if let Some(ip) = meta.ip {
            event = event.ip(ip);
        }
        self.security.record_detached(event);
        info!("Admin {} logged in", user.email);

        self.open_session(user, SessionKind::Admin, meta).await
    }

    /// Resolve a session token of the given kind
    pub async fn authenticate(&self, token: &str, kind: SessionKind) -> AppResult<AuthContext> {
        let token_hash = hash_token(token);
        let session = self
            .session_repo
            .find_active(kind, &token_hash)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Session expired or invalid".to_string()))?;

        let user = self
            .user_repo
            .find_by_id(session.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Unauthorized("Session expired or invalid".to_string()))?;

        if kind == SessionKind::Admin && !user.is_admin() {
            return Err(AppError::Forbidden("Administrator access required".to_string()));
        }

        if let Err(e) = self.session_repo.touch(kind, session.id).await {
            warn!("Failed to update session activity: {}", e);
        }

        Ok(AuthContext {
            is_admin: kind == SessionKind::Admin,
            user,
            session_id: session.id,
            token_hash,
            kind,
        })
    }

    /// Admin session first, then user session
    pub async fn authenticate_any(&self, token: &str) -> AppResult<AuthContext> {
        match self.authenticate(token, SessionKind::Admin).await {
            Ok(ctx) => Ok(ctx),
            Err(AppError::Unauthorized(_)) | Err(AppError::Forbidden(_)) => {
                self.authenticate(token, SessionKind::User).await
            }
            Err(e) => Err(e),
        }
    }

    /// Fresh CSRF token for an authenticated session
    pub fn csrf_token(&self, ctx: &AuthContext) -> String {
        self.csrf.issue(&ctx.token_hash)
    }

    /// Revoke the session an authenticated request came in on
    pub async fn end_session(&self, ctx: &AuthContext) -> AppResult<bool> {
        let revoked = self.session_repo.revoke(ctx.kind, &ctx.token_hash).await?;
        if revoked {
            info!("{:?} session {} of {} ended", ctx.kind, ctx.session_id, ctx.user.id);
        }
        Ok(revoked)
    }

    /// Revoke every user and admin session of an account
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> AppResult<u64> {
        let users = self.session_repo.revoke_all_for_user(SessionKind::User, user_id).await?;
        let admins = self.session_repo.revoke_all_for_user(SessionKind::Admin, user_id).await?;
        Ok(users + admins)
    }

    /// Delete sessions that are past expiry or were revoked
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let now = Utc::now();
        let users = self.session_repo.purge(SessionKind::User, now).await?;
        let admins = self.session_repo.purge(SessionKind::Admin, now).await?;
        Ok(users + admins)
    }
}
