//! QuizVault Backend Library
//!
//! Quiz taking, wallets and prize redemption behind a JSON API, with an
//! admin surface, security middleware and a WebSocket hub for admin
//! change notifications.

pub mod api;
pub mod auth;
pub mod config;
pub mod csrf;
pub mod database;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod repositories;
pub mod security;
pub mod services;
pub mod transaction;
pub mod websocket;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use csrf::CsrfProtection;
use database::Database;
use rate_limit::RateLimiter;
use repositories::*;
use security::SecurityMonitor;
use services::{AdminService, PrizeService, QuizService, SessionService, WalletService};
use std::sync::Arc;
use transaction::TransactionManager;
use websocket::WsHub;

/// Application state containing all repositories and services
pub struct AppState {
    pub config: AppConfig,
    pub database: Database,
    pub user_repo: Arc<UserRepository>,
    pub quiz_repo: Arc<QuizRepository>,
    pub attempt_repo: Arc<AttemptRepository>,
    pub wallet_repo: Arc<WalletRepository>,
    pub prize_repo: Arc<PrizeRepository>,
    pub session_repo: Arc<SessionRepository>,
    pub security_event_repo: Arc<SecurityEventRepository>,
    pub transactions: Arc<TransactionManager>,
    pub security: Arc<SecurityMonitor>,
    pub rate_limiter: Arc<RateLimiter>,
    pub csrf: Arc<CsrfProtection>,
    pub ws_hub: Arc<WsHub>,
    pub sessions: Arc<SessionService>,
    pub quizzes: Arc<QuizService>,
    pub wallets: Arc<WalletService>,
    pub prizes: Arc<PrizeService>,
    pub admin: Arc<AdminService>,
}

impl AppState {
    /// Create a new AppState; the rate limiter is built from configuration
    pub fn new(config: AppConfig, pool: sqlx::PgPool) -> Self {
        let rate_limiter = RateLimiter::from_config(&config.rate_limit, pool.clone());
        Self::with_rate_limiter(config, pool, rate_limiter)
    }

    /// Create a new AppState around an already configured rate limiter
    pub fn with_rate_limiter(config: AppConfig, pool: sqlx::PgPool, rate_limiter: RateLimiter) -> Self {
        let database = Database::new(pool.clone());

        let user_repo = Arc::new(UserRepository::new(pool.clone()));
        let quiz_repo = Arc::new(QuizRepository::new(pool.clone()));
        let attempt_repo = Arc::new(AttemptRepository::new(pool.clone()));
        let wallet_repo = Arc::new(WalletRepository::new(pool.clone()));
        let prize_repo = Arc::new(PrizeRepository::new(pool.clone()));
        let session_repo = Arc::new(SessionRepository::new(pool.clone()));
        let security_event_repo = Arc::new(SecurityEventRepository::new(pool.clone()));

        let transactions = Arc::new(TransactionManager::new(&config.transaction));
        let security = Arc::new(SecurityMonitor::new(
            security_event_repo.clone(),
            &config.security,
        ));
        let csrf = Arc::new(CsrfProtection::new(&config.security.csrf_secret));
        let ws_hub = Arc::new(WsHub::new());

        let sessions = Arc::new(SessionService::new(
            pool.clone(),
            user_repo.clone(),
            wallet_repo.clone(),
            session_repo.clone(),
            security.clone(),
            csrf.clone(),
            transactions.clone(),
            &config.security,
        ));
        let quizzes = Arc::new(QuizService::new(
            pool.clone(),
            quiz_repo.clone(),
            attempt_repo.clone(),
            wallet_repo.clone(),
            transactions.clone(),
            ws_hub.clone(),
        ));
        let wallets = Arc::new(WalletService::new(
            pool.clone(),
            wallet_repo.clone(),
            user_repo.clone(),
            transactions.clone(),
            ws_hub.clone(),
        ));
        let prizes = Arc::new(PrizeService::new(
            pool.clone(),
            prize_repo.clone(),
            wallet_repo.clone(),
            transactions.clone(),
            ws_hub.clone(),
        ));
        let admin = Arc::new(AdminService::new(
            pool,
            user_repo.clone(),
            quiz_repo.clone(),
            attempt_repo.clone(),
            wallet_repo.clone(),
            prize_repo.clone(),
            session_repo.clone(),
            transactions.clone(),
            ws_hub.clone(),
            config.quiz_reward_per_correct,
        ));

        Self {
            config,
            database,
            user_repo,
            quiz_repo,
            attempt_repo,
            wallet_repo,
            prize_repo,
            session_repo,
            security_event_repo,
            transactions,
            security,
            rate_limiter: Arc::new(rate_limiter),
            csrf,
            ws_hub,
            sessions,
            quizzes,
            wallets,
            prizes,
            admin,
        }
    }
}
