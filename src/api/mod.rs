//! HTTP surface: JSON REST routes plus the security middleware stack.

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod request;

use crate::AppState;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use handlers::{admin, auth, health, prizes, quizzes, wallet};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(crate::csrf::CSRF_HEADER),
        ])
        .max_age(Duration::from_secs(60 * 60));

    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(AllowOrigin::any());
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    // Cookies only flow to explicitly listed origins
    cors.allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
}

fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/csrf", get(auth::csrf_token))
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(auth::admin_login))
        .route("/logout", post(auth::admin_logout))
        .route("/dashboard", get(admin::dashboard))
        .route("/quizzes", post(admin::create_quiz))
        .route(
            "/quizzes/:id",
            get(admin::get_quiz)
                .put(admin::update_quiz)
                .delete(admin::delete_quiz),
        )
        .route("/quizzes/:id/publish", post(admin::publish_quiz))
        .route("/users", get(admin::list_users))
        .route("/users/:id/active", post(admin::set_user_active))
        .route("/wallets/:user_id/adjust", post(admin::adjust_wallet))
        .route("/prizes", post(admin::create_prize))
        .route("/prizes/:id", put(admin::update_prize))
        .route("/redemptions", get(admin::list_redemptions))
        .route("/redemptions/:id/status", post(admin::update_redemption))
        .route("/security/events", get(admin::security_events))
        .route("/security/summary", get(admin::security_summary))
}

/// Build the application router
///
/// Layers run outermost first: tracing, CORS, rate limiting, CSRF.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .nest("/auth", auth_routes())
        .nest("/admin", admin_routes())
        .route("/quizzes", get(quizzes::list_quizzes))
        .route("/quizzes/:id", get(quizzes::get_quiz))
        .route("/quizzes/:id/attempts", post(quizzes::start_attempt))
        .route("/quizzes/:id/leaderboard", get(quizzes::leaderboard))
        .route("/attempts", get(quizzes::attempt_history))
        .route("/attempts/:id/submit", post(quizzes::submit_attempt))
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/deposits", post(wallet::deposit))
        .route("/wallet/transactions", get(wallet::transactions))
        .route("/prizes", get(prizes::list_prizes))
        .route("/prizes/:id/redeem", post(prizes::redeem))
        .route("/redemptions", get(prizes::my_redemptions));

    let cors = cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api)
        .layer(from_fn_with_state(state.clone(), middleware::csrf_middleware))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
