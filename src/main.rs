//! QuizVault Backend Service
//!
//! Main entry point for the QuizVault quiz platform backend.
//! This service provides:
//! - JSON REST API for players and admins
//! - WebSocket server for admin change notifications
//! - Background maintenance of rate-limit counters and sessions

use quizvault_backend::api;
use quizvault_backend::config::AppConfig;
use quizvault_backend::database::{create_pool, run_migrations};
use quizvault_backend::error::{AppError, AppResult};
use quizvault_backend::websocket::WebSocketServer;
use quizvault_backend::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Interval between expired-session purges
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "quizvault_backend={},sqlx=warn,tower_http=info",
            config.log_level
        )
        .into()
    });

    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    init_tracing(&config);

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           QuizVault Backend Service Starting              ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("HTTP port: {}", config.http_port);
    if let Some(ws_port) = config.ws_port {
        info!("WebSocket port: {}", ws_port);
    }

    // =========================================================================
    // DATABASE SETUP
    // =========================================================================
    info!("Connecting to database...");

    let pool = create_pool(&config.database).await.map_err(|e| {
        error!("Failed to create database pool: {}", e);
        AppError::Database(e)
    })?;

    info!("Database connection pool created successfully");
    info!("Max connections: {}", config.database.max_connections);

    info!("Running database migrations...");
    run_migrations(&pool, None).await.map_err(|e| {
        error!("Database migration failed: {}", e);
        AppError::Database(e)
    })?;

    info!("Database migrations completed successfully");

    // =========================================================================
    // CORE SERVICES INITIALIZATION
    // =========================================================================
    let http_port = config.http_port;
    let ws_port = config.ws_port;
    let cleanup_interval = config.rate_limit.cleanup_interval();
    let environment = config.environment.clone();

    let app_state = Arc::new(AppState::new(config, pool));
    info!("✓ Application state initialized");

    let ws_server = Arc::new(WebSocketServer::new(
        app_state.ws_hub.clone(),
        app_state.sessions.clone(),
        app_state.security.clone(),
    ));
    info!("✓ WebSocket server initialized");

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    info!("Starting background tasks...");

    let rate_limit_cleanup = app_state
        .rate_limiter
        .clone()
        .spawn_cleanup_task(cleanup_interval);
    info!("✓ Rate-limit cleanup task started ({:?} interval)", cleanup_interval);

    let sessions = app_state.sessions.clone();
    let session_purge = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = sessions.purge_expired().await {
                warn!("Session purge failed: {}", e);
            }
        }
    });
    info!("✓ Session purge task started ({:?} interval)", SESSION_PURGE_INTERVAL);

    // =========================================================================
    // START SERVERS
    // =========================================================================
    let http_addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let http_listener = TcpListener::bind(http_addr)
        .await
        .map_err(|e| AppError::Message(format!("Failed to bind HTTP server: {}", e)))?;

    let app = api::router(app_state.clone());
    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(
            http_listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            error!("HTTP server error: {}", e);
        }
    });
    info!("✓ HTTP server started on {}", http_addr);

    let ws_handle = match ws_port {
        Some(port) => {
            let ws_addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = TcpListener::bind(ws_addr).await.map_err(|e| {
                AppError::Message(format!("Failed to bind WebSocket server: {}", e))
            })?;
            let handle = tokio::spawn(ws_server.serve(listener));
            info!("✓ WebSocket server started on {}", ws_addr);
            Some(handle)
        }
        None => {
            warn!("WS_PORT not configured - WebSocket server not started");
            None
        }
    };

    // =========================================================================
    // READY
    // =========================================================================
    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           QuizVault Backend Service Ready!                ║");
    info!("╠══════════════════════════════════════════════════════════╣");
    info!("║  HTTP API:     0.0.0.0:{}                              ║", http_port);
    if let Some(port) = ws_port {
        info!("║  WebSocket:    0.0.0.0:{}                              ║", port);
    }
    info!("║  Environment:  {}                                    ║", environment);
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = http_handle => {
            error!("HTTP server exited unexpectedly");
        }
        _ = async {
            match ws_handle {
                Some(handle) => {
                    handle.await.ok();
                }
                // Never completes if WebSocket is not running
                None => futures::future::pending::<()>().await,
            }
        } => {
            error!("WebSocket server exited unexpectedly");
        }
    }

    rate_limit_cleanup.abort();
    session_purge.abort();

    info!("QuizVault backend service shutdown complete");
    Ok(())
}
