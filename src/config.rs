use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Sliding-window rate limit settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u64,
    pub auth_max_requests: u64,
    pub cleanup_interval_secs: u64,
    /// REST endpoint of the remote counter store (Upstash-compatible)
    pub redis_url: Option<String>,
    pub redis_token: Option<String>,
}

/// Timeout and retry settings for multi-step database operations
#[derive(Debug, Clone)]
pub struct TransactionConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// Session, CSRF and security-monitor settings
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub session_ttl_secs: i64,
    pub admin_session_ttl_secs: i64,
    pub csrf_secret: String,
    pub failed_login_threshold: i64,
    pub failed_login_window_secs: i64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub transaction: TransactionConfig,
    pub security: SecurityConfig,
    pub log_level: String,
    pub log_json: bool,
    pub http_port: u16,
    pub ws_port: Option<u16>,
    pub cors_allowed_origins: Vec<String>,
    pub quiz_reward_per_correct: Decimal,
    pub environment: String,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 10u32);
        let acquire_timeout_secs = env_parse("DATABASE_ACQUIRE_TIMEOUT_SECS", 30u64);
        let idle_timeout_secs = env_parse("DATABASE_IDLE_TIMEOUT_SECS", 600u64); // 10 minutes
        let max_lifetime_secs = env_parse("DATABASE_MAX_LIFETIME_SECS", 1800u64); // 30 minutes
        let test_before_acquire = env_parse("DATABASE_TEST_BEFORE_ACQUIRE", true);

        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        })
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/quizvault".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Result<Self, String> {
        let config = Self {
            window_secs: env_parse("RATE_LIMIT_WINDOW_SECS", 60u64),
            max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS", 100u64),
            auth_max_requests: env_parse("RATE_LIMIT_AUTH_MAX_REQUESTS", 10u64),
            cleanup_interval_secs: env_parse("RATE_LIMIT_CLEANUP_INTERVAL_SECS", 300u64),
            redis_url: env_non_empty("RATE_LIMIT_REDIS_URL"),
            redis_token: env_non_empty("RATE_LIMIT_REDIS_TOKEN"),
        };

        if config.window_secs == 0 {
            return Err("RATE_LIMIT_WINDOW_SECS must be greater than 0".to_string());
        }
        if config.max_requests == 0 || config.auth_max_requests == 0 {
            return Err("rate limit request counts must be greater than 0".to_string());
        }

        Ok(config)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    /// Remote store is only used when both URL and token are present
    pub fn remote_credentials(&self) -> Option<(&str, &str)> {
        match (&self.redis_url, &self.redis_token) {
            (Some(url), Some(token)) => Some((url.as_str(), token.as_str())),
            _ => None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 100,
            auth_max_requests: 10,
            cleanup_interval_secs: 300,
            redis_url: None,
            redis_token: None,
        }
    }
}

impl TransactionConfig {
    pub fn from_env() -> Result<Self, String> {
        let config = Self {
            timeout_ms: env_parse("TX_TIMEOUT_MS", 10_000u64),
            max_retries: env_parse("TX_MAX_RETRIES", 3u32),
            base_backoff_ms: env_parse("TX_BASE_BACKOFF_MS", 100u64),
            max_backoff_ms: env_parse("TX_MAX_BACKOFF_MS", 2_000u64),
        };

        if config.timeout_ms == 0 {
            return Err("TX_TIMEOUT_MS must be greater than 0".to_string());
        }
        if config.max_backoff_ms < config.base_backoff_ms {
            return Err("TX_MAX_BACKOFF_MS must not be smaller than TX_BASE_BACKOFF_MS".to_string());
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

/// One year
const MAX_TTL_SECS: i64 = 365 * 86_400;

impl SecurityConfig {
    pub fn from_env(is_production: bool) -> Result<Self, String> {
        let csrf_secret = match env_non_empty("CSRF_SECRET") {
            Some(secret) => secret,
            None if is_production => {
                return Err("CSRF_SECRET is required in production".to_string());
            }
            // Development: a per-process secret invalidates tokens on restart
            None => crate::auth::generate_token(),
        };

        if csrf_secret.len() < 16 {
            return Err("CSRF_SECRET must be at least 16 characters".to_string());
        }

        let config = Self {
            session_ttl_secs: env_parse("SESSION_TTL_SECS", 86_400i64),
            admin_session_ttl_secs: env_parse("ADMIN_SESSION_TTL_SECS", 28_800i64),
            csrf_secret,
            failed_login_threshold: env_parse("SECURITY_FAILED_LOGIN_THRESHOLD", 5i64),
            failed_login_window_secs: env_parse("SECURITY_FAILED_LOGIN_WINDOW_SECS", 900i64),
        };

        config.validate()?;
        Ok(config)
    }

    /// Bounds that keep TTLs and windows representable as `chrono::Duration`
    pub fn validate(&self) -> Result<(), String> {
        for (key, value) in [
            ("SESSION_TTL_SECS", self.session_ttl_secs),
            ("ADMIN_SESSION_TTL_SECS", self.admin_session_ttl_secs),
            ("SECURITY_FAILED_LOGIN_WINDOW_SECS", self.failed_login_window_secs),
        ] {
            if !(1..=MAX_TTL_SECS).contains(&value) {
                return Err(format!("{} must be between 1 and {}", key, MAX_TTL_SECS));
            }
        }
        if self.failed_login_threshold < 1 {
            return Err("SECURITY_FAILED_LOGIN_THRESHOLD must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 86_400,
            admin_session_ttl_secs: 28_800,
            csrf_secret: "development-csrf-secret-change-me".to_string(),
            failed_login_threshold: 5,
            failed_login_window_secs: 900,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }
        let environment = environment.to_lowercase();

        let http_port = env_parse("HTTP_PORT", 8080u16);
        let ws_port = env::var("WS_PORT").ok().and_then(|s| s.parse::<u16>().ok());
        if ws_port == Some(http_port) {
            return Err("WS_PORT must differ from HTTP_PORT".to_string());
        }

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let quiz_reward_per_correct = match env::var("QUIZ_REWARD_PER_CORRECT") {
            Ok(raw) => Decimal::from_str(raw.trim())
                .map_err(|e| format!("Invalid QUIZ_REWARD_PER_CORRECT: {}", e))?,
            Err(_) => Decimal::ONE,
        };
        if quiz_reward_per_correct.is_sign_negative() {
            return Err("QUIZ_REWARD_PER_CORRECT must not be negative".to_string());
        }

        Ok(Self {
            database: DatabaseConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env()?,
            transaction: TransactionConfig::from_env()?,
            security: SecurityConfig::from_env(environment == "production")?,
            log_level: log_level.to_lowercase(),
            log_json,
            http_port,
            ws_port,
            cors_allowed_origins,
            quiz_reward_per_correct,
            environment,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            rate_limit: RateLimitConfig::default(),
            transaction: TransactionConfig::default(),
            security: SecurityConfig::default(),
            log_level: "info".to_string(),
            log_json: false,
            http_port: 8080,
            ws_port: None,
            cors_allowed_origins: Vec::new(),
            quiz_reward_per_correct: Decimal::ONE,
            environment: "development".to_string(),
        }
    }
}
