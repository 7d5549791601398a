use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SecuritySeverity {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "low" => Ok(SecuritySeverity::Low),
            "medium" => Ok(SecuritySeverity::Medium),
            "high" => Ok(SecuritySeverity::High),
            "critical" => Ok(SecuritySeverity::Critical),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            SecuritySeverity::Low => "low",
            SecuritySeverity::Medium => "medium",
            SecuritySeverity::High => "high",
            SecuritySeverity::Critical => "critical",
        }
    }

    /// All levels at or above `self`, for `severity = ANY($n)` filters
    pub fn at_least(&self) -> Vec<String> {
        [
            SecuritySeverity::Low,
            SecuritySeverity::Medium,
            SecuritySeverity::High,
            SecuritySeverity::Critical,
        ]
        .into_iter()
        .filter(|s| s >= self)
        .map(|s| s.as_str().to_string())
        .collect()
    }
}

/// Kinds of events the monitor records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    LoginFailed,
    LoginSucceeded,
    BruteForceSuspected,
    AdminAccessDenied,
    AdminLogin,
    CsrfViolation,
    RateLimitExceeded,
    InvalidSession,
    WebSocketAuthFailed,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginFailed => "login_failed",
            Self::LoginSucceeded => "login_succeeded",
            Self::BruteForceSuspected => "brute_force_suspected",
            Self::AdminAccessDenied => "admin_access_denied",
            Self::AdminLogin => "admin_login",
            Self::CsrfViolation => "csrf_violation",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::InvalidSession => "invalid_session",
            Self::WebSocketAuthFailed => "websocket_auth_failed",
        }
    }

    /// Severity used when the caller does not override it
    pub fn default_severity(&self) -> SecuritySeverity {
        match self {
            Self::LoginSucceeded | Self::AdminLogin => SecuritySeverity::Low,
            Self::LoginFailed | Self::InvalidSession | Self::RateLimitExceeded => {
                SecuritySeverity::Medium
            }
            Self::WebSocketAuthFailed => SecuritySeverity::Medium,
            Self::CsrfViolation | Self::AdminAccessDenied | Self::BruteForceSuspected => {
                SecuritySeverity::High
            }
        }
    }
}

/// Persisted security event
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub event_type: String,
    pub severity: String,
    pub ip_address: Option<String>,
    pub user_id: Option<Uuid>,
    pub path: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Event about to be recorded
#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub event_type: SecurityEventType,
    pub severity: SecuritySeverity,
    pub ip_address: Option<String>,
    pub user_id: Option<Uuid>,
    pub path: Option<String>,
    pub details: serde_json::Value,
}

impl NewSecurityEvent {
    pub fn new(event_type: SecurityEventType) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            ip_address: None,
            user_id: None,
            path: None,
            details: serde_json::json!({}),
        }
    }

    pub fn severity(mut self, severity: SecuritySeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Count of events per type, for the admin summary
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SecurityEventCount {
    pub event_type: String,
    pub count: i64,
}
