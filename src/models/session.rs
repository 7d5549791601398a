use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which table a session lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    User,
    Admin,
}

impl SessionKind {
    pub fn table(&self) -> &'static str {
        match self {
            SessionKind::User => "user_sessions",
            SessionKind::Admin => "admin_sessions",
        }
    }

    /// Cookie carrying the session token for browser clients
    pub fn cookie_name(&self) -> &'static str {
        match self {
            SessionKind::User => "session",
            SessionKind::Admin => "admin_session",
        }
    }
}

/// Row shared by `user_sessions` and `admin_sessions`
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_in: Duration) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "hash".to_string(),
            ip_address: None,
            user_agent: None,
            expires_at: now + expires_in,
            revoked_at: None,
            last_seen_at: now,
            created_at: now,
        }
    }

    #[test]
    fn test_session_validity() {
        let now = Utc::now();
        assert!(session(Duration::minutes(5)).is_valid_at(now));
        assert!(!session(Duration::minutes(-5)).is_valid_at(now));

        let mut revoked = session(Duration::minutes(5));
        revoked.revoked_at = Some(now);
        assert!(!revoked.is_valid_at(now));
    }
}
