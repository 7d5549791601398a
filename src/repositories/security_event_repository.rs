use crate::error::RepositoryError;
use crate::models::{NewSecurityEvent, SecurityEvent, SecurityEventCount, SecuritySeverity};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Result as SqlxResult};

const EVENT_COLUMNS: &str = "id, event_type, severity, ip_address, user_id, path, details, created_at";

/// Repository for persisted security events
pub struct SecurityEventRepository {
    pool: PgPool,
}

impl SecurityEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, event: &NewSecurityEvent) -> Result<SecurityEvent, RepositoryError> {
        let stored = sqlx::query_as::<_, SecurityEvent>(&format!(
            r#"
            INSERT INTO security_events (event_type, severity, ip_address, user_id, path, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event.event_type.as_str())
        .bind(event.severity.as_str())
        .bind(event.ip_address.as_deref())
        .bind(event.user_id)
        .bind(event.path.as_deref())
        .bind(&event.details)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    /// Number of events of one type from an IP since `since`
    pub async fn count_for_ip(
        &self,
        event_type: &str,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> SqlxResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM security_events
            WHERE event_type = $1 AND ip_address = $2 AND created_at >= $3
            "#,
        )
        .bind(event_type)
        .bind(ip_address)
        .bind(since)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn recent(
        &self,
        limit: i64,
        min_severity: SecuritySeverity,
    ) -> SqlxResult<Vec<SecurityEvent>> {
        sqlx::query_as::<_, SecurityEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM security_events
            WHERE severity = ANY($1)
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(min_severity.at_least())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn for_ip(&self, ip_address: &str, since: DateTime<Utc>) -> SqlxResult<Vec<SecurityEvent>> {
        sqlx::query_as::<_, SecurityEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM security_events
            WHERE ip_address = $1 AND created_at >= $2
            ORDER BY created_at DESC
            "#
        ))
        .bind(ip_address)
        .bind(since)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn counts_by_type(&self, since: DateTime<Utc>) -> SqlxResult<Vec<SecurityEventCount>> {
        sqlx::query_as::<_, SecurityEventCount>(
            r#"
            SELECT event_type, COUNT(*) AS count
            FROM security_events
            WHERE created_at >= $1
            GROUP BY event_type
            ORDER BY count DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
    }
}
