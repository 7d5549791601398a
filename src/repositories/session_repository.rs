use crate::error::RepositoryError;
use crate::models::{Session, SessionKind};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Result as SqlxResult};
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, user_id, token_hash, ip_address, user_agent, expires_at, \
                               revoked_at, last_seen_at, created_at";

/// Repository for user and admin sessions
///
/// Both tables share a layout; `SessionKind` selects the table.
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        kind: SessionKind,
        user_id: Uuid,
        token_hash: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, RepositoryError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO {table} (user_id, token_hash, ip_address, user_agent, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SESSION_COLUMNS}
            "#,
            table = kind.table()
        ))
        .bind(user_id)
        .bind(token_hash)
        .bind(ip_address)
        .bind(user_agent)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Unrevoked, unexpired session with this token hash
    pub async fn find_active(&self, kind: SessionKind, token_hash: &str) -> SqlxResult<Option<Session>> {
        sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM {table}
            WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > NOW()
            "#,
            table = kind.table()
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn touch(&self, kind: SessionKind, id: Uuid) -> SqlxResult<()> {
        sqlx::query(&format!(
            "UPDATE {} SET last_seen_at = NOW() WHERE id = $1",
            kind.table()
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Revoke by token hash; returns whether a live session was revoked
    pub async fn revoke(&self, kind: SessionKind, token_hash: &str) -> SqlxResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET revoked_at = NOW() WHERE token_hash = $1 AND revoked_at IS NULL",
            kind.table()
        ))
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn revoke_all_for_user(&self, kind: SessionKind, user_id: Uuid) -> SqlxResult<u64> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
            kind.table()
        ))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete sessions that expired or were revoked before `before`
    pub async fn purge(&self, kind: SessionKind, before: DateTime<Utc>) -> SqlxResult<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE expires_at < $1 OR revoked_at < $1",
            kind.table()
        ))
        .bind(before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
