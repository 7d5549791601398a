use crate::error::RepositoryError;
use crate::models::{Prize, PrizeRedemption, RedemptionStatus};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const PRIZE_COLUMNS: &str = "id, name, description, cost, stock, is_active, created_at";
const REDEMPTION_COLUMNS: &str = "id, user_id, prize_id, cost, status, created_at, updated_at";

/// Prize catalogue fields shared by insert and update
pub struct PrizeFields<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub cost: Decimal,
    pub stock: i32,
    pub is_active: bool,
}

/// Repository for the prize catalogue and redemptions
pub struct PrizeRepository {
    pool: PgPool,
}

impl PrizeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, fields: &PrizeFields<'_>) -> Result<Prize, RepositoryError> {
        let prize = sqlx::query_as::<_, Prize>(&format!(
            r#"
            INSERT INTO prizes (name, description, cost, stock, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRIZE_COLUMNS}
            "#
        ))
        .bind(fields.name)
        .bind(fields.description)
        .bind(fields.cost)
        .bind(fields.stock)
        .bind(fields.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(prize)
    }

    pub async fn update(&self, id: Uuid, fields: &PrizeFields<'_>) -> Result<Prize, RepositoryError> {
        let prize = sqlx::query_as::<_, Prize>(&format!(
            r#"
            UPDATE prizes
            SET name = $2, description = $3, cost = $4, stock = $5, is_active = $6
            WHERE id = $1
            RETURNING {PRIZE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(fields.name)
        .bind(fields.description)
        .bind(fields.cost)
        .bind(fields.stock)
        .bind(fields.is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Prize {} not found", id)))?;

        Ok(prize)
    }

    pub async fn list_active(&self) -> Result<Vec<Prize>, RepositoryError> {
        let prizes = sqlx::query_as::<_, Prize>(&format!(
            "SELECT {PRIZE_COLUMNS} FROM prizes WHERE is_active = TRUE ORDER BY cost ASC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(prizes)
    }

    /// Lock a prize row for a stock change
    pub async fn lock_for_update(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Prize, RepositoryError> {
        let prize = sqlx::query_as::<_, Prize>(&format!(
            "SELECT {PRIZE_COLUMNS} FROM prizes WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Prize {} not found", id)))?;

        Ok(prize)
    }

    /// Adjust stock by `delta`; the row check constraint rejects negative stock
    pub async fn adjust_stock(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        delta: i32,
    ) -> Result<Prize, RepositoryError> {
        let prize = sqlx::query_as::<_, Prize>(&format!(
            "UPDATE prizes SET stock = stock + $2 WHERE id = $1 RETURNING {PRIZE_COLUMNS}"
        ))
        .bind(id)
        .bind(delta)
        .fetch_one(&mut *conn)
        .await?;

        Ok(prize)
    }

    pub async fn create_redemption(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        prize_id: Uuid,
        cost: Decimal,
    ) -> Result<PrizeRedemption, RepositoryError> {
        let redemption = sqlx::query_as::<_, PrizeRedemption>(&format!(
            r#"
            INSERT INTO prize_redemptions (user_id, prize_id, cost)
            VALUES ($1, $2, $3)
            RETURNING {REDEMPTION_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(prize_id)
        .bind(cost)
        .fetch_one(&mut *conn)
        .await?;

        Ok(redemption)
    }

    pub async fn lock_redemption(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<PrizeRedemption, RepositoryError> {
        let redemption = sqlx::query_as::<_, PrizeRedemption>(&format!(
            "SELECT {REDEMPTION_COLUMNS} FROM prize_redemptions WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Redemption {} not found", id)))?;

        Ok(redemption)
    }

    pub async fn set_redemption_status(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        status: RedemptionStatus,
    ) -> Result<PrizeRedemption, RepositoryError> {
        let redemption = sqlx::query_as::<_, PrizeRedemption>(&format!(
            r#"
            UPDATE prize_redemptions
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {REDEMPTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_one(&mut *conn)
        .await?;

        Ok(redemption)
    }

    pub async fn list_redemptions(
        &self,
        status: Option<RedemptionStatus>,
        limit: i64,
    ) -> Result<Vec<PrizeRedemption>, RepositoryError> {
        let redemptions = sqlx::query_as::<_, PrizeRedemption>(&format!(
            r#"
            SELECT {REDEMPTION_COLUMNS} FROM prize_redemptions
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at ASC
            LIMIT $2
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(redemptions)
    }

    pub async fn user_redemptions(&self, user_id: Uuid) -> Result<Vec<PrizeRedemption>, RepositoryError> {
        let redemptions = sqlx::query_as::<_, PrizeRedemption>(&format!(
            "SELECT {REDEMPTION_COLUMNS} FROM prize_redemptions WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(redemptions)
    }

    pub async fn count_pending(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM prize_redemptions WHERE status = 'pending'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
