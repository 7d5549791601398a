//! Repository for wallet balances and the transaction ledger

use crate::error::RepositoryError;
use crate::models::{TransactionKind, Wallet, WalletTransaction};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const TX_COLUMNS: &str = "id, user_id, kind, amount, balance_before, balance_after, \
                          reference, description, created_at";

/// A single balance movement
pub struct WalletChange<'a> {
    pub user_id: Uuid,
    /// Signed amount: positive credits, negative debits
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub reference: Option<&'a str>,
    pub description: Option<&'a str>,
}

pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an empty wallet for a new user
    pub async fn create_wallet(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Wallet, RepositoryError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (user_id, balance)
            VALUES ($1, 0)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = wallets.updated_at
            RETURNING user_id, balance, updated_at
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(wallet)
    }

    /// Get a user's wallet
    pub async fn get_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, RepositoryError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT user_id, balance, updated_at FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    /// Apply a signed balance change and write its ledger entry
    ///
    /// Locks the wallet row, so callers must run this inside a transaction.
    /// Fails with `BusinessRule` if the change would make the balance negative.
    pub async fn apply_change(
        &self,
        conn: &mut PgConnection,
        change: &WalletChange<'_>,
    ) -> Result<(Wallet, WalletTransaction), RepositoryError> {
        if change.amount.is_zero() {
            return Err(RepositoryError::InvalidInput(
                "Amount must not be zero".to_string(),
            ));
        }

        // Wallets are created lazily for accounts that predate them
        sqlx::query("INSERT INTO wallets (user_id, balance) VALUES ($1, 0) ON CONFLICT (user_id) DO NOTHING")
            .bind(change.user_id)
            .execute(&mut *conn)
            .await?;

        let current = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT user_id, balance, updated_at
            FROM wallets
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(change.user_id)
        .fetch_one(&mut *conn)
        .await?;

        let balance_before = current.balance;
        let balance_after = balance_before + change.amount;
        if balance_after < Decimal::ZERO {
            return Err(RepositoryError::BusinessRule(format!(
                "Insufficient balance: available {}, required {}",
                balance_before,
                change.amount.abs()
            )));
        }

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET balance = $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, balance, updated_at
            "#,
        )
        .bind(change.user_id)
        .bind(balance_after)
        .fetch_one(&mut *conn)
        .await?;

        let entry = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            INSERT INTO wallet_transactions
                (user_id, kind, amount, balance_before, balance_after, reference, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TX_COLUMNS}
            "#
        ))
        .bind(change.user_id)
        .bind(change.kind.as_str())
        .bind(change.amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(change.reference)
        .bind(change.description)
        .fetch_one(&mut *conn)
        .await?;

        Ok((wallet, entry))
    }

    /// Ledger for a user, newest first
    pub async fn history(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletTransaction>, RepositoryError> {
        let entries = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            SELECT {TX_COLUMNS}
            FROM wallet_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn deposit_reference_exists(&self, reference: &str) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM wallet_transactions WHERE kind = 'deposit' AND reference = $1)",
        )
        .bind(reference)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Sum of all balances, for the admin dashboard
    pub async fn total_balance(&self) -> Result<Decimal, RepositoryError> {
        let total = sqlx::query_scalar::<_, Option<Decimal>>("SELECT SUM(balance) FROM wallets")
            .fetch_one(&self.pool)
            .await?;

        Ok(total.unwrap_or(Decimal::ZERO))
    }
}
