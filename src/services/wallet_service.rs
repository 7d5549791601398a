use crate::error::{AppError, AppResult};
use crate::models::{TransactionKind, Wallet, WalletTransaction};
use crate::repositories::{UserRepository, WalletChange, WalletRepository};
use crate::transaction::TransactionManager;
use crate::websocket::{AdminUpdate, Channel, WsHub};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Largest single deposit accepted
pub const MAX_DEPOSIT: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

const MAX_REFERENCE_LEN: usize = 128;

/// Check a deposit before it touches the database
pub fn validate_deposit(amount: Decimal, reference: &str) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("Deposit amount must be positive".to_string()));
    }
    if amount > MAX_DEPOSIT {
        return Err(AppError::Validation(format!(
            "Deposit amount cannot exceed {}",
            MAX_DEPOSIT
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(AppError::Validation(
            "Deposit amount supports at most 2 decimal places".to_string(),
        ));
    }

    let reference = reference.trim();
    if reference.is_empty() || reference.len() > MAX_REFERENCE_LEN {
        return Err(AppError::Validation(format!(
            "Payment reference must be 1 to {} characters",
            MAX_REFERENCE_LEN
        )));
    }
    Ok(())
}

/// Service for balances, deposits and admin adjustments
pub struct WalletService {
    pool: PgPool,
    wallet_repo: Arc<WalletRepository>,
    user_repo: Arc<UserRepository>,
    transactions: Arc<TransactionManager>,
    hub: Arc<WsHub>,
}

impl WalletService {
    pub fn new(
        pool: PgPool,
        wallet_repo: Arc<WalletRepository>,
        user_repo: Arc<UserRepository>,
        transactions: Arc<TransactionManager>,
        hub: Arc<WsHub>,
    ) -> Self {
        Self {
            pool,
            wallet_repo,
            user_repo,
            transactions,
            hub,
        }
    }

    /// Current wallet; users without a wallet row have a zero balance
    pub async fn balance(&self, user_id: Uuid) -> AppResult<Wallet> {
        let wallet = self.wallet_repo.get_wallet(user_id).await?;
        Ok(wallet.unwrap_or_else(|| Wallet {
            user_id,
            balance: Decimal::ZERO,
            updated_at: Utc::now(),
        }))
    }

    async fn apply(&self, label: &str, change: WalletChange<'_>) -> AppResult<WalletTransaction> {
        let pool = &self.pool;
        let wallet_repo = &self.wallet_repo;
        let change = &change;

        let (_, entry) = self
            .transactions
            .run_in_transaction(pool, label, move |mut tx| async move {
                let applied = wallet_repo.apply_change(&mut tx, change).await?;
                Ok::<_, AppError>((tx, applied))
            })
            .await?;
        Ok(entry)
    }

    /// Credit a deposit confirmed by the payment provider
    pub async fn deposit(&self, user_id: Uuid, amount: Decimal, reference: &str) -> AppResult<WalletTransaction> {
        validate_deposit(amount, reference)?;
        let reference = reference.trim();

        if self.wallet_repo.deposit_reference_exists(reference).await? {
            return Err(AppError::Conflict(format!(
                "Deposit {} has already been processed",
                reference
            )));
        }

        let entry = self
            .apply(
                "deposit",
                WalletChange {
                    user_id,
                    amount,
                    kind: TransactionKind::Deposit,
                    reference: Some(reference),
                    description: Some("Deposit"),
                },
            )
            .await?;

        info!("Deposit {} of {} for user {}", reference, amount, user_id);
        self.hub
            .notify_user(
                user_id,
                "wallet_credited",
                serde_json::json!({
                    "amount": entry.amount,
                    "balance": entry.balance_after,
                    "reason": "deposit",
                }),
            )
            .await;
        Ok(entry)
    }

    pub async fn history(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<WalletTransaction>> {
        Ok(self
            .wallet_repo
            .history(user_id, limit.clamp(1, 200), offset.max(0))
            .await?)
    }

    /// Signed manual correction by an admin
    pub async fn admin_adjust(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
        reason: &str,
    ) -> AppResult<WalletTransaction> {
        let reason = reason.trim();
        if amount.is_zero() {
            return Err(AppError::Validation("Adjustment amount must not be zero".to_string()));
        }
        if reason.is_empty() {
            return Err(AppError::Validation("A reason is required".to_string()));
        }
        if self.user_repo.find_by_id(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        let admin_reference = admin_id.to_string();
        let entry = self
            .apply(
                "admin_adjust",
                WalletChange {
                    user_id,
                    amount,
                    kind: TransactionKind::AdminAdjustment,
                    reference: Some(&admin_reference),
                    description: Some(reason),
                },
            )
            .await?;

        info!(
            "Admin {} adjusted wallet of {} by {} ({})",
            admin_id, user_id, amount, reason
        );

        let update = AdminUpdate::new(Channel::AdminWallets, "wallet", Some(user_id), "adjusted")
            .author(admin_id)
            .payload(serde_json::json!({
                "amount": entry.amount,
                "balance": entry.balance_after,
                "reason": reason,
            }));
        self.hub.publish_admin_update(update, None).await;
        self.hub
            .notify_user(
                user_id,
                "wallet_adjusted",
                serde_json::json!({ "amount": entry.amount, "balance": entry.balance_after }),
            )
            .await;
        Ok(entry)
    }
}
