use crate::error::{AppError, AppResult};
use crate::models::{Prize, PrizeRedemption, RedemptionStatus, TransactionKind};
use crate::repositories::{PrizeFields, PrizeRepository, WalletChange, WalletRepository};
use crate::transaction::TransactionManager;
use crate::websocket::{AdminUpdate, Channel, WsHub};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Admin input for creating or updating a prize
#[derive(Debug, Clone, Deserialize)]
pub struct PrizeInput {
    pub name: String,
    pub description: Option<String>,
    pub cost: Decimal,
    pub stock: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl PrizeInput {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Prize name is required".to_string()));
        }
        if self.cost <= Decimal::ZERO {
            return Err(AppError::Validation("Prize cost must be positive".to_string()));
        }
        if self.stock < 0 {
            return Err(AppError::Validation("Stock cannot be negative".to_string()));
        }
        Ok(())
    }

    fn fields(&self) -> PrizeFields<'_> {
        PrizeFields {
            name: self.name.trim(),
            description: self.description.as_deref(),
            cost: self.cost,
            stock: self.stock,
            is_active: self.is_active,
        }
    }
}

/// Service for the prize catalogue and redemptions
pub struct PrizeService {
    pool: PgPool,
    prize_repo: Arc<PrizeRepository>,
    wallet_repo: Arc<WalletRepository>,
    transactions: Arc<TransactionManager>,
    hub: Arc<WsHub>,
}

impl PrizeService {
    pub fn new(
        pool: PgPool,
        prize_repo: Arc<PrizeRepository>,
        wallet_repo: Arc<WalletRepository>,
        transactions: Arc<TransactionManager>,
        hub: Arc<WsHub>,
    ) -> Self {
        Self {
            pool,
            prize_repo,
            wallet_repo,
            transactions,
            hub,
        }
    }

    pub async fn list_active(&self) -> AppResult<Vec<Prize>> {
        Ok(self.prize_repo.list_active().await?)
    }

    /// Spend wallet balance on a prize
    ///
    /// Stock decrement, wallet debit and the redemption row commit together.
    pub async fn redeem(&self, user_id: Uuid, prize_id: Uuid) -> AppResult<PrizeRedemption> {
        let pool = &self.pool;
        let prize_repo = &self.prize_repo;
        let wallet_repo = &self.wallet_repo;
        let reference = prize_id.to_string();
        let reference = reference.as_str();

        let (redemption, prize_name) = self
            .transactions
            .run_in_transaction(pool, "redeem_prize", move |mut tx| async move {
                let prize = prize_repo.lock_for_update(&mut tx, prize_id).await?;
                if !prize.is_active {
                    return Err(AppError::BusinessLogic("Prize is not available".to_string()));
                }
                if prize.stock <= 0 {
                    return Err(AppError::BusinessLogic("Prize is out of stock".to_string()));
                }

                let change = WalletChange {
                    user_id,
                    amount: -prize.cost,
                    kind: TransactionKind::PrizeRedemption,
                    reference: Some(reference),
                    description: Some(prize.name.as_str()),
                };
                wallet_repo.apply_change(&mut tx, &change).await?;
                prize_repo.adjust_stock(&mut tx, prize_id, -1).await?;
                let redemption = prize_repo
                    .create_redemption(&mut tx, user_id, prize_id, prize.cost)
                    .await?;

                Ok::<_, AppError>((tx, (redemption, prize.name)))
            })
            .await?;

        info!(
            "User {} redeemed prize {} ({}) for {}",
            user_id, prize_name, prize_id, redemption.cost
        );

        let update = AdminUpdate::new(
            Channel::AdminDashboard,
            "redemption",
            Some(redemption.id),
            "created",
        )
        .payload(serde_json::json!({
            "prize_id": prize_id,
            "prize_name": prize_name,
            "user_id": user_id,
            "cost": redemption.cost,
        }));
        self.hub.publish_admin_update(update, None).await;
        Ok(redemption)
    }

    pub async fn user_redemptions(&self, user_id: Uuid) -> AppResult<Vec<PrizeRedemption>> {
        Ok(self.prize_repo.user_redemptions(user_id).await?)
    }

    pub async fn create_prize(&self, admin_id: Uuid, input: &PrizeInput) -> AppResult<Prize> {
        input.validate()?;
        let prize = self.prize_repo.create(&input.fields()).await?;
        info!("Admin {} created prize {} ({})", admin_id, prize.name, prize.id);

        let update = AdminUpdate::new(Channel::AdminDashboard, "prize", Some(prize.id), "created")
            .author(admin_id)
            .payload(serde_json::to_value(&prize)?);
        self.hub.publish_admin_update(update, None).await;
        Ok(prize)
    }

    pub async fn update_prize(&self, admin_id: Uuid, prize_id: Uuid, input: &PrizeInput) -> AppResult<Prize> {
        input.validate()?;
        let prize = self.prize_repo.update(prize_id, &input.fields()).await?;
        info!("Admin {} updated prize {}", admin_id, prize.id);

        let update = AdminUpdate::new(Channel::AdminDashboard, "prize", Some(prize.id), "updated")
            .author(admin_id)
            .payload(serde_json::to_value(&prize)?);
        self.hub.publish_admin_update(update, None).await;
        Ok(prize)
    }

    pub async fn list_redemptions(
        &self,
        status: Option<RedemptionStatus>,
        limit: i64,
    ) -> AppResult<Vec<PrizeRedemption>> {
        Ok(self
            .prize_repo
            .list_redemptions(status, limit.clamp(1, 500))
            .await?)
    }

    /// Move a pending redemption to fulfilled or cancelled
    ///
    /// Cancelling refunds the cost and returns the item to stock.
    pub async fn update_redemption_status(
        &self,
        admin_id: Uuid,
        redemption_id: Uuid,
        next: RedemptionStatus,
    ) -> AppResult<PrizeRedemption> {
        let pool = &self.pool;
        let prize_repo = &self.prize_repo;
        let wallet_repo = &self.wallet_repo;
        let reference = redemption_id.to_string();
        let reference = reference.as_str();

        let redemption = self
            .transactions
            .run_in_transaction(pool, "update_redemption_status", move |mut tx| async move {
                let current = prize_repo.lock_redemption(&mut tx, redemption_id).await?;
                let status = current.status_enum().ok_or_else(|| {
                    AppError::Message(format!("Redemption {} has unknown status", redemption_id))
                })?;
                if !status.can_transition_to(next) {
                    return Err(AppError::Conflict(format!(
                        "Cannot move redemption from {} to {}",
                        status.as_str(),
                        next.as_str()
                    )));
                }

                let updated = prize_repo
                    .set_redemption_status(&mut tx, redemption_id, next)
                    .await?;

                if next == RedemptionStatus::Cancelled {
                    let refund = WalletChange {
                        user_id: current.user_id,
                        amount: current.cost,
                        kind: TransactionKind::Refund,
                        reference: Some(reference),
                        description: Some("Redemption cancelled"),
                    };
                    wallet_repo.apply_change(&mut tx, &refund).await?;
                    prize_repo.adjust_stock(&mut tx, current.prize_id, 1).await?;
                }

                Ok::<_, AppError>((tx, updated))
            })
            .await?;

        info!(
            "Admin {} set redemption {} to {}",
            admin_id,
            redemption_id,
            next.as_str()
        );

        let update = AdminUpdate::new(
            Channel::AdminDashboard,
            "redemption",
            Some(redemption_id),
            next.as_str(),
        )
        .author(admin_id);
        self.hub.publish_admin_update(update, None).await;
        self.hub
            .notify_user(
                redemption.user_id,
                "redemption_updated",
                serde_json::json!({ "redemption_id": redemption_id, "status": next }),
            )
            .await;
        Ok(redemption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(cost: i64, stock: i32) -> PrizeInput {
        PrizeInput {
            name: "Gift card".to_string(),
            description: None,
            cost: Decimal::from(cost),
            stock,
            is_active: true,
        }
    }

    #[test]
    fn test_prize_input_validation() {
        assert!(input(25, 10).validate().is_ok());
        assert!(input(25, 0).validate().is_ok());
        assert!(input(0, 10).validate().is_err());
        assert!(input(25, -1).validate().is_err());

        let mut blank = input(25, 1);
        blank.name = "  ".to_string();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_prize_input_defaults_to_active() {
        let parsed: PrizeInput =
            serde_json::from_str(r#"{"name":"Mug","cost":"12.5","stock":3}"#).unwrap();
        assert!(parsed.is_active);
        assert_eq!(parsed.fields().name, "Mug");
    }
}
