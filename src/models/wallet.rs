//! Wallet balance and ledger models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Kinds of wallet movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    QuizReward,
    PrizeRedemption,
    AdminAdjustment,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::QuizReward => "quiz_reward",
            Self::PrizeRedemption => "prize_redemption",
            Self::AdminAdjustment => "admin_adjustment",
            Self::Refund => "refund",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(Self::Deposit),
            "quiz_reward" => Some(Self::QuizReward),
            "prize_redemption" => Some(Self::PrizeRedemption),
            "admin_adjustment" => Some(Self::AdminAdjustment),
            "refund" => Some(Self::Refund),
            _ => None,
        }
    }
}

/// Ledger entry; `amount` is signed (debits are negative)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn kind_enum(&self) -> Option<TransactionKind> {
        TransactionKind::from_str(&self.kind)
    }

    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_negative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        for kind in [
            TransactionKind::Deposit,
            TransactionKind::QuizReward,
            TransactionKind::PrizeRedemption,
            TransactionKind::AdminAdjustment,
            TransactionKind::Refund,
        ] {
            assert_eq!(TransactionKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(TransactionKind::from_str("bet_placed"), None);
    }
}
