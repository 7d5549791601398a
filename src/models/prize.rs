use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Prize {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub cost: Decimal,
    pub stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Prize {
    pub fn is_redeemable(&self) -> bool {
        self.is_active && self.stock > 0
    }
}

/// Fulfilment state of a redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

impl RedemptionStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RedemptionStatus::Pending),
            "fulfilled" => Ok(RedemptionStatus::Fulfilled),
            "cancelled" => Ok(RedemptionStatus::Cancelled),
            _ => Err(format!("Invalid redemption status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Pending => "pending",
            RedemptionStatus::Fulfilled => "fulfilled",
            RedemptionStatus::Cancelled => "cancelled",
        }
    }

    /// Only pending redemptions may move, and only to a terminal state
    pub fn can_transition_to(&self, next: RedemptionStatus) -> bool {
        matches!(
            (self, next),
            (RedemptionStatus::Pending, RedemptionStatus::Fulfilled)
                | (RedemptionStatus::Pending, RedemptionStatus::Cancelled)
        )
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PrizeRedemption {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prize_id: Uuid,
    pub cost: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrizeRedemption {
    pub fn status_enum(&self) -> Option<RedemptionStatus> {
        RedemptionStatus::from_str(&self.status).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redemption_transitions() {
        use RedemptionStatus::*;
        assert!(Pending.can_transition_to(Fulfilled));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Fulfilled.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }
}
