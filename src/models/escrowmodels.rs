// models/escrowmodels.rs
use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "escrow_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Pending,
    Funded,
    Released,
    Refunded,
    Disputed,
}

impl EscrowStatus {
    pub fn to_str(&self) -> &str {
        match self {
            EscrowStatus::Pending => "pending",
            EscrowStatus::Funded => "funded",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
            EscrowStatus::Disputed => "disputed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowStatus::Released | EscrowStatus::Refunded)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct EscrowTransaction {
    pub id: Uuid,
    pub quote_id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Uuid,
    pub amount_xaf: i64,
    pub commission_rate: BigDecimal,
    pub commission_xaf: i64,
    pub net_amount_xaf: i64,
    pub commission_period: String,
    pub status: EscrowStatus,
    pub payment_reference: Option<String>,
    pub funded_at: Option<DateTime<Utc>>,
    pub auto_release_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub dispute_reason: Option<String>,
    pub disputed_by: Option<Uuid>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscrowTransaction {
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.client_id == user_id || self.provider_id == user_id
    }

    pub fn amounts_balance(&self) -> bool {
        self.amount_xaf == self.commission_xaf + self.net_amount_xaf
    }
}

/// Everything needed to insert an escrow row except the final commission,
/// which the store settles against the provider's monthly aggregate inside
/// the same write.
#[derive(Debug, Clone)]
pub struct NewEscrowTransaction {
    pub quote_id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Uuid,
    pub amount_xaf: i64,
    pub commission_rate: BigDecimal,
    pub raw_commission_xaf: i64,
    pub monthly_cap_xaf: Option<i64>,
    pub commission_period: String,
}

#[derive(Debug, Clone)]
pub enum CreateEscrowOutcome {
    Created(EscrowTransaction),
    Existing(EscrowTransaction),
}

/// Result of a status-guarded update. `Rejected` carries the row as it was
/// found, so callers can tell "already done" from "not allowed".
#[derive(Debug, Clone)]
pub enum TransitionOutcome<T> {
    Applied(T),
    Rejected(EscrowTransaction),
    NotFound,
}

/// Result of binding a payment reference to a pending escrow.
#[derive(Debug, Clone)]
pub enum FundingOutcome {
    Transition(TransitionOutcome<EscrowTransaction>),
    /// The reference already funds the given transaction.
    ReferenceInUse(Uuid),
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "quote_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Accepted,
    Declined,
    Withdrawn,
}

/// Read-only view of a marketplace service quote.
#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct ServiceQuote {
    pub id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Uuid,
    pub amount_xaf: i64,
    pub country_code: String,
    pub status: QuoteStatus,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "subscription_tier", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Standard,
    Premium,
}

impl SubscriptionTier {
    pub fn to_str(&self) -> &str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Standard => "standard",
            SubscriptionTier::Premium => "premium",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct CommissionRule {
    pub id: Uuid,
    pub country_code: String,
    pub subscription_tier: SubscriptionTier,
    pub min_amount_xaf: i64,
    pub max_amount_xaf: Option<i64>,
    pub commission_percent: BigDecimal,
    pub monthly_cap_xaf: Option<i64>,
}

impl CommissionRule {
    pub fn covers(&self, amount_xaf: i64) -> bool {
        amount_xaf >= self.min_amount_xaf
            && self.max_amount_xaf.map_or(true, |max| amount_xaf <= max)
    }
}

/// Commission the resolver would charge right now.
#[derive(Debug, Clone, Serialize)]
pub struct CommissionQuote {
    pub rule_id: Uuid,
    pub commission_percent: BigDecimal,
    pub raw_commission_xaf: i64,
    pub commission_xaf: i64,
    pub monthly_cap_xaf: Option<i64>,
    pub charged_this_period_xaf: i64,
    pub capped: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct ProviderPayout {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub provider_id: Uuid,
    pub amount_xaf: i64,
    pub status: PayoutStatus,
    pub external_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub settled_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// `YYYY-MM` key of the commission period containing `at`.
pub fn commission_period(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn rule_range_is_inclusive() {
        let rule = CommissionRule {
            id: Uuid::new_v4(),
            country_code: "CM".to_string(),
            subscription_tier: SubscriptionTier::Free,
            min_amount_xaf: 1_000,
            max_amount_xaf: Some(500_000),
            commission_percent: BigDecimal::from_str("10").unwrap(),
            monthly_cap_xaf: None,
        };
        assert!(!rule.covers(999));
        assert!(rule.covers(1_000));
        assert!(rule.covers(500_000));
        assert!(!rule.covers(500_001));

        let open_ended = CommissionRule { max_amount_xaf: None, ..rule };
        assert!(open_ended.covers(i64::MAX));
    }

    #[test]
    fn period_key_is_year_and_month() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(commission_period(at), "2026-03");
    }

    #[test]
    fn terminal_statuses() {
        assert!(EscrowStatus::Released.is_terminal());
        assert!(EscrowStatus::Refunded.is_terminal());
        assert!(!EscrowStatus::Disputed.is_terminal());
        assert!(!EscrowStatus::Funded.is_terminal());
    }
}
