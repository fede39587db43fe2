// db/commissiondb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::db::DBClient;

use crate::models::escrowmodels::{CommissionRule, SubscriptionTier};

#[async_trait]
pub trait CommissionExt: Send + Sync {
    /// Every rule for (country, tier) whose amount range contains `amount_xaf`.
    async fn find_commission_rules(
        &self,
        country_code: &str,
        tier: SubscriptionTier,
        amount_xaf: i64,
    ) -> Result<Vec<CommissionRule>, sqlx::Error>;

    async fn get_subscription_tier(
        &self,
        account_id: Uuid,
    ) -> Result<Option<SubscriptionTier>, sqlx::Error>;
}

#[async_trait]
impl CommissionExt for DBClient {
    async fn find_commission_rules(
        &self,
        country_code: &str,
        tier: SubscriptionTier,
        amount_xaf: i64,
    ) -> Result<Vec<CommissionRule>, sqlx::Error> {
        sqlx::query_as::<_, CommissionRule>(
            r#"
            SELECT id, country_code, subscription_tier, min_amount_xaf, max_amount_xaf,
                   commission_percent, monthly_cap_xaf
            FROM commission_rules
            WHERE country_code = $1
              AND subscription_tier = $2
              AND min_amount_xaf <= $3
              AND (max_amount_xaf IS NULL OR max_amount_xaf >= $3)
            ORDER BY min_amount_xaf ASC
            "#,
        )
        .bind(country_code)
        .bind(tier)
        .bind(amount_xaf)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_subscription_tier(
        &self,
        account_id: Uuid,
    ) -> Result<Option<SubscriptionTier>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT tier FROM provider_subscriptions
            WHERE account_id = $1
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
    }
}
