// service/commission_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::TrustStore,
    models::escrowmodels::{CommissionQuote, CommissionRule, SubscriptionTier},
    service::error::ServiceError,
    utils::currency::{apply_monthly_cap, commission_for},
};

/// Pick the single rule out of `candidates` that covers `amount_xaf`. Zero or
/// several matches mean the rule table is broken for this band.
pub fn select_rule(
    candidates: Vec<CommissionRule>,
    country_code: &str,
    tier: SubscriptionTier,
    amount_xaf: i64,
) -> Result<CommissionRule, ServiceError> {
    let mut matches: Vec<CommissionRule> = candidates
        .into_iter()
        .filter(|rule| {
            rule.country_code.eq_ignore_ascii_case(country_code)
                && rule.subscription_tier == tier
                && rule.covers(amount_xaf)
        })
        .collect();

    match matches.len() {
        0 => Err(ServiceError::CommissionRuleMissing {
            country_code: country_code.to_string(),
            tier,
            amount_xaf,
        }),
        1 => Ok(matches.remove(0)),
        n => Err(ServiceError::CommissionRuleAmbiguous {
            country_code: country_code.to_string(),
            tier,
            amount_xaf,
            matches: n,
        }),
    }
}

#[derive(Debug, Clone)]
pub struct CommissionService {
    store: Arc<dyn TrustStore>,
}

impl CommissionService {
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self { store }
    }

    /// Subscription tier of a provider; accounts without a subscription are
    /// on the free tier.
    pub async fn tier_for(&self, provider_id: Uuid) -> Result<SubscriptionTier, ServiceError> {
        Ok(self
            .store
            .get_subscription_tier(provider_id)
            .await?
            .unwrap_or(SubscriptionTier::Free))
    }

    /// Commission a provider would be charged on `amount_xaf` right now,
    /// given what they have already paid this period.
    pub async fn resolve(
        &self,
        amount_xaf: i64,
        country_code: &str,
        tier: SubscriptionTier,
        provider_id: Uuid,
        period: &str,
    ) -> Result<CommissionQuote, ServiceError> {
        if amount_xaf <= 0 {
            return Err(ServiceError::Validation(
                "amount_xaf must be positive".to_string(),
            ));
        }

        let country_code = country_code.trim().to_uppercase();
        let candidates = self
            .store
            .find_commission_rules(&country_code, tier, amount_xaf)
            .await?;
        let rule = select_rule(candidates, &country_code, tier, amount_xaf)?;

        let raw_commission_xaf = commission_for(amount_xaf, &rule.commission_percent)
            .ok_or_else(|| {
                ServiceError::Other(format!(
                    "commission rule {} has an unusable percentage {}",
                    rule.id, rule.commission_percent
                ))
            })?;

        let charged_this_period_xaf = self
            .store
            .get_monthly_commission_total(provider_id, period)
            .await?;
        let commission_xaf =
            apply_monthly_cap(raw_commission_xaf, rule.monthly_cap_xaf, charged_this_period_xaf);

        tracing::debug!(
            "Commission for {} XAF ({}/{}): rule {} at {}% -> {} XAF",
            amount_xaf,
            country_code,
            tier.to_str(),
            rule.id,
            rule.commission_percent,
            commission_xaf
        );

        Ok(CommissionQuote {
            rule_id: rule.id,
            commission_percent: rule.commission_percent,
            raw_commission_xaf,
            commission_xaf,
            monthly_cap_xaf: rule.monthly_cap_xaf,
            charged_this_period_xaf,
            capped: commission_xaf < raw_commission_xaf,
        })
    }
}
