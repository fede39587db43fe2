// service/trust_service.rs
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::TrustWeights,
    db::TrustStore,
    models::verificationmodels::{AccountKind, LevelStatus, VerificationRecord},
    service::{
        audit_service::AuditService,
        error::ServiceError,
        notification_service::{deliver, Notice, NotificationEvent, Notifier},
        MAX_SAVE_ATTEMPTS, SYSTEM_ACTOR,
    },
    utils::clock::Clock,
};

/// Why a recompute was requested. Carried into logs and suspension reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustTrigger {
    DocumentDecision,
    LevelRejected,
    VoteCast,
    ReportValidated,
    TransactionReleased,
    TransactionRefunded,
    ResponseRateUpdated,
    Manual,
}

impl TrustTrigger {
    pub fn to_str(&self) -> &str {
        match self {
            TrustTrigger::DocumentDecision => "document_decision",
            TrustTrigger::LevelRejected => "level_rejected",
            TrustTrigger::VoteCast => "vote_cast",
            TrustTrigger::ReportValidated => "report_validated",
            TrustTrigger::TransactionReleased => "transaction_released",
            TrustTrigger::TransactionRefunded => "transaction_refunded",
            TrustTrigger::ResponseRateUpdated => "response_rate_updated",
            TrustTrigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrustScore {
    /// Unclamped sum, may be negative.
    pub raw: i32,
    /// Value that gets stored: `max(raw, floor)`.
    pub clamped: i32,
}

/// Score of `record` under `weights`. Reads only the record, so calling it
/// twice on the same record always agrees.
pub fn compute_trust_score(record: &VerificationRecord, weights: &TrustWeights) -> TrustScore {
    let l1_bonus = if record.levels[0].status == LevelStatus::Approved {
        weights.l1_bonus
    } else {
        0
    };
    let response_bonus = if weights.response_divisor > 0 {
        record.response_rate.clamp(0, 100) / weights.response_divisor
    } else {
        0
    };

    let raw = weights.base + l1_bonus + record.positive_reviews_count * weights.positive_weight
        - record.negative_reviews_count * weights.negative_weight
        - record.reports_count * weights.report_weight
        - record.cancellation_count * weights.cancellation_weight
        + response_bonus;

    TrustScore {
        raw,
        clamped: raw.max(weights.floor),
    }
}

/// Score shown to other users. Seekers are never ranked publicly.
pub fn public_trust_score(record: &VerificationRecord) -> Option<i32> {
    match record.account_kind {
        AccountKind::Seeker => None,
        AccountKind::Provider => Some(record.trust_score),
    }
}

#[derive(Debug, Clone)]
pub struct TrustService {
    store: Arc<dyn TrustStore>,
    clock: Arc<dyn Clock>,
    weights: TrustWeights,
    notifier: Arc<dyn Notifier>,
    audit: Arc<AuditService>,
}

impl TrustService {
    pub fn new(
        store: Arc<dyn TrustStore>,
        clock: Arc<dyn Clock>,
        weights: TrustWeights,
        notifier: Arc<dyn Notifier>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            store,
            clock,
            weights,
            notifier,
            audit,
        }
    }

    pub async fn get_record(&self, account_id: Uuid) -> Result<VerificationRecord, ServiceError> {
        self.store
            .get_verification_record(account_id)
            .await?
            .ok_or(ServiceError::RecordNotFound(account_id))
    }

    /// Refresh the derived counters of `account_id`, rescore it and apply the
    /// suspension policy. Accounts without a verification record are skipped.
    pub async fn recompute(
        &self,
        account_id: Uuid,
        trigger: TrustTrigger,
    ) -> Result<Option<VerificationRecord>, ServiceError> {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let record = match self.store.get_verification_record(account_id).await? {
                Some(record) => record,
                None => {
                    tracing::debug!(
                        "Skipping trust recompute for {} ({}): no verification record",
                        account_id,
                        trigger.to_str()
                    );
                    return Ok(None);
                }
            };

            let stats = self.store.get_reputation_stats(account_id).await?;
            let validated_reports = self.store.count_validated_reports(account_id).await?;

            let mut updated = record.clone();
            if let Some(stats) = stats {
                updated.positive_reviews_count = stats.upvotes_received;
                updated.negative_reviews_count = stats.downvotes_received;
            }
            updated.reports_count = validated_reports as i32;

            let score = compute_trust_score(&updated, &self.weights);
            updated.trust_score = score.clamped;

            let now = self.clock.now();
            let threshold = self.weights.suspension_threshold;
            // After a reinstatement only a fresh fall from at or above the
            // threshold suspends again.
            let reinstated_below =
                record.suspension_lifted_at.is_some() && record.trust_score < threshold;
            let newly_suspended =
                !updated.is_suspended && !reinstated_below && score.clamped < threshold;
            if newly_suspended {
                updated.is_suspended = true;
                updated.suspended_at = Some(now);
                updated.suspension_reason = Some(format!(
                    "Trust score {} fell below {} after {}",
                    score.clamped,
                    threshold,
                    trigger.to_str()
                ));
            }

            if updated == record {
                return Ok(Some(record));
            }
            updated.updated_at = now;

            match self.store.save_verification_record(&updated).await? {
                Some(saved) => {
                    tracing::info!(
                        "Trust score for {} is now {} (raw {}) after {}",
                        account_id,
                        score.clamped,
                        score.raw,
                        trigger.to_str()
                    );
                    if newly_suspended {
                        self.announce_suspension(&saved, trigger).await;
                    }
                    return Ok(Some(saved));
                }
                None => {
                    tracing::debug!(
                        "Trust recompute for {} lost a version race (attempt {})",
                        account_id,
                        attempt
                    );
                }
            }
        }

        Err(ServiceError::ConcurrencyConflict(format!(
            "verification record {}",
            account_id
        )))
    }

    async fn announce_suspension(&self, record: &VerificationRecord, trigger: TrustTrigger) {
        let reason = record.suspension_reason.clone().unwrap_or_default();
        tracing::warn!("Account {} suspended: {}", record.account_id, reason);

        self.audit
            .log_audit_event(
                SYSTEM_ACTOR,
                "account_suspended",
                Some(record.account_id),
                Some(record.account_id),
                Some(serde_json::json!({
                    "trust_score": record.trust_score,
                    "threshold": self.weights.suspension_threshold,
                    "trigger": trigger.to_str(),
                })),
                reason.clone(),
            )
            .await;

        deliver(
            self.notifier.as_ref(),
            Notice::new(
                record.account_id,
                NotificationEvent::AccountSuspended,
                Some(record.account_id),
                serde_json::json!({ "reason": reason }),
                "Your account has been suspended pending review",
            ),
        )
        .await;
    }

    /// Admin reinstatement. The only way `is_suspended` goes back to false.
    pub async fn lift_suspension(
        &self,
        account_id: Uuid,
        actor_id: Uuid,
        note: String,
    ) -> Result<VerificationRecord, ServiceError> {
        let note = note.trim().to_string();
        if note.is_empty() {
            return Err(ServiceError::Validation(
                "A note is required to lift a suspension".to_string(),
            ));
        }

        let mut record = self.get_record(account_id).await?;
        if !record.is_suspended {
            return Err(ServiceError::NotSuspended(account_id));
        }

        let previous_reason = record.suspension_reason.take();
        record.is_suspended = false;
        record.suspended_at = None;
        record.suspension_lifted_at = Some(self.clock.now());
        record.updated_at = self.clock.now();

        let saved = self
            .store
            .save_verification_record(&record)
            .await?
            .ok_or_else(|| ServiceError::ConcurrencyConflict(format!("verification record {}", account_id)))?;

        tracing::info!("Suspension lifted for {} by {}", account_id, actor_id);

        self.audit
            .log_audit_event(
                actor_id,
                "suspension_lifted",
                Some(account_id),
                Some(account_id),
                Some(serde_json::json!({
                    "previous_reason": previous_reason,
                    "trust_score": saved.trust_score,
                })),
                note,
            )
            .await;

        deliver(
            self.notifier.as_ref(),
            Notice::new(
                account_id,
                NotificationEvent::SuspensionLifted,
                Some(account_id),
                serde_json::json!({}),
                "Your account has been reinstated",
            ),
        )
        .await;

        Ok(saved)
    }

    /// Store the latest response rate reported by messaging, then rescore.
    pub async fn record_response_rate(
        &self,
        account_id: Uuid,
        response_rate: i32,
    ) -> Result<VerificationRecord, ServiceError> {
        if !(0..=100).contains(&response_rate) {
            return Err(ServiceError::Validation(
                "response_rate must be between 0 and 100".to_string(),
            ));
        }

        let mut saved = None;
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let mut record = self.get_record(account_id).await?;
            if record.response_rate == response_rate {
                saved = Some(record);
                break;
            }
            record.response_rate = response_rate;
            record.updated_at = self.clock.now();
            if let Some(record) = self.store.save_verification_record(&record).await? {
                saved = Some(record);
                break;
            }
        }

        let saved = saved.ok_or_else(|| {
            ServiceError::ConcurrencyConflict(format!("verification record {}", account_id))
        })?;

        Ok(self
            .recompute(account_id, TrustTrigger::ResponseRateUpdated)
            .await?
            .unwrap_or(saved))
    }
}
