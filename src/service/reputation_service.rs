// service/reputation_service.rs
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::ReputationPolicy,
    db::TrustStore,
    models::{
        escrowmodels::EscrowStatus,
        reputationmodels::{
            Badge, NewVote, Report, ReportStatus, ReputationStats, VoteContext, VoteOutcome,
            VoteScoring, VoteType,
        },
    },
    service::{
        audit_service::AuditService,
        error::ServiceError,
        notification_service::{deliver, Notice, NotificationEvent, Notifier},
        trust_service::{TrustService, TrustTrigger},
    },
    utils::clock::Clock,
};

#[derive(Debug, Clone, Serialize)]
pub struct ReputationSummary {
    pub stats: ReputationStats,
    pub badges: Vec<Badge>,
}

#[derive(Debug, Clone)]
pub struct ReputationService {
    store: Arc<dyn TrustStore>,
    clock: Arc<dyn Clock>,
    scoring: VoteScoring,
    daily_vote_limit: i64,
    trust: Arc<TrustService>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<AuditService>,
}

impl ReputationService {
    pub fn new(
        store: Arc<dyn TrustStore>,
        clock: Arc<dyn Clock>,
        policy: &ReputationPolicy,
        trust: Arc<TrustService>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            store,
            clock,
            scoring: policy.scoring(),
            daily_vote_limit: policy.daily_vote_limit,
            trust,
            notifier,
            audit,
        }
    }

    pub async fn cast_vote(
        &self,
        voter_id: Uuid,
        target_id: Uuid,
        vote_type: VoteType,
        context: Option<VoteContext>,
        context_id: Option<Uuid>,
    ) -> Result<VoteOutcome, ServiceError> {
        if voter_id == target_id {
            return Err(ServiceError::SelfVote);
        }

        let context = match (context, context_id) {
            (None, None) => None,
            (Some(kind), Some(id)) => Some((kind, id)),
            (Some(kind), None) => {
                return Err(ServiceError::Validation(format!(
                    "context_id is required for {} votes",
                    kind.to_str()
                )))
            }
            (None, Some(_)) => {
                return Err(ServiceError::Validation(
                    "context_id given without a context".to_string(),
                ))
            }
        };

        if let Some(voter) = self.store.get_verification_record(voter_id).await? {
            if voter.is_suspended {
                return Err(ServiceError::VoterSuspended(voter_id));
            }
        }

        if let Some((kind, context_id)) = context {
            match kind {
                VoteContext::Transaction => {
                    self.check_transaction_context(voter_id, target_id, context_id)
                        .await?
                }
            }
        }

        let now = self.clock.now();
        let cast_today = self
            .store
            .count_votes_cast_since(voter_id, now - Duration::days(1))
            .await?;
        if cast_today >= self.daily_vote_limit {
            tracing::warn!("Voter {} hit the daily vote limit", voter_id);
            return Err(ServiceError::RateLimited(self.daily_vote_limit));
        }

        let outcome = self
            .store
            .record_vote(
                NewVote {
                    voter_id,
                    target_user_id: target_id,
                    vote_type,
                    context,
                },
                &self.scoring,
                now,
            )
            .await?;

        if outcome.previous == Some(vote_type) {
            tracing::debug!("Repeated {} vote from {} on {}", vote_type.to_str(), voter_id, target_id);
            return Ok(outcome);
        }

        tracing::info!(
            "{} voted {} on {} (now {} points)",
            voter_id,
            vote_type.to_str(),
            target_id,
            outcome.stats.total_points
        );

        for badge in &outcome.new_badges {
            deliver(
                self.notifier.as_ref(),
                Notice::new(
                    target_id,
                    NotificationEvent::BadgeAwarded,
                    Some(badge.id),
                    serde_json::json!({
                        "tier": badge.tier.to_str(),
                        "points": badge.points_at_award,
                    }),
                    format!("You earned the {} badge", badge.tier.to_str()),
                ),
            )
            .await;
        }

        self.trust.recompute(target_id, TrustTrigger::VoteCast).await?;
        Ok(outcome)
    }

    /// A transaction vote must name a released escrow both accounts took part in.
    async fn check_transaction_context(
        &self,
        voter_id: Uuid,
        target_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<(), ServiceError> {
        let transaction = self
            .store
            .get_escrow_transaction(transaction_id)
            .await?
            .ok_or_else(|| {
                ServiceError::Validation(format!("Transaction {} does not exist", transaction_id))
            })?;

        if transaction.status != EscrowStatus::Released {
            return Err(ServiceError::Validation(
                "Transaction votes open once the escrow is released".to_string(),
            ));
        }
        if !(transaction.is_party(voter_id) && transaction.is_party(target_id)) {
            return Err(ServiceError::Validation(
                "Both accounts must be parties to the transaction".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn file_report(
        &self,
        reporter_id: Uuid,
        target_id: Uuid,
        reason: String,
    ) -> Result<Report, ServiceError> {
        if reporter_id == target_id {
            return Err(ServiceError::Validation(
                "Accounts cannot report themselves".to_string(),
            ));
        }
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::Validation("A reason is required".to_string()));
        }

        let report = self
            .store
            .create_report(target_id, reporter_id, reason, self.clock.now())
            .await?;

        tracing::info!("Report {} filed against {}", report.id, target_id);

        self.audit
            .log_audit_event(
                reporter_id,
                "report_filed",
                Some(report.id),
                Some(target_id),
                None,
                report.reason.clone(),
            )
            .await;

        Ok(report)
    }

    /// Admin decision on an open report. Only validated reports count
    /// against the target's trust score.
    pub async fn resolve_report(
        &self,
        report_id: Uuid,
        actor_id: Uuid,
        validated: bool,
    ) -> Result<Report, ServiceError> {
        let report = self
            .store
            .get_report(report_id)
            .await?
            .ok_or(ServiceError::ReportNotFound(report_id))?;
        if report.status != ReportStatus::Open {
            return Err(ServiceError::ReportAlreadyResolved(report_id));
        }

        let status = if validated {
            ReportStatus::Validated
        } else {
            ReportStatus::Dismissed
        };
        let resolved = self
            .store
            .resolve_report(report_id, status, actor_id, self.clock.now())
            .await?
            .ok_or(ServiceError::ReportAlreadyResolved(report_id))?;

        self.audit
            .log_audit_event(
                actor_id,
                if validated { "report_validated" } else { "report_dismissed" },
                Some(report_id),
                Some(resolved.target_user_id),
                None,
                format!("Report against {} resolved", resolved.target_user_id),
            )
            .await;

        if validated {
            self.trust
                .recompute(resolved.target_user_id, TrustTrigger::ReportValidated)
                .await?;
        }

        Ok(resolved)
    }

    pub async fn get_stats(&self, account_id: Uuid) -> Result<ReputationSummary, ServiceError> {
        let stats = self
            .store
            .get_reputation_stats(account_id)
            .await?
            .unwrap_or_else(|| ReputationStats::empty(account_id));
        let badges = self.store.get_badges(account_id).await?;
        Ok(ReputationSummary { stats, badges })
    }
}
