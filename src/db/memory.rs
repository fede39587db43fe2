// db/memory.rs
//
// In-process store with the same semantics as the Postgres client. Every
// operation runs under one lock, which stands in for the row locks and
// conditional updates used against the database.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    auditdb::AuditExt, commissiondb::CommissionExt, escrowdb::EscrowExt,
    reputationdb::ReputationExt, verificationdb::VerificationExt,
};

use crate::{
    models::{
        auditmodels::{AuditLog, NewAuditLog, Notification},
        escrowmodels::{
            CommissionRule, CreateEscrowOutcome, EscrowStatus, EscrowTransaction, FundingOutcome,
            NewEscrowTransaction, PayoutStatus, ProviderPayout, ServiceQuote, SubscriptionTier,
            TransitionOutcome,
        },
        reputationmodels::{
            Badge, NewVote, Report, ReportStatus, ReputationStats, ReputationVote, VoteOutcome,
            VoteScoring,
        },
        verificationmodels::{
            DocumentStatus, NewVerificationDocument, VerificationDocument, VerificationRecord,
        },
    },
    utils::currency::{apply_monthly_cap, split_gross},
};

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<Uuid, VerificationRecord>,
    documents: Vec<VerificationDocument>,
    votes: HashMap<(Uuid, Uuid, String), ReputationVote>,
    stats: HashMap<Uuid, ReputationStats>,
    badges: Vec<Badge>,
    reports: HashMap<Uuid, Report>,
    quotes: HashMap<Uuid, ServiceQuote>,
    subscriptions: HashMap<Uuid, SubscriptionTier>,
    rules: Vec<CommissionRule>,
    monthly_totals: HashMap<(Uuid, String), i64>,
    escrows: HashMap<Uuid, EscrowTransaction>,
    payouts: Vec<ProviderPayout>,
    audit_logs: Vec<AuditLog>,
    notifications: Vec<Notification>,
}

impl MemoryState {
    fn escrow_refusal<T>(&self, transaction_id: Uuid) -> TransitionOutcome<T> {
        match self.escrows.get(&transaction_id) {
            Some(current) => TransitionOutcome::Rejected(current.clone()),
            None => TransitionOutcome::NotFound,
        }
    }

    fn save_record(&mut self, record: &VerificationRecord) -> Option<VerificationRecord> {
        let stored = self.records.get_mut(&record.account_id)?;
        if stored.version != record.version {
            return None;
        }
        let mut saved = record.clone();
        saved.version += 1;
        *stored = saved.clone();
        Some(saved)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_quote(&self, quote: ServiceQuote) {
        self.state.lock().await.quotes.insert(quote.id, quote);
    }

    pub async fn insert_commission_rule(&self, rule: CommissionRule) {
        self.state.lock().await.rules.push(rule);
    }

    pub async fn set_subscription_tier(&self, account_id: Uuid, tier: SubscriptionTier) {
        self.state
            .lock()
            .await
            .subscriptions
            .insert(account_id, tier);
    }

    /// Overwrite a record without the version check, for arranging fixtures.
    pub async fn put_verification_record(&self, record: VerificationRecord) {
        self.state
            .lock()
            .await
            .records
            .insert(record.account_id, record);
    }

    pub async fn escrow_count(&self) -> usize {
        self.state.lock().await.escrows.len()
    }

    pub async fn payout_count(&self) -> usize {
        self.state.lock().await.payouts.len()
    }

    pub async fn document_count(&self) -> usize {
        self.state.lock().await.documents.len()
    }
}

#[async_trait]
impl VerificationExt for MemoryStore {
    async fn get_verification_record(
        &self,
        account_id: Uuid,
    ) -> Result<Option<VerificationRecord>, sqlx::Error> {
        Ok(self.state.lock().await.records.get(&account_id).cloned())
    }

    async fn create_verification_record(
        &self,
        record: &VerificationRecord,
    ) -> Result<VerificationRecord, sqlx::Error> {
        let mut state = self.state.lock().await;
        let stored = state
            .records
            .entry(record.account_id)
            .or_insert_with(|| record.clone());
        Ok(stored.clone())
    }

    async fn save_verification_record(
        &self,
        record: &VerificationRecord,
    ) -> Result<Option<VerificationRecord>, sqlx::Error> {
        Ok(self.state.lock().await.save_record(record))
    }

    async fn save_record_with_document(
        &self,
        record: &VerificationRecord,
        document: NewVerificationDocument,
    ) -> Result<Option<(VerificationRecord, VerificationDocument)>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let saved = match state.save_record(record) {
            Some(saved) => saved,
            None => return Ok(None),
        };

        let inserted = VerificationDocument {
            id: Uuid::new_v4(),
            account_id: document.account_id,
            document_type: document.document_type,
            verification_level: document.verification_level,
            status: DocumentStatus::Pending,
            file_url: document.file_url,
            content_hash: document.content_hash,
            face_match_score: document.face_match_score,
            duplicate_detected: document.duplicate_detected,
            reviewed_by: None,
            review_notes: None,
            decided_at: None,
            created_at: record.updated_at,
            updated_at: record.updated_at,
        };
        state.documents.push(inserted.clone());

        Ok(Some((saved, inserted)))
    }

    async fn save_record_rejecting_level(
        &self,
        record: &VerificationRecord,
        level: i16,
        reviewed_by: Uuid,
        review_notes: &str,
    ) -> Result<Option<(VerificationRecord, u64)>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let saved = match state.save_record(record) {
            Some(saved) => saved,
            None => return Ok(None),
        };

        let mut closed = 0;
        for document in state.documents.iter_mut().filter(|d| {
            d.account_id == record.account_id
                && d.verification_level == level
                && d.status == DocumentStatus::Pending
        }) {
            document.status = DocumentStatus::Rejected;
            document.reviewed_by = Some(reviewed_by);
            document.review_notes = Some(review_notes.to_string());
            document.decided_at = Some(record.updated_at);
            document.updated_at = record.updated_at;
            closed += 1;
        }

        Ok(Some((saved, closed)))
    }

    async fn get_verification_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<VerificationDocument>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.documents.iter().find(|d| d.id == document_id).cloned())
    }

    async fn get_account_documents(
        &self,
        account_id: Uuid,
        level: Option<i16>,
    ) -> Result<Vec<VerificationDocument>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut documents: Vec<VerificationDocument> = state
            .documents
            .iter()
            .filter(|d| d.account_id == account_id)
            .filter(|d| level.map_or(true, |l| d.verification_level == l))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn close_verification_document(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
        reviewed_by: Option<Uuid>,
        review_notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<VerificationDocument>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let document = match state
            .documents
            .iter_mut()
            .find(|d| d.id == document_id && d.status == DocumentStatus::Pending)
        {
            Some(document) => document,
            None => return Ok(None),
        };

        document.status = status;
        document.reviewed_by = reviewed_by;
        document.review_notes = review_notes;
        document.decided_at = Some(at);
        document.updated_at = at;
        Ok(Some(document.clone()))
    }

    async fn content_hash_seen_elsewhere(
        &self,
        content_hash: &str,
        account_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.documents.iter().any(|d| {
            d.account_id != account_id && d.content_hash.as_deref() == Some(content_hash)
        }))
    }

    async fn list_stale_pending_documents(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VerificationDocument>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut stale: Vec<VerificationDocument> = state
            .documents
            .iter()
            .filter(|d| d.status == DocumentStatus::Pending && d.created_at < created_before)
            .cloned()
            .collect();
        stale.sort_by_key(|d| d.created_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }
}

#[async_trait]
impl ReputationExt for MemoryStore {
    async fn record_vote(
        &self,
        vote: NewVote,
        scoring: &VoteScoring,
        at: DateTime<Utc>,
    ) -> Result<VoteOutcome, sqlx::Error> {
        let mut state = self.state.lock().await;
        let key = (vote.voter_id, vote.target_user_id, vote.context_key());

        let previous = state.votes.get(&key).map(|v| v.vote_type);
        let stored = match state.votes.get_mut(&key) {
            Some(existing) => {
                existing.vote_type = vote.vote_type;
                existing.updated_at = at;
                existing.clone()
            }
            None => {
                let created = ReputationVote {
                    id: Uuid::new_v4(),
                    voter_id: vote.voter_id,
                    target_user_id: vote.target_user_id,
                    vote_type: vote.vote_type,
                    context: vote.context_kind(),
                    context_id: vote.context_id(),
                    context_key: key.2.clone(),
                    created_at: at,
                    updated_at: at,
                };
                state.votes.insert(key, created.clone());
                created
            }
        };

        let delta = scoring.delta(previous, vote.vote_type);
        let target = vote.target_user_id;
        let total_points = {
            let stats = state
                .stats
                .entry(target)
                .or_insert_with(|| ReputationStats::empty(target));
            stats.apply(delta);
            stats.total_points
        };

        let mut new_badges = Vec::new();
        for tier in scoring.tiers_reached(total_points) {
            let held = state
                .badges
                .iter()
                .any(|b| b.account_id == target && b.tier == tier);
            if !held {
                let badge = Badge {
                    id: Uuid::new_v4(),
                    account_id: target,
                    tier,
                    points_at_award: total_points,
                    awarded_at: at,
                };
                state.badges.push(badge.clone());
                new_badges.push(badge);
            }
        }

        let stats = state
            .stats
            .get_mut(&target)
            .ok_or(sqlx::Error::RowNotFound)?;
        stats.badges_count += new_badges.len() as i32;
        let stats = stats.clone();

        Ok(VoteOutcome {
            vote: stored,
            previous,
            stats,
            new_badges,
        })
    }

    async fn get_reputation_stats(
        &self,
        account_id: Uuid,
    ) -> Result<Option<ReputationStats>, sqlx::Error> {
        Ok(self.state.lock().await.stats.get(&account_id).cloned())
    }

    async fn get_badges(&self, account_id: Uuid) -> Result<Vec<Badge>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .badges
            .iter()
            .filter(|b| b.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn count_votes_cast_since(
        &self,
        voter_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .votes
            .values()
            .filter(|v| v.voter_id == voter_id && v.updated_at >= since)
            .count() as i64)
    }

    async fn create_report(
        &self,
        target_user_id: Uuid,
        reporter_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<Report, sqlx::Error> {
        let report = Report {
            id: Uuid::new_v4(),
            target_user_id,
            reporter_id,
            reason,
            status: ReportStatus::Open,
            resolved_by: None,
            resolved_at: None,
            created_at: at,
        };
        self.state
            .lock()
            .await
            .reports
            .insert(report.id, report.clone());
        Ok(report)
    }

    async fn get_report(&self, report_id: Uuid) -> Result<Option<Report>, sqlx::Error> {
        Ok(self.state.lock().await.reports.get(&report_id).cloned())
    }

    async fn resolve_report(
        &self,
        report_id: Uuid,
        status: ReportStatus,
        resolved_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Report>, sqlx::Error> {
        let mut state = self.state.lock().await;
        match state.reports.get_mut(&report_id) {
            Some(report) if report.status == ReportStatus::Open => {
                report.status = status;
                report.resolved_by = Some(resolved_by);
                report.resolved_at = Some(at);
                Ok(Some(report.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn count_validated_reports(&self, account_id: Uuid) -> Result<i64, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .reports
            .values()
            .filter(|r| r.target_user_id == account_id && r.status == ReportStatus::Validated)
            .count() as i64)
    }
}

#[async_trait]
impl EscrowExt for MemoryStore {
    async fn get_service_quote(&self, quote_id: Uuid) -> Result<Option<ServiceQuote>, sqlx::Error> {
        Ok(self.state.lock().await.quotes.get(&quote_id).cloned())
    }

    async fn get_escrow_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<EscrowTransaction>, sqlx::Error> {
        Ok(self.state.lock().await.escrows.get(&transaction_id).cloned())
    }

    async fn create_escrow_transaction(
        &self,
        new: NewEscrowTransaction,
        at: DateTime<Utc>,
    ) -> Result<CreateEscrowOutcome, sqlx::Error> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.escrows.values().find(|e| e.quote_id == new.quote_id) {
            return Ok(CreateEscrowOutcome::Existing(existing.clone()));
        }

        let period_key = (new.provider_id, new.commission_period.clone());
        let charged = state.monthly_totals.get(&period_key).copied().unwrap_or(0);
        let commission = apply_monthly_cap(new.raw_commission_xaf, new.monthly_cap_xaf, charged);
        let (commission, net) = split_gross(new.amount_xaf, commission);

        let created = EscrowTransaction {
            id: Uuid::new_v4(),
            quote_id: new.quote_id,
            client_id: new.client_id,
            provider_id: new.provider_id,
            amount_xaf: new.amount_xaf,
            commission_rate: new.commission_rate,
            commission_xaf: commission,
            net_amount_xaf: net,
            commission_period: new.commission_period,
            status: EscrowStatus::Pending,
            payment_reference: None,
            funded_at: None,
            auto_release_at: None,
            released_at: None,
            refunded_at: None,
            refund_reason: None,
            dispute_reason: None,
            disputed_by: None,
            disputed_at: None,
            created_at: at,
            updated_at: at,
        };

        state.escrows.insert(created.id, created.clone());
        *state.monthly_totals.entry(period_key).or_insert(0) += commission;

        Ok(CreateEscrowOutcome::Created(created))
    }

    async fn mark_escrow_funded(
        &self,
        transaction_id: Uuid,
        payment_reference: &str,
        funded_at: DateTime<Utc>,
        auto_release_at: DateTime<Utc>,
    ) -> Result<FundingOutcome, sqlx::Error> {
        let mut state = self.state.lock().await;
        let holder = state
            .escrows
            .values()
            .find(|e| e.id != transaction_id && e.payment_reference.as_deref() == Some(payment_reference))
            .map(|e| e.id);
        if let Some(holder) = holder {
            return Ok(FundingOutcome::ReferenceInUse(holder));
        }

        match state.escrows.get_mut(&transaction_id) {
            Some(escrow) if escrow.status == EscrowStatus::Pending => {
                escrow.status = EscrowStatus::Funded;
                escrow.payment_reference = Some(payment_reference.to_string());
                escrow.funded_at = Some(funded_at);
                escrow.auto_release_at = Some(auto_release_at);
                escrow.updated_at = funded_at;
                Ok(FundingOutcome::Transition(TransitionOutcome::Applied(escrow.clone())))
            }
            _ => Ok(FundingOutcome::Transition(state.escrow_refusal(transaction_id))),
        }
    }

    async fn mark_escrow_disputed(
        &self,
        transaction_id: Uuid,
        disputed_by: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<EscrowTransaction>, sqlx::Error> {
        let mut state = self.state.lock().await;
        match state.escrows.get_mut(&transaction_id) {
            Some(escrow) if escrow.status == EscrowStatus::Funded => {
                escrow.status = EscrowStatus::Disputed;
                escrow.dispute_reason = Some(reason.to_string());
                escrow.disputed_by = Some(disputed_by);
                escrow.disputed_at = Some(at);
                escrow.auto_release_at = None;
                escrow.updated_at = at;
                Ok(TransitionOutcome::Applied(escrow.clone()))
            }
            _ => Ok(state.escrow_refusal(transaction_id)),
        }
    }

    async fn release_escrow(
        &self,
        transaction_id: Uuid,
        allow_disputed: bool,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<(EscrowTransaction, ProviderPayout)>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let released = match state.escrows.get_mut(&transaction_id) {
            Some(escrow)
                if escrow.status == EscrowStatus::Funded
                    || (allow_disputed && escrow.status == EscrowStatus::Disputed) =>
            {
                escrow.status = EscrowStatus::Released;
                escrow.released_at = Some(at);
                escrow.updated_at = at;
                escrow.clone()
            }
            _ => return Ok(state.escrow_refusal(transaction_id)),
        };

        let existing = state
            .payouts
            .iter()
            .find(|p| p.transaction_id == released.id)
            .cloned();
        let payout = match existing {
            Some(payout) => payout,
            None => {
                let payout = ProviderPayout {
                    id: Uuid::new_v4(),
                    transaction_id: released.id,
                    provider_id: released.provider_id,
                    amount_xaf: released.net_amount_xaf,
                    status: PayoutStatus::Pending,
                    external_reference: None,
                    failure_reason: None,
                    settled_by: None,
                    created_at: at,
                    settled_at: None,
                };
                state.payouts.push(payout.clone());
                payout
            }
        };

        Ok(TransitionOutcome::Applied((released, payout)))
    }

    async fn refund_escrow(
        &self,
        transaction_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<EscrowTransaction>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let refunded = match state.escrows.get_mut(&transaction_id) {
            Some(escrow)
                if matches!(escrow.status, EscrowStatus::Funded | EscrowStatus::Disputed) =>
            {
                escrow.status = EscrowStatus::Refunded;
                escrow.refunded_at = Some(at);
                escrow.refund_reason = Some(reason.to_string());
                escrow.auto_release_at = None;
                escrow.updated_at = at;
                escrow.clone()
            }
            _ => return Ok(state.escrow_refusal(transaction_id)),
        };

        let period_key = (refunded.provider_id, refunded.commission_period.clone());
        if let Some(total) = state.monthly_totals.get_mut(&period_key) {
            *total = (*total - refunded.commission_xaf).max(0);
        }

        if let Some(record) = state.records.get_mut(&refunded.provider_id) {
            record.cancellation_count += 1;
            record.version += 1;
            record.updated_at = at;
        }

        Ok(TransitionOutcome::Applied(refunded))
    }

    async fn list_auto_release_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut due: Vec<(DateTime<Utc>, Uuid)> = state
            .escrows
            .values()
            .filter(|e| e.status == EscrowStatus::Funded)
            .filter_map(|e| e.auto_release_at.filter(|at| *at <= now).map(|at| (at, e.id)))
            .collect();
        due.sort();
        due.truncate(limit.max(0) as usize);
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    async fn get_payout(&self, payout_id: Uuid) -> Result<Option<ProviderPayout>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.payouts.iter().find(|p| p.id == payout_id).cloned())
    }

    async fn list_provider_payouts(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<ProviderPayout>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut payouts: Vec<ProviderPayout> = state
            .payouts
            .iter()
            .filter(|p| p.provider_id == provider_id)
            .cloned()
            .collect();
        payouts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payouts)
    }

    async fn settle_payout(
        &self,
        payout_id: Uuid,
        status: PayoutStatus,
        external_reference: Option<String>,
        failure_reason: Option<String>,
        settled_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<ProviderPayout>, sqlx::Error> {
        let mut state = self.state.lock().await;
        match state
            .payouts
            .iter_mut()
            .find(|p| p.id == payout_id && p.status == PayoutStatus::Pending)
        {
            Some(payout) => {
                payout.status = status;
                payout.external_reference = external_reference;
                payout.failure_reason = failure_reason;
                payout.settled_by = Some(settled_by);
                payout.settled_at = Some(at);
                Ok(Some(payout.clone()))
            }
            None => Ok(None),
        }
    }

    async fn get_monthly_commission_total(
        &self,
        provider_id: Uuid,
        period: &str,
    ) -> Result<i64, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .monthly_totals
            .get(&(provider_id, period.to_string()))
            .copied()
            .unwrap_or(0))
    }
}

#[async_trait]
impl CommissionExt for MemoryStore {
    async fn find_commission_rules(
        &self,
        country_code: &str,
        tier: SubscriptionTier,
        amount_xaf: i64,
    ) -> Result<Vec<CommissionRule>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .rules
            .iter()
            .filter(|r| r.country_code == country_code && r.subscription_tier == tier)
            .filter(|r| r.covers(amount_xaf))
            .cloned()
            .collect())
    }

    async fn get_subscription_tier(
        &self,
        account_id: Uuid,
    ) -> Result<Option<SubscriptionTier>, sqlx::Error> {
        Ok(self.state.lock().await.subscriptions.get(&account_id).copied())
    }
}

#[async_trait]
impl AuditExt for MemoryStore {
    async fn insert_audit_log(
        &self,
        entry: NewAuditLog,
        at: DateTime<Utc>,
    ) -> Result<AuditLog, sqlx::Error> {
        let log = AuditLog {
            id: Uuid::new_v4(),
            actor_id: entry.actor_id,
            event_type: entry.event_type,
            subject_id: entry.subject_id,
            related_user_id: entry.related_user_id,
            metadata: entry.metadata,
            description: entry.description,
            created_at: at,
        };
        self.state.lock().await.audit_logs.push(log.clone());
        Ok(log)
    }

    async fn get_audit_logs_for_subject(
        &self,
        subject_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .audit_logs
            .iter()
            .rev()
            .filter(|l| l.subject_id == Some(subject_id))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn store_notification(
        &self,
        user_id: Uuid,
        event_type: &str,
        subject_id: Option<Uuid>,
        payload: Option<serde_json::Value>,
        message: String,
        at: DateTime<Utc>,
    ) -> Result<Notification, sqlx::Error> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            event_type: event_type.to_string(),
            subject_id,
            payload,
            message,
            created_at: at,
        };
        self.state
            .lock()
            .await
            .notifications
            .push(notification.clone());
        Ok(notification)
    }

    async fn get_notifications_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
