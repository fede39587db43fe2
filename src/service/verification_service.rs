// service/verification_service.rs
use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::VerificationPolicy,
    db::TrustStore,
    models::verificationmodels::{
        level_index, AccountKind, DocumentDecision, DocumentStatus, DocumentType, EligibleAt,
        LevelEligibility, LevelStatus, NewVerificationDocument, VerificationDocument,
        VerificationRecord, MAX_LEVEL, MIN_LEVEL,
    },
    service::{
        audit_service::AuditService,
        document_storage::{content_hash, DocumentStorage},
        error::ServiceError,
        notification_service::{deliver, Notice, NotificationEvent, Notifier},
        trust_service::{TrustService, TrustTrigger},
        with_timeout, MAX_SAVE_ATTEMPTS, SYSTEM_ACTOR,
    },
    utils::clock::Clock,
};

const STORAGE: &str = "document storage";

/// Where the bytes of a submitted document come from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Already uploaded by the client; fetched once to fingerprint it.
    Url(String),
    Upload { bytes: Vec<u8>, content_type: String },
}

#[derive(Debug, Clone)]
pub struct DocumentSubmission {
    pub document_type: DocumentType,
    pub level: i16,
    pub source: DocumentSource,
    pub face_match_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub document: VerificationDocument,
    pub level_status: LevelStatus,
    /// True only for the call that moved the level to approved.
    pub level_approved: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpirySweepReport {
    pub documents_expired: usize,
    pub levels_expired: usize,
    pub failures: usize,
}

/// Reject a submission that would break the level chain or the account's
/// policy. Runs before any write.
pub fn check_submission(
    record: &VerificationRecord,
    policy: &VerificationPolicy,
    level: i16,
    document_type: DocumentType,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let state = record.level(level).ok_or(ServiceError::InvalidLevel(level))?;

    if level > policy.max_level_for(record.account_kind) {
        return Err(ServiceError::LevelNotAvailable {
            level,
            kind: record.account_kind,
        });
    }
    if level > record.current_level + 1 {
        return Err(ServiceError::InvalidLevelOrder {
            requested: level,
            current: record.current_level,
        });
    }
    if state.status == LevelStatus::Approved {
        return Err(ServiceError::LevelAlreadyApproved(level));
    }
    if level > MIN_LEVEL && !(record.is_level_approved(level - 1) && state.eligible_at.reached(now))
    {
        return Err(ServiceError::LevelNotEligible {
            level,
            eligible_at: state.eligible_at,
        });
    }
    if !policy.accepts_document(level, document_type) {
        return Err(ServiceError::Validation(format!(
            "{} is not accepted for level {}",
            document_type.to_str(),
            level
        )));
    }
    Ok(())
}

/// Per-level view of what `record` may start at `now`.
pub fn eligibility_for(
    record: &VerificationRecord,
    policy: &VerificationPolicy,
    now: DateTime<Utc>,
) -> Vec<LevelEligibility> {
    (MIN_LEVEL..=MAX_LEVEL)
        .filter_map(|level| {
            let state = record.level(level)?;
            let allowed_for_account = level <= policy.max_level_for(record.account_kind);
            let prerequisites_met = level == MIN_LEVEL
                || (record.is_level_approved(level - 1) && state.eligible_at.reached(now));

            Some(LevelEligibility {
                level,
                status: state.status,
                eligible_at: state.eligible_at,
                allowed_for_account,
                can_start_now: allowed_for_account
                    && state.status != LevelStatus::Approved
                    && prerequisites_met,
            })
        })
        .collect()
}

fn requirements_met(policy: &VerificationPolicy, level: i16, approved: &[DocumentType]) -> bool {
    let requirements = policy.requirements_for(level);
    !requirements.is_empty()
        && requirements
            .iter()
            .all(|req| req.any_of.iter().any(|t| approved.contains(t)))
}

/// Mark `level` approved and open the cooling period of the next one.
fn approve_level(
    record: &mut VerificationRecord,
    level: i16,
    policy: &VerificationPolicy,
    now: DateTime<Utc>,
) {
    if let Some(state) = record.level_mut(level) {
        state.status = LevelStatus::Approved;
    }

    let next = level + 1;
    let cooling = policy.cooling_period(next);
    if let Some(next_state) = record.level_mut(next) {
        if next_state.eligible_at == EligibleAt::NotEligible {
            next_state.eligible_at = EligibleAt::At(now + cooling);
        }
    }

    record.current_level = record.highest_approved_level().max(MIN_LEVEL);
    record.updated_at = now;
}

fn same_decision(document: &VerificationDocument, wanted: DocumentStatus) -> Result<(), ServiceError> {
    if document.status == wanted {
        Ok(())
    } else {
        Err(ServiceError::DocumentAlreadyDecided(document.id, document.status))
    }
}

#[derive(Debug, Clone)]
pub struct VerificationService {
    store: Arc<dyn TrustStore>,
    clock: Arc<dyn Clock>,
    policy: VerificationPolicy,
    storage: Arc<dyn DocumentStorage>,
    trust: Arc<TrustService>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<AuditService>,
    dependency_timeout: Duration,
}

impl VerificationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TrustStore>,
        clock: Arc<dyn Clock>,
        policy: VerificationPolicy,
        storage: Arc<dyn DocumentStorage>,
        trust: Arc<TrustService>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<AuditService>,
        dependency_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            storage,
            trust,
            notifier,
            audit,
            dependency_timeout,
        }
    }

    pub async fn get_record(&self, account_id: Uuid) -> Result<VerificationRecord, ServiceError> {
        self.store
            .get_verification_record(account_id)
            .await?
            .ok_or(ServiceError::RecordNotFound(account_id))
    }

    pub async fn list_documents(
        &self,
        account_id: Uuid,
        level: Option<i16>,
    ) -> Result<Vec<VerificationDocument>, ServiceError> {
        if let Some(level) = level {
            level_index(level).ok_or(ServiceError::InvalidLevel(level))?;
        }
        Ok(self.store.get_account_documents(account_id, level).await?)
    }

    pub async fn check_eligibility(
        &self,
        account_id: Uuid,
        account_kind: AccountKind,
    ) -> Result<Vec<LevelEligibility>, ServiceError> {
        let now = self.clock.now();
        let record = match self.store.get_verification_record(account_id).await? {
            Some(record) => record,
            None => VerificationRecord::new(account_id, account_kind, now),
        };
        Ok(eligibility_for(&record, &self.policy, now))
    }

    pub async fn submit_document(
        &self,
        account_id: Uuid,
        account_kind: AccountKind,
        submission: DocumentSubmission,
    ) -> Result<VerificationDocument, ServiceError> {
        let level = submission.level;
        level_index(level).ok_or(ServiceError::InvalidLevel(level))?;
        if let Some(score) = submission.face_match_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(ServiceError::Validation(
                    "face_match_score must be between 0 and 1".to_string(),
                ));
            }
        }

        let existing = self.store.get_verification_record(account_id).await?;
        let is_new = existing.is_none();
        let mut record = existing
            .unwrap_or_else(|| VerificationRecord::new(account_id, account_kind, self.clock.now()));
        check_submission(&record, &self.policy, level, submission.document_type, self.clock.now())?;

        // Storage runs before the first write so an outage leaves nothing behind.
        let (file_url, hash) = self.resolve_source(submission.source).await?;

        if is_new {
            record = self.store.create_verification_record(&record).await?;
            tracing::info!("Created verification record for {}", account_id);
        }

        let duplicate_detected = self
            .store
            .content_hash_seen_elsewhere(&hash, account_id)
            .await?;
        if duplicate_detected {
            tracing::warn!(
                "Document for {} level {} matches a file submitted by another account",
                account_id,
                level
            );
        }

        for attempt in 0..MAX_SAVE_ATTEMPTS {
            if attempt > 0 {
                record = self.get_record(account_id).await?;
                check_submission(&record, &self.policy, level, submission.document_type, self.clock.now())?;
            }

            let now = self.clock.now();
            let mut updated = record.clone();
            if let Some(state) = updated.level_mut(level) {
                state.status = LevelStatus::Pending;
            }
            updated.updated_at = now;

            let document = NewVerificationDocument {
                account_id,
                document_type: submission.document_type,
                verification_level: level,
                file_url: file_url.clone(),
                content_hash: Some(hash.clone()),
                face_match_score: submission.face_match_score,
                duplicate_detected,
            };

            if let Some((_, document)) = self.store.save_record_with_document(&updated, document).await? {
                tracing::info!(
                    "Document {} ({}) submitted for {} level {}",
                    document.id,
                    document.document_type.to_str(),
                    account_id,
                    level
                );

                self.audit
                    .log_audit_event(
                        account_id,
                        "document_submitted",
                        Some(account_id),
                        None,
                        Some(serde_json::json!({
                            "document_id": document.id,
                            "document_type": document.document_type.to_str(),
                            "level": level,
                            "duplicate_detected": duplicate_detected,
                        })),
                        format!("Level {} document submitted", level),
                    )
                    .await;

                return Ok(document);
            }
        }

        Err(ServiceError::ConcurrencyConflict(format!(
            "verification record {}",
            account_id
        )))
    }

    async fn resolve_source(&self, source: DocumentSource) -> Result<(String, String), ServiceError> {
        match source {
            DocumentSource::Upload {
                bytes,
                content_type,
            } => {
                if bytes.is_empty() {
                    return Err(ServiceError::Validation("Uploaded document is empty".to_string()));
                }
                let hash = content_hash(&bytes);
                let url = with_timeout(
                    STORAGE,
                    self.dependency_timeout,
                    self.storage.store(bytes, &content_type),
                )
                .await?;
                Ok((url, hash))
            }
            DocumentSource::Url(url) => {
                let url = url.trim().to_string();
                if url.is_empty() {
                    return Err(ServiceError::Validation("file_url is required".to_string()));
                }
                let bytes =
                    with_timeout(STORAGE, self.dependency_timeout, self.storage.fetch(&url)).await?;
                Ok((url, content_hash(&bytes)))
            }
        }
    }

    /// Approve or reject a pending document. Repeating the decision already
    /// taken is accepted and re-runs the level evaluation.
    pub async fn decide_document(
        &self,
        document_id: Uuid,
        decision: DocumentDecision,
        reviewer_id: Uuid,
        reason: Option<String>,
    ) -> Result<DecisionOutcome, ServiceError> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if decision == DocumentDecision::Rejected && reason.is_none() {
            return Err(ServiceError::Validation(
                "A reason is required to reject a document".to_string(),
            ));
        }

        let wanted = decision.as_status();
        let document = self
            .store
            .get_verification_document(document_id)
            .await?
            .ok_or(ServiceError::DocumentNotFound(document_id))?;

        let document = if document.status == DocumentStatus::Pending {
            let closed = self
                .store
                .close_verification_document(
                    document_id,
                    wanted,
                    Some(reviewer_id),
                    reason.clone(),
                    self.clock.now(),
                )
                .await?;

            match closed {
                Some(closed) => {
                    self.announce_decision(&closed, reviewer_id).await;
                    closed
                }
                None => {
                    let current = self
                        .store
                        .get_verification_document(document_id)
                        .await?
                        .ok_or(ServiceError::DocumentNotFound(document_id))?;
                    same_decision(&current, wanted)?;
                    current
                }
            }
        } else {
            same_decision(&document, wanted)?;
            document
        };

        let (level_status, level_approved) = match decision {
            DocumentDecision::Approved => {
                self.evaluate_level(document.account_id, document.verification_level, reviewer_id)
                    .await?
            }
            DocumentDecision::Rejected => {
                let record = self.get_record(document.account_id).await?;
                let status = record
                    .level(document.verification_level)
                    .map(|state| state.status)
                    .ok_or(ServiceError::InvalidLevel(document.verification_level))?;
                (status, false)
            }
        };

        self.trust
            .recompute(document.account_id, TrustTrigger::DocumentDecision)
            .await?;

        Ok(DecisionOutcome {
            document,
            level_status,
            level_approved,
        })
    }

    async fn announce_decision(&self, document: &VerificationDocument, reviewer_id: Uuid) {
        tracing::info!(
            "Document {} {} by reviewer {}",
            document.id,
            document.status.to_str(),
            reviewer_id
        );

        self.audit
            .log_audit_event(
                reviewer_id,
                "document_decided",
                Some(document.account_id),
                Some(document.account_id),
                Some(serde_json::json!({
                    "document_id": document.id,
                    "level": document.verification_level,
                    "decision": document.status.to_str(),
                    "notes": document.review_notes,
                })),
                format!(
                    "Level {} {} document {}",
                    document.verification_level,
                    document.document_type.to_str(),
                    document.status.to_str()
                ),
            )
            .await;

        if document.status == DocumentStatus::Rejected {
            deliver(
                self.notifier.as_ref(),
                Notice::new(
                    document.account_id,
                    NotificationEvent::DocumentRejected,
                    Some(document.id),
                    serde_json::json!({
                        "level": document.verification_level,
                        "document_type": document.document_type.to_str(),
                        "reason": document.review_notes,
                    }),
                    "A verification document was rejected, please resubmit",
                ),
            )
            .await;
        }
    }

    /// Approve `level` once every requirement is covered by an approved
    /// document. Returns the level status and whether this call approved it.
    async fn evaluate_level(
        &self,
        account_id: Uuid,
        level: i16,
        reviewer_id: Uuid,
    ) -> Result<(LevelStatus, bool), ServiceError> {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let record = self.get_record(account_id).await?;
            let state = *record.level(level).ok_or(ServiceError::InvalidLevel(level))?;
            if state.status == LevelStatus::Approved {
                return Ok((LevelStatus::Approved, false));
            }

            let approved: Vec<DocumentType> = self
                .store
                .get_account_documents(account_id, Some(level))
                .await?
                .into_iter()
                .filter(|d| d.status == DocumentStatus::Approved)
                .map(|d| d.document_type)
                .collect();
            if !requirements_met(&self.policy, level, &approved) {
                return Ok((state.status, false));
            }

            let now = self.clock.now();
            if level > MIN_LEVEL
                && !(record.is_level_approved(level - 1) && state.eligible_at.reached(now))
            {
                tracing::warn!(
                    "Level {} for {} has its documents but not its prerequisites",
                    level,
                    account_id
                );
                return Ok((state.status, false));
            }

            let mut updated = record.clone();
            approve_level(&mut updated, level, &self.policy, now);
            if !updated.level_chain_holds() {
                return Err(ServiceError::Other(format!(
                    "approving level {} for {} would break the level chain",
                    level, account_id
                )));
            }

            if let Some(saved) = self.store.save_verification_record(&updated).await? {
                self.announce_level_approved(&saved, level, reviewer_id).await;
                return Ok((LevelStatus::Approved, true));
            }
        }

        Err(ServiceError::ConcurrencyConflict(format!(
            "verification record {}",
            account_id
        )))
    }

    async fn announce_level_approved(&self, record: &VerificationRecord, level: i16, reviewer_id: Uuid) {
        let next_eligible_at = record
            .level(level + 1)
            .and_then(|state| state.eligible_at.to_column());
        tracing::info!("Level {} approved for {}", level, record.account_id);

        self.audit
            .log_audit_event(
                reviewer_id,
                "level_approved",
                Some(record.account_id),
                Some(record.account_id),
                Some(serde_json::json!({
                    "level": level,
                    "next_level_eligible_at": next_eligible_at,
                })),
                format!("Verification level {} approved", level),
            )
            .await;

        deliver(
            self.notifier.as_ref(),
            Notice::new(
                record.account_id,
                NotificationEvent::LevelApproved,
                Some(record.account_id),
                serde_json::json!({
                    "level": level,
                    "next_level_eligible_at": next_eligible_at,
                }),
                format!("Verification level {} approved", level),
            ),
        )
        .await;
    }

    /// Admin rejection of a whole pending level. Its pending documents are
    /// closed with the same reason; the account may resubmit.
    pub async fn reject_level(
        &self,
        account_id: Uuid,
        level: i16,
        reviewer_id: Uuid,
        reason: String,
    ) -> Result<VerificationRecord, ServiceError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::Validation(
                "A reason is required to reject a level".to_string(),
            ));
        }
        level_index(level).ok_or(ServiceError::InvalidLevel(level))?;

        let mut saved = None;
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let record = self.get_record(account_id).await?;
            let status = record.level(level).map(|state| state.status);
            if status != Some(LevelStatus::Pending) {
                return Err(ServiceError::LevelNotPending(level));
            }

            let mut updated = record.clone();
            if let Some(state) = updated.level_mut(level) {
                state.status = LevelStatus::Rejected;
            }
            updated.updated_at = self.clock.now();

            if let Some(outcome) = self
                .store
                .save_record_rejecting_level(&updated, level, reviewer_id, &reason)
                .await?
            {
                saved = Some(outcome);
                break;
            }
        }
        let (saved, closed) = saved.ok_or_else(|| {
            ServiceError::ConcurrencyConflict(format!("verification record {}", account_id))
        })?;

        tracing::info!(
            "Level {} rejected for {} by {} ({} pending documents closed)",
            level,
            account_id,
            reviewer_id,
            closed
        );

        self.audit
            .log_audit_event(
                reviewer_id,
                "level_rejected",
                Some(account_id),
                Some(account_id),
                Some(serde_json::json!({ "level": level, "documents_closed": closed })),
                reason.clone(),
            )
            .await;

        deliver(
            self.notifier.as_ref(),
            Notice::new(
                account_id,
                NotificationEvent::LevelRejected,
                Some(account_id),
                serde_json::json!({ "level": level, "reason": reason }),
                format!("Verification level {} was rejected, you may resubmit", level),
            ),
        )
        .await;

        Ok(self
            .trust
            .recompute(account_id, TrustTrigger::LevelRejected)
            .await?
            .unwrap_or(saved))
    }

    /// Expire documents left pending longer than the review window, and any
    /// level left with nothing pending because of it.
    pub async fn expire_stale_submissions(&self) -> Result<ExpirySweepReport, ServiceError> {
        let now = self.clock.now();
        let cutoff = now - self.policy.pending_document_ttl;
        let stale = self
            .store
            .list_stale_pending_documents(cutoff, self.policy.expiry_batch_size)
            .await?;

        let mut report = ExpirySweepReport::default();
        let mut touched: Vec<(Uuid, i16)> = Vec::new();
        let note = format!(
            "Not reviewed within {} days",
            self.policy.pending_document_ttl.num_days()
        );

        for document in stale {
            match self
                .store
                .close_verification_document(
                    document.id,
                    DocumentStatus::Expired,
                    None,
                    Some(note.clone()),
                    now,
                )
                .await
            {
                Ok(Some(_)) => {
                    report.documents_expired += 1;
                    let key = (document.account_id, document.verification_level);
                    if !touched.contains(&key) {
                        touched.push(key);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Failed to expire document {}: {}", document.id, e);
                    report.failures += 1;
                }
            }
        }

        for (account_id, level) in touched {
            match self.expire_idle_level(account_id, level, now).await {
                Ok(true) => report.levels_expired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        "Failed to expire level {} for {}: {}",
                        level,
                        account_id,
                        e
                    );
                    report.failures += 1;
                }
            }
        }

        if report.documents_expired > 0 || report.failures > 0 {
            tracing::info!(
                "Expiry sweep: {} documents, {} levels expired, {} failures",
                report.documents_expired,
                report.levels_expired,
                report.failures
            );
        }
        Ok(report)
    }

    async fn expire_idle_level(
        &self,
        account_id: Uuid,
        level: i16,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let record = match self.store.get_verification_record(account_id).await? {
                Some(record) => record,
                None => return Ok(false),
            };
            if record.level(level).map(|s| s.status) != Some(LevelStatus::Pending) {
                return Ok(false);
            }

            let still_pending = self
                .store
                .get_account_documents(account_id, Some(level))
                .await?
                .iter()
                .any(|d| d.status == DocumentStatus::Pending);
            if still_pending {
                return Ok(false);
            }

            let mut updated = record.clone();
            if let Some(state) = updated.level_mut(level) {
                state.status = LevelStatus::Expired;
            }
            updated.updated_at = now;

            if self.store.save_verification_record(&updated).await?.is_some() {
                self.audit
                    .log_audit_event(
                        SYSTEM_ACTOR,
                        "level_expired",
                        Some(account_id),
                        Some(account_id),
                        Some(serde_json::json!({ "level": level })),
                        format!("Level {} submission expired without review", level),
                    )
                    .await;
                return Ok(true);
            }
        }

        Err(ServiceError::ConcurrencyConflict(format!(
            "verification record {}",
            account_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::verificationdb::VerificationExt,
        service::error::ErrorKind,
        testutil::{provider_record, upload, TestHarness},
    };
    use chrono::Duration as ChronoDuration;

    async fn approve_level_one(h: &TestHarness, account: Uuid) {
        let reviewer = Uuid::new_v4();
        for (doc_type, bytes) in [
            (DocumentType::Passport, b"passport".as_slice()),
            (DocumentType::Selfie, b"selfie".as_slice()),
        ] {
            let doc = h
                .verification
                .submit_document(account, AccountKind::Provider, upload(doc_type, 1, bytes))
                .await
                .unwrap();
            h.verification
                .decide_document(doc.id, DocumentDecision::Approved, reviewer, None)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn first_upload_creates_record_and_pending_document() {
        let h = TestHarness::new();
        let account = Uuid::new_v4();

        let doc = h
            .verification
            .submit_document(
                account,
                AccountKind::Provider,
                upload(DocumentType::NationalId, 1, b"id-card"),
            )
            .await
            .unwrap();

        assert_eq!(doc.status, DocumentStatus::Pending);
        assert!(doc.file_url.starts_with("mem://"));
        assert_eq!(doc.content_hash.as_deref(), Some(content_hash(b"id-card").as_str()));

        let record = h.verification.get_record(account).await.unwrap();
        assert_eq!(record.levels[0].status, LevelStatus::Pending);
        assert_eq!(record.current_level, 1);
    }

    #[tokio::test]
    async fn level_three_while_level_two_pending_is_a_sequence_error() {
        let h = TestHarness::new();
        let mut record = provider_record(1);
        record.levels[1].status = LevelStatus::Pending;
        let account = record.account_id;
        h.store.put_verification_record(record).await;
        let documents_before = h.store.document_count().await;

        let err = h
            .verification
            .submit_document(
                account,
                AccountKind::Provider,
                upload(DocumentType::PropertyTitle, 3, b"title"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidLevelOrder { requested: 3, current: 1 }));
        assert_eq!(err.kind(), ErrorKind::Sequence);
        assert_eq!(h.store.document_count().await, documents_before);
        assert_eq!(h.storage.stored_count(), 0);
    }

    #[tokio::test]
    async fn level_two_needs_level_one_first() {
        let h = TestHarness::new();
        let err = h
            .verification
            .submit_document(
                Uuid::new_v4(),
                AccountKind::Provider,
                upload(DocumentType::ProofOfAddress, 2, b"bill"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::LevelNotEligible { level: 2, .. }));
    }

    #[tokio::test]
    async fn seekers_cannot_go_past_level_one() {
        let h = TestHarness::new();
        let mut record = provider_record(1);
        record.account_kind = AccountKind::Seeker;
        let account = record.account_id;
        h.store.put_verification_record(record).await;

        let err = h
            .verification
            .submit_document(
                account,
                AccountKind::Seeker,
                upload(DocumentType::ProofOfAddress, 2, b"bill"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::LevelNotAvailable { level: 2, .. }));

        let eligibility = h.verification.check_eligibility(account, AccountKind::Seeker).await.unwrap();
        assert!(!eligibility[1].allowed_for_account);
        assert!(!eligibility[1].can_start_now);
    }

    #[tokio::test]
    async fn document_type_must_match_level() {
        let h = TestHarness::new();
        let err = h
            .verification
            .submit_document(
                Uuid::new_v4(),
                AccountKind::Provider,
                upload(DocumentType::SiteInspection, 1, b"x"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn approving_all_requirements_approves_the_level() {
        let h = TestHarness::new();
        let account = Uuid::new_v4();
        let reviewer = Uuid::new_v4();

        let passport = h
            .verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::Passport, 1, b"p"))
            .await
            .unwrap();
        let selfie = h
            .verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::Selfie, 1, b"s"))
            .await
            .unwrap();

        let first = h
            .verification
            .decide_document(passport.id, DocumentDecision::Approved, reviewer, None)
            .await
            .unwrap();
        assert_eq!(first.level_status, LevelStatus::Pending);
        assert!(!first.level_approved);

        let second = h
            .verification
            .decide_document(selfie.id, DocumentDecision::Approved, reviewer, None)
            .await
            .unwrap();
        assert_eq!(second.level_status, LevelStatus::Approved);
        assert!(second.level_approved);

        let record = h.verification.get_record(account).await.unwrap();
        let now = h.clock.now();
        assert!(record.is_level_approved(1));
        assert_eq!(record.current_level, 1);
        assert_eq!(record.levels[1].eligible_at, EligibleAt::At(now + ChronoDuration::days(1)));
        assert_eq!(record.levels[2].eligible_at, EligibleAt::NotEligible);
        // base 50 + level one bonus 30
        assert_eq!(record.trust_score, 80);
        assert!(record.level_chain_holds());
        assert_eq!(h.notifier.sent(NotificationEvent::LevelApproved), 1);

        let trail = h.audit.get_audit_trail(account, 20, 0).await.unwrap();
        assert!(trail
            .iter()
            .any(|log| log.event_type == "level_approved" && log.actor_id == reviewer));
    }

    #[tokio::test]
    async fn cooling_period_gates_the_next_level() {
        let h = TestHarness::new();
        let account = Uuid::new_v4();
        approve_level_one(&h, account).await;

        let err = h
            .verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::ProofOfAddress, 2, b"bill"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::LevelNotEligible { level: 2, .. }));

        h.clock.advance(ChronoDuration::days(1));
        let eligibility = h
            .verification
            .check_eligibility(account, AccountKind::Provider)
            .await
            .unwrap();
        assert!(eligibility[1].can_start_now);
        assert!(!eligibility[2].can_start_now);

        h.verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::ProofOfAddress, 2, b"bill"))
            .await
            .unwrap();
        let record = h.verification.get_record(account).await.unwrap();
        assert_eq!(record.levels[1].status, LevelStatus::Pending);
    }

    #[tokio::test]
    async fn rejection_needs_reason_and_keeps_level_status() {
        let h = TestHarness::new();
        let account = Uuid::new_v4();
        let reviewer = Uuid::new_v4();
        let doc = h
            .verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::Passport, 1, b"p"))
            .await
            .unwrap();

        let err = h
            .verification
            .decide_document(doc.id, DocumentDecision::Rejected, reviewer, Some("  ".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let outcome = h
            .verification
            .decide_document(doc.id, DocumentDecision::Rejected, reviewer, Some("Blurry".into()))
            .await
            .unwrap();
        assert_eq!(outcome.document.status, DocumentStatus::Rejected);
        assert_eq!(outcome.document.reviewed_by, Some(reviewer));
        assert_eq!(outcome.level_status, LevelStatus::Pending);
        assert_eq!(h.notifier.sent(NotificationEvent::DocumentRejected), 1);

        // Same decision again is accepted, the opposite one is not.
        h.verification
            .decide_document(doc.id, DocumentDecision::Rejected, reviewer, Some("Blurry".into()))
            .await
            .unwrap();
        let err = h
            .verification
            .decide_document(doc.id, DocumentDecision::Approved, reviewer, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DocumentAlreadyDecided(_, DocumentStatus::Rejected)));
        assert_eq!(h.notifier.sent(NotificationEvent::DocumentRejected), 1);
    }

    #[tokio::test]
    async fn storage_outage_leaves_no_trace() {
        let h = TestHarness::new();
        h.storage.set_failing(true);
        let account = Uuid::new_v4();

        let err = h
            .verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::Passport, 1, b"p"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DependencyFailure);
        assert!(err.is_retryable());
        assert!(h.store.get_verification_record(account).await.unwrap().is_none());
        assert_eq!(h.store.document_count().await, 0);
    }

    #[tokio::test]
    async fn same_file_from_two_accounts_is_flagged() {
        let h = TestHarness::new();
        let first = h
            .verification
            .submit_document(Uuid::new_v4(), AccountKind::Provider, upload(DocumentType::Passport, 1, b"shared"))
            .await
            .unwrap();
        assert!(!first.duplicate_detected);

        let second = h
            .verification
            .submit_document(
                Uuid::new_v4(),
                AccountKind::Provider,
                DocumentSubmission {
                    document_type: DocumentType::Passport,
                    level: 1,
                    source: DocumentSource::Url(first.file_url.clone()),
                    face_match_score: Some(0.93),
                },
            )
            .await
            .unwrap();
        assert!(second.duplicate_detected);
        assert_eq!(second.face_match_score, Some(0.93));
    }

    #[tokio::test]
    async fn rejected_level_can_be_resubmitted() {
        let h = TestHarness::new();
        let account = Uuid::new_v4();
        let reviewer = Uuid::new_v4();
        let doc = h
            .verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::Passport, 1, b"p"))
            .await
            .unwrap();

        let record = h
            .verification
            .reject_level(account, 1, reviewer, "Documents do not match".into())
            .await
            .unwrap();
        assert_eq!(record.levels[0].status, LevelStatus::Rejected);

        let closed = h.store.get_verification_document(doc.id).await.unwrap().unwrap();
        assert_eq!(closed.status, DocumentStatus::Rejected);
        assert_eq!(closed.reviewed_by, Some(reviewer));

        let err = h
            .verification
            .reject_level(account, 1, reviewer, "again".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::LevelNotPending(1)));

        h.verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::Passport, 1, b"p2"))
            .await
            .unwrap();
        let record = h.verification.get_record(account).await.unwrap();
        assert_eq!(record.levels[0].status, LevelStatus::Pending);
    }

    #[tokio::test]
    async fn level_rejection_and_document_closing_commit_together() {
        let h = TestHarness::new();
        let account = Uuid::new_v4();
        let reviewer = Uuid::new_v4();
        let passport = h
            .verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::Passport, 1, b"p"))
            .await
            .unwrap();
        let selfie = h
            .verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::Selfie, 1, b"s"))
            .await
            .unwrap();

        // A record read before a concurrent write changes nothing at all.
        let mut stale = h.verification.get_record(account).await.unwrap();
        stale.version -= 1;
        if let Some(state) = stale.level_mut(1) {
            state.status = LevelStatus::Rejected;
        }
        let lost = h
            .store
            .save_record_rejecting_level(&stale, 1, reviewer, "race")
            .await
            .unwrap();
        assert!(lost.is_none());
        for id in [passport.id, selfie.id] {
            let doc = h.store.get_verification_document(id).await.unwrap().unwrap();
            assert_eq!(doc.status, DocumentStatus::Pending);
        }
        let record = h.verification.get_record(account).await.unwrap();
        assert_eq!(record.levels[0].status, LevelStatus::Pending);

        let record = h
            .verification
            .reject_level(account, 1, reviewer, "Photos are edited".into())
            .await
            .unwrap();
        assert_eq!(record.levels[0].status, LevelStatus::Rejected);
        for id in [passport.id, selfie.id] {
            let doc = h.store.get_verification_document(id).await.unwrap().unwrap();
            assert_eq!(doc.status, DocumentStatus::Rejected);
            assert_eq!(doc.review_notes.as_deref(), Some("Photos are edited"));
        }

        let trail = h.audit.get_audit_trail(account, 10, 0).await.unwrap();
        let rejected = trail.iter().find(|e| e.event_type == "level_rejected").unwrap();
        assert_eq!(rejected.metadata.as_ref().unwrap()["documents_closed"], 2);
    }

    #[tokio::test]
    async fn stale_submissions_expire_and_reopen_the_level() {
        let h = TestHarness::new();
        let account = Uuid::new_v4();
        let doc = h
            .verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::Passport, 1, b"p"))
            .await
            .unwrap();

        let early = h.verification.expire_stale_submissions().await.unwrap();
        assert_eq!(early, ExpirySweepReport::default());

        h.clock.advance(ChronoDuration::days(31));
        let report = h.verification.expire_stale_submissions().await.unwrap();
        assert_eq!(report.documents_expired, 1);
        assert_eq!(report.levels_expired, 1);
        assert_eq!(report.failures, 0);

        let expired = h.store.get_verification_document(doc.id).await.unwrap().unwrap();
        assert_eq!(expired.status, DocumentStatus::Expired);
        let record = h.verification.get_record(account).await.unwrap();
        assert_eq!(record.levels[0].status, LevelStatus::Expired);

        h.verification
            .submit_document(account, AccountKind::Provider, upload(DocumentType::Passport, 1, b"p"))
            .await
            .unwrap();
    }

    #[test]
    fn eligibility_follows_the_chain() {
        let policy = VerificationPolicy::default();
        let now = Utc::now();
        let mut record = provider_record(1);
        record.levels[1].eligible_at = EligibleAt::At(now - ChronoDuration::hours(1));

        let view = eligibility_for(&record, &policy, now);
        assert_eq!(view.len(), 4);
        assert!(!view[0].can_start_now);
        assert!(view[1].can_start_now);
        assert!(!view[2].can_start_now);
        assert!(!view[3].can_start_now);
    }

    #[test]
    fn approving_opens_cooling_period_of_next_level() {
        let policy = VerificationPolicy::default();
        let now = Utc::now();
        let mut record = provider_record(1);
        record.levels[1].eligible_at = EligibleAt::At(now);

        approve_level(&mut record, 2, &policy, now);
        assert_eq!(record.current_level, 2);
        assert_eq!(record.levels[2].eligible_at, EligibleAt::At(now + ChronoDuration::days(7)));
        assert!(record.level_chain_holds());

        approve_level(&mut record, 3, &policy, now);
        approve_level(&mut record, 4, &policy, now);
        assert_eq!(record.current_level, 4);
        assert!(record.level_chain_holds());
    }
}
