// testutil.rs
//
// Wiring for service tests: the in-memory store, a manual clock and fake
// collaborators whose behaviour each test can switch.
use std::{
    collections::HashMap,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::{EscrowPolicy, ReputationPolicy, TrustWeights, VerificationPolicy},
    db::memory::MemoryStore,
    models::{
        escrowmodels::{CommissionRule, QuoteStatus, ServiceQuote, SubscriptionTier},
        reputationmodels::VoteScoring,
        verificationmodels::{
            AccountKind, DocumentType, EligibleAt, LevelStatus, VerificationRecord,
        },
    },
    service::{
        audit_service::AuditService,
        commission_service::CommissionService,
        document_storage::DocumentStorage,
        error::ServiceError,
        escrow_service::EscrowService,
        notification_service::{Notice, NotificationEvent, Notifier},
        payment_provider::{FundingConfirmation, PaymentCollector},
        reputation_service::ReputationService,
        trust_service::TrustService,
        verification_service::{DocumentSource, DocumentSubmission, VerificationService},
    },
    utils::clock::ManualClock,
};

#[derive(Debug, Default)]
pub struct FakeNotifier {
    failing: AtomicBool,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<NotificationEvent>>,
}

impl FakeNotifier {
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successful deliveries of `event`.
    pub fn sent(&self, event: NotificationEvent) -> usize {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == event)
            .count()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, notice: Notice) -> Result<(), ServiceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::dependency("notifier", "push gateway down"));
        }
        self.delivered.lock().unwrap().push(notice.event);
        Ok(())
    }
}

/// Confirms whatever amount the test expects. With nothing configured every
/// reference is declined.
#[derive(Debug, Default)]
pub struct FakePaymentCollector {
    unreachable: AtomicBool,
    confirmed_amount: Mutex<Option<i64>>,
    declined: Mutex<Option<String>>,
}

impl FakePaymentCollector {
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_confirmed_amount(&self, amount_xaf: Option<i64>) {
        *self.confirmed_amount.lock().unwrap() = amount_xaf;
    }

    pub fn set_declined(&self, reason: Option<String>) {
        *self.declined.lock().unwrap() = reason;
    }
}

#[async_trait]
impl PaymentCollector for FakePaymentCollector {
    async fn confirm_funding(&self, reference: &str) -> Result<FundingConfirmation, ServiceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ServiceError::dependency("payment collector", "connection refused"));
        }
        if let Some(reason) = self.declined.lock().unwrap().clone() {
            return Ok(FundingConfirmation::Declined { reason });
        }
        match *self.confirmed_amount.lock().unwrap() {
            Some(amount_xaf) => Ok(FundingConfirmation::Confirmed { amount_xaf }),
            None => Ok(FundingConfirmation::Declined {
                reason: format!("unknown reference {}", reference),
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeDocumentStorage {
    failing: AtomicBool,
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeDocumentStorage {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stored_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStorage for FakeDocumentStorage {
    async fn store(&self, bytes: Vec<u8>, _content_type: &str) -> Result<String, ServiceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::dependency("document storage", "bucket unavailable"));
        }
        let mut objects = self.objects.lock().unwrap();
        let url = format!("mem://documents/{}", objects.len() + 1);
        objects.insert(url.clone(), bytes);
        Ok(url)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::dependency("document storage", "bucket unavailable"));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.as_bytes().to_vec()))
    }
}

pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<FakeNotifier>,
    pub payments: Arc<FakePaymentCollector>,
    pub storage: Arc<FakeDocumentStorage>,
    pub audit: Arc<AuditService>,
    pub trust: Arc<TrustService>,
    pub commission: Arc<CommissionService>,
    pub verification: Arc<VerificationService>,
    pub reputation: Arc<ReputationService>,
    pub escrow: Arc<EscrowService>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_trust_weights(TrustWeights::default())
    }

    pub fn with_trust_weights(weights: TrustWeights) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let notifier = Arc::new(FakeNotifier::default());
        let payments = Arc::new(FakePaymentCollector::default());
        let storage = Arc::new(FakeDocumentStorage::default());
        let timeout = Duration::from_secs(2);

        let audit = Arc::new(AuditService::new(store.clone(), clock.clone()));
        let trust = Arc::new(TrustService::new(
            store.clone(),
            clock.clone(),
            weights,
            notifier.clone(),
            audit.clone(),
        ));
        let commission = Arc::new(CommissionService::new(store.clone()));
        let verification = Arc::new(VerificationService::new(
            store.clone(),
            clock.clone(),
            VerificationPolicy::default(),
            storage.clone(),
            trust.clone(),
            notifier.clone(),
            audit.clone(),
            timeout,
        ));
        let reputation = Arc::new(ReputationService::new(
            store.clone(),
            clock.clone(),
            &ReputationPolicy::default(),
            trust.clone(),
            notifier.clone(),
            audit.clone(),
        ));
        let escrow = Arc::new(EscrowService::new(
            store.clone(),
            clock.clone(),
            EscrowPolicy::default(),
            commission.clone(),
            payments.clone(),
            trust.clone(),
            notifier.clone(),
            audit.clone(),
            timeout,
        ));

        Self {
            store,
            clock,
            notifier,
            payments,
            storage,
            audit,
            trust,
            commission,
            verification,
            reputation,
            escrow,
        }
    }

    pub fn reputation_scoring(&self) -> VoteScoring {
        ReputationPolicy::default().scoring()
    }
}

/// Provider whose first `levels_approved` levels are approved.
pub fn provider_record(levels_approved: i16) -> VerificationRecord {
    let now = Utc::now();
    let mut record = VerificationRecord::new(Uuid::new_v4(), AccountKind::Provider, now);
    for level in 1..=levels_approved {
        if let Some(state) = record.level_mut(level) {
            state.status = LevelStatus::Approved;
            state.eligible_at = EligibleAt::At(now);
        }
    }
    record.current_level = record.highest_approved_level().max(1);
    record
}

pub fn commission_rule(
    country_code: &str,
    tier: SubscriptionTier,
    min_amount_xaf: i64,
    max_amount_xaf: Option<i64>,
    percent: &str,
    monthly_cap_xaf: Option<i64>,
) -> CommissionRule {
    CommissionRule {
        id: Uuid::new_v4(),
        country_code: country_code.to_string(),
        subscription_tier: tier,
        min_amount_xaf,
        max_amount_xaf,
        commission_percent: BigDecimal::from_str(percent).unwrap(),
        monthly_cap_xaf,
    }
}

/// Accepted CM quote from a fresh client.
pub fn accepted_quote(provider_id: Uuid, amount_xaf: i64) -> ServiceQuote {
    ServiceQuote {
        id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        provider_id,
        amount_xaf,
        country_code: "CM".to_string(),
        status: QuoteStatus::Accepted,
    }
}

pub fn upload(document_type: DocumentType, level: i16, bytes: &[u8]) -> DocumentSubmission {
    DocumentSubmission {
        document_type,
        level,
        source: DocumentSource::Upload {
            bytes: bytes.to_vec(),
            content_type: "image/jpeg".to_string(),
        },
        face_match_score: None,
    }
}
