// service/escrow_service.rs
use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::EscrowPolicy,
    db::TrustStore,
    models::escrowmodels::{
        commission_period, CreateEscrowOutcome, EscrowStatus, EscrowTransaction, FundingOutcome,
        NewEscrowTransaction, PayoutStatus, ProviderPayout, QuoteStatus, ServiceQuote,
        TransitionOutcome,
    },
    service::{
        audit_service::AuditService,
        commission_service::CommissionService,
        error::ServiceError,
        notification_service::{deliver, Notice, NotificationEvent, Notifier},
        payment_provider::{FundingConfirmation, PaymentCollector},
        trust_service::{TrustService, TrustTrigger},
        with_timeout, SYSTEM_ACTOR,
    },
    utils::{clock::Clock, currency::format_xaf},
};

const PAYMENTS: &str = "payment collector";

/// Who is asking for an escrow transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User(Uuid),
    Admin(Uuid),
    /// Scheduled jobs.
    System,
}

impl Actor {
    pub fn id(&self) -> Uuid {
        match self {
            Actor::User(id) | Actor::Admin(id) => *id,
            Actor::System => SYSTEM_ACTOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    Release,
    Refund,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutOutcome {
    Completed { external_reference: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseReceipt {
    pub transaction: EscrowTransaction,
    pub payout: ProviderPayout,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub candidates: usize,
    pub released: usize,
    /// Rows that left `funded` between the claim and the release.
    pub skipped: usize,
    pub failed: usize,
}

/// Error for an action attempted on a row in the wrong state.
fn transition_error(transaction: &EscrowTransaction, action: &'static str) -> ServiceError {
    if transaction.status.is_terminal() {
        ServiceError::AlreadyTerminal(transaction.id, transaction.status)
    } else {
        ServiceError::InvalidEscrowTransition {
            id: transaction.id,
            from: transaction.status,
            action,
        }
    }
}

fn required(text: String, what: &str) -> Result<String, ServiceError> {
    let text = text.trim().to_string();
    if text.is_empty() {
        Err(ServiceError::Validation(format!("{} is required", what)))
    } else {
        Ok(text)
    }
}

#[derive(Debug, Clone)]
pub struct EscrowService {
    store: Arc<dyn TrustStore>,
    clock: Arc<dyn Clock>,
    policy: EscrowPolicy,
    commission: Arc<CommissionService>,
    payments: Arc<dyn PaymentCollector>,
    trust: Arc<TrustService>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<AuditService>,
    dependency_timeout: Duration,
}

impl EscrowService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TrustStore>,
        clock: Arc<dyn Clock>,
        policy: EscrowPolicy,
        commission: Arc<CommissionService>,
        payments: Arc<dyn PaymentCollector>,
        trust: Arc<TrustService>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<AuditService>,
        dependency_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            commission,
            payments,
            trust,
            notifier,
            audit,
            dependency_timeout,
        }
    }

    pub async fn get_transaction(&self, transaction_id: Uuid) -> Result<EscrowTransaction, ServiceError> {
        self.store
            .get_escrow_transaction(transaction_id)
            .await?
            .ok_or(ServiceError::TransactionNotFound(transaction_id))
    }

    pub async fn list_payouts(&self, provider_id: Uuid) -> Result<Vec<ProviderPayout>, ServiceError> {
        Ok(self.store.list_provider_payouts(provider_id).await?)
    }

    async fn ensure_escrow_eligible(&self, quote: &ServiceQuote) -> Result<(), ServiceError> {
        let provider = self
            .store
            .get_verification_record(quote.provider_id)
            .await?
            .ok_or_else(|| {
                ServiceError::EscrowIneligible(format!(
                    "provider {} has not started verification",
                    quote.provider_id
                ))
            })?;

        if provider.is_suspended {
            return Err(ServiceError::EscrowIneligible(format!(
                "provider {} is suspended",
                quote.provider_id
            )));
        }
        if provider.highest_approved_level() < self.policy.min_provider_level {
            return Err(ServiceError::EscrowIneligible(format!(
                "provider {} needs verification level {}",
                quote.provider_id, self.policy.min_provider_level
            )));
        }

        if let Some(client) = self.store.get_verification_record(quote.client_id).await? {
            if client.is_suspended {
                return Err(ServiceError::EscrowIneligible(format!(
                    "client {} is suspended",
                    quote.client_id
                )));
            }
        }
        Ok(())
    }

    /// Open the escrow for an accepted quote. Calling it again for the same
    /// quote returns the row created the first time.
    pub async fn create_transaction(
        &self,
        quote_id: Uuid,
        actor: Actor,
    ) -> Result<EscrowTransaction, ServiceError> {
        let quote = self
            .store
            .get_service_quote(quote_id)
            .await?
            .ok_or(ServiceError::QuoteNotFound(quote_id))?;

        if let Actor::User(user_id) = actor {
            if user_id != quote.client_id {
                return Err(ServiceError::NotTransactionParty(user_id, quote_id));
            }
        }
        if quote.status != QuoteStatus::Accepted {
            return Err(ServiceError::QuoteNotAccepted(quote_id));
        }
        if quote.amount_xaf <= 0 {
            return Err(ServiceError::Validation(
                "Quote amount must be positive".to_string(),
            ));
        }

        self.ensure_escrow_eligible(&quote).await?;

        let now = self.clock.now();
        let period = commission_period(now);
        let tier = self.commission.tier_for(quote.provider_id).await?;
        let commission = self
            .commission
            .resolve(quote.amount_xaf, &quote.country_code, tier, quote.provider_id, &period)
            .await?;

        let new = NewEscrowTransaction {
            quote_id,
            client_id: quote.client_id,
            provider_id: quote.provider_id,
            amount_xaf: quote.amount_xaf,
            commission_rate: commission.commission_percent,
            raw_commission_xaf: commission.raw_commission_xaf,
            monthly_cap_xaf: commission.monthly_cap_xaf,
            commission_period: period,
        };

        match self.store.create_escrow_transaction(new, now).await? {
            CreateEscrowOutcome::Created(transaction) => {
                tracing::info!(
                    "Escrow {} opened for quote {}: {} gross, {} commission, {} net",
                    transaction.id,
                    quote_id,
                    transaction.amount_xaf,
                    transaction.commission_xaf,
                    transaction.net_amount_xaf
                );

                self.audit
                    .log_audit_event(
                        actor.id(),
                        "escrow_created",
                        Some(transaction.id),
                        Some(transaction.provider_id),
                        Some(serde_json::json!({
                            "quote_id": quote_id,
                            "amount_xaf": transaction.amount_xaf,
                            "commission_xaf": transaction.commission_xaf,
                            "net_amount_xaf": transaction.net_amount_xaf,
                            "commission_period": transaction.commission_period,
                        })),
                        format!("Escrow opened for {}", format_xaf(transaction.amount_xaf)),
                    )
                    .await;

                Ok(transaction)
            }
            CreateEscrowOutcome::Existing(transaction) => {
                tracing::debug!("Quote {} already has escrow {}", quote_id, transaction.id);
                Ok(transaction)
            }
        }
    }

    /// Confirm the client's payment and start the auto-release clock.
    /// Funding again with the same reference returns the row unchanged.
    pub async fn fund(
        &self,
        transaction_id: Uuid,
        payment_reference: String,
        actor: Actor,
    ) -> Result<EscrowTransaction, ServiceError> {
        let payment_reference = required(payment_reference, "payment_reference")?;
        let transaction = self.get_transaction(transaction_id).await?;

        if let Actor::User(user_id) = actor {
            if user_id != transaction.client_id {
                return Err(ServiceError::NotTransactionParty(user_id, transaction_id));
            }
        }
        if transaction.status != EscrowStatus::Pending {
            if transaction.payment_reference.as_deref() == Some(payment_reference.as_str()) {
                return Ok(transaction);
            }
            return Err(transition_error(&transaction, "fund"));
        }

        let confirmation = with_timeout(
            PAYMENTS,
            self.dependency_timeout,
            self.payments.confirm_funding(&payment_reference),
        )
        .await?;

        match confirmation {
            FundingConfirmation::Declined { reason } => {
                tracing::warn!("Funding of {} declined: {}", transaction_id, reason);
                return Err(ServiceError::PaymentDeclined(reason));
            }
            FundingConfirmation::Confirmed { amount_xaf } if amount_xaf != transaction.amount_xaf => {
                tracing::warn!(
                    "Funding of {} confirmed {} XAF, expected {}",
                    transaction_id,
                    amount_xaf,
                    transaction.amount_xaf
                );
                return Err(ServiceError::PaymentDeclined(format!(
                    "paid {} but the escrow holds {}",
                    format_xaf(amount_xaf),
                    format_xaf(transaction.amount_xaf)
                )));
            }
            FundingConfirmation::Confirmed { .. } => {}
        }

        let now = self.clock.now();
        let auto_release_at = now + self.policy.auto_release_window;
        let funded = match self
            .store
            .mark_escrow_funded(transaction_id, &payment_reference, now, auto_release_at)
            .await?
        {
            FundingOutcome::Transition(TransitionOutcome::Applied(funded)) => funded,
            FundingOutcome::Transition(TransitionOutcome::Rejected(current)) => {
                if current.payment_reference.as_deref() == Some(payment_reference.as_str()) {
                    return Ok(current);
                }
                return Err(transition_error(&current, "fund"));
            }
            FundingOutcome::Transition(TransitionOutcome::NotFound) => {
                return Err(ServiceError::TransactionNotFound(transaction_id))
            }
            FundingOutcome::ReferenceInUse(holder) => {
                tracing::warn!(
                    "Payment reference {} for {} already funds {}",
                    payment_reference,
                    transaction_id,
                    holder
                );
                return Err(ServiceError::PaymentReferenceInUse(payment_reference, holder));
            }
        };

        tracing::info!(
            "Escrow {} funded, auto-release at {}",
            transaction_id,
            auto_release_at
        );

        self.audit
            .log_audit_event(
                actor.id(),
                "escrow_funded",
                Some(transaction_id),
                Some(funded.provider_id),
                Some(serde_json::json!({
                    "payment_reference": payment_reference,
                    "auto_release_at": auto_release_at,
                })),
                format!("Escrow funded with {}", format_xaf(funded.amount_xaf)),
            )
            .await;

        deliver(
            self.notifier.as_ref(),
            Notice::new(
                funded.provider_id,
                NotificationEvent::TransactionFunded,
                Some(transaction_id),
                serde_json::json!({
                    "amount_xaf": funded.amount_xaf,
                    "auto_release_at": auto_release_at,
                }),
                format!("{} is held in escrow for your service", format_xaf(funded.amount_xaf)),
            ),
        )
        .await;

        Ok(funded)
    }

    /// Client confirms delivery (or an admin acts for them).
    pub async fn release(&self, transaction_id: Uuid, actor: Actor) -> Result<ReleaseReceipt, ServiceError> {
        let transaction = self.get_transaction(transaction_id).await?;
        if let Actor::User(user_id) = actor {
            if user_id != transaction.client_id {
                return Err(ServiceError::Forbidden(
                    "Only the client can release an escrow".to_string(),
                ));
            }
        }
        self.apply_release(transaction_id, actor, true, "release").await
    }

    async fn apply_release(
        &self,
        transaction_id: Uuid,
        actor: Actor,
        allow_disputed: bool,
        action: &'static str,
    ) -> Result<ReleaseReceipt, ServiceError> {
        match self
            .store
            .release_escrow(transaction_id, allow_disputed, self.clock.now())
            .await?
        {
            TransitionOutcome::Applied((transaction, payout)) => {
                self.after_release(&transaction, &payout, actor).await;
                Ok(ReleaseReceipt { transaction, payout })
            }
            TransitionOutcome::Rejected(current) => Err(transition_error(&current, action)),
            TransitionOutcome::NotFound => Err(ServiceError::TransactionNotFound(transaction_id)),
        }
    }

    async fn after_release(&self, transaction: &EscrowTransaction, payout: &ProviderPayout, actor: Actor) {
        tracing::info!(
            "Escrow {} released, payout {} of {} XAF queued",
            transaction.id,
            payout.id,
            payout.amount_xaf
        );

        self.audit
            .log_audit_event(
                actor.id(),
                "escrow_released",
                Some(transaction.id),
                Some(transaction.provider_id),
                Some(serde_json::json!({
                    "payout_id": payout.id,
                    "net_amount_xaf": payout.amount_xaf,
                    "automatic": actor == Actor::System,
                })),
                format!("Escrow released, {} owed to provider", format_xaf(payout.amount_xaf)),
            )
            .await;

        deliver(
            self.notifier.as_ref(),
            Notice::new(
                transaction.provider_id,
                NotificationEvent::TransactionReleased,
                Some(transaction.id),
                serde_json::json!({ "payout_id": payout.id, "amount_xaf": payout.amount_xaf }),
                format!("{} has been released to you", format_xaf(payout.amount_xaf)),
            ),
        )
        .await;

        if let Err(e) = self
            .trust
            .recompute(transaction.provider_id, TrustTrigger::TransactionReleased)
            .await
        {
            tracing::error!("Trust recompute after release of {} failed: {}", transaction.id, e);
        }
    }

    /// Provider cancels (or an admin refunds). Counts as a cancellation
    /// against the provider and hands the commission back.
    pub async fn refund(
        &self,
        transaction_id: Uuid,
        actor: Actor,
        reason: String,
    ) -> Result<EscrowTransaction, ServiceError> {
        let reason = required(reason, "A refund reason")?;
        let transaction = self.get_transaction(transaction_id).await?;
        if let Actor::User(user_id) = actor {
            if user_id != transaction.provider_id {
                return Err(ServiceError::Forbidden(
                    "Only the provider can refund an escrow".to_string(),
                ));
            }
        }
        self.apply_refund(transaction_id, actor, &reason, "refund").await
    }

    async fn apply_refund(
        &self,
        transaction_id: Uuid,
        actor: Actor,
        reason: &str,
        action: &'static str,
    ) -> Result<EscrowTransaction, ServiceError> {
        let refunded = match self
            .store
            .refund_escrow(transaction_id, reason, self.clock.now())
            .await?
        {
            TransitionOutcome::Applied(refunded) => refunded,
            TransitionOutcome::Rejected(current) => return Err(transition_error(&current, action)),
            TransitionOutcome::NotFound => {
                return Err(ServiceError::TransactionNotFound(transaction_id))
            }
        };

        tracing::info!("Escrow {} refunded: {}", transaction_id, reason);

        self.audit
            .log_audit_event(
                actor.id(),
                "escrow_refunded",
                Some(transaction_id),
                Some(refunded.provider_id),
                Some(serde_json::json!({
                    "amount_xaf": refunded.amount_xaf,
                    "commission_returned_xaf": refunded.commission_xaf,
                })),
                reason.to_string(),
            )
            .await;

        deliver(
            self.notifier.as_ref(),
            Notice::new(
                refunded.client_id,
                NotificationEvent::TransactionRefunded,
                Some(transaction_id),
                serde_json::json!({ "amount_xaf": refunded.amount_xaf, "reason": reason }),
                format!("{} has been refunded to you", format_xaf(refunded.amount_xaf)),
            ),
        )
        .await;

        if let Err(e) = self
            .trust
            .recompute(refunded.provider_id, TrustTrigger::TransactionRefunded)
            .await
        {
            tracing::error!("Trust recompute after refund of {} failed: {}", transaction_id, e);
        }

        Ok(refunded)
    }

    /// Freeze a funded escrow until an admin resolves it.
    pub async fn raise_dispute(
        &self,
        transaction_id: Uuid,
        actor_id: Uuid,
        reason: String,
    ) -> Result<EscrowTransaction, ServiceError> {
        let reason = required(reason, "A dispute reason")?;
        let transaction = self.get_transaction(transaction_id).await?;
        if !transaction.is_party(actor_id) {
            return Err(ServiceError::NotTransactionParty(actor_id, transaction_id));
        }

        let disputed = match self
            .store
            .mark_escrow_disputed(transaction_id, actor_id, &reason, self.clock.now())
            .await?
        {
            TransitionOutcome::Applied(disputed) => disputed,
            TransitionOutcome::Rejected(current) if current.status == EscrowStatus::Disputed => {
                return Ok(current)
            }
            TransitionOutcome::Rejected(current) => {
                return Err(transition_error(&current, "dispute"))
            }
            TransitionOutcome::NotFound => {
                return Err(ServiceError::TransactionNotFound(transaction_id))
            }
        };

        tracing::warn!("Escrow {} disputed by {}", transaction_id, actor_id);

        self.audit
            .log_audit_event(
                actor_id,
                "escrow_disputed",
                Some(transaction_id),
                Some(disputed.provider_id),
                None,
                reason.clone(),
            )
            .await;

        let counterpart = if actor_id == disputed.client_id {
            disputed.provider_id
        } else {
            disputed.client_id
        };
        deliver(
            self.notifier.as_ref(),
            Notice::new(
                counterpart,
                NotificationEvent::TransactionDisputed,
                Some(transaction_id),
                serde_json::json!({ "reason": reason }),
                "A dispute was opened on your transaction",
            ),
        )
        .await;

        Ok(disputed)
    }

    pub async fn resolve_dispute(
        &self,
        transaction_id: Uuid,
        admin_id: Uuid,
        resolution: DisputeResolution,
        note: String,
    ) -> Result<EscrowTransaction, ServiceError> {
        let note = required(note, "A resolution note")?;
        let transaction = self.get_transaction(transaction_id).await?;
        if transaction.status != EscrowStatus::Disputed {
            return Err(transition_error(&transaction, "resolve_dispute"));
        }

        let resolved = match resolution {
            DisputeResolution::Release => {
                self.apply_release(transaction_id, Actor::Admin(admin_id), true, "resolve_dispute")
                    .await?
                    .transaction
            }
            DisputeResolution::Refund => {
                self.apply_refund(transaction_id, Actor::Admin(admin_id), &note, "resolve_dispute")
                    .await?
            }
        };

        self.audit
            .log_audit_event(
                admin_id,
                "dispute_resolved",
                Some(transaction_id),
                Some(resolved.provider_id),
                Some(serde_json::json!({ "resolution": resolution })),
                note,
            )
            .await;

        Ok(resolved)
    }

    /// Release every funded escrow whose window has passed. Each row is
    /// released under a `funded` guard, so a row disputed or released after
    /// being listed is skipped, and running the sweep twice releases nothing
    /// new.
    pub async fn auto_release(&self) -> Result<SweepReport, ServiceError> {
        let now = self.clock.now();
        let candidates = self
            .store
            .list_auto_release_candidates(now, self.policy.sweep_batch_size)
            .await?;

        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };

        for transaction_id in candidates {
            match self.store.release_escrow(transaction_id, false, now).await {
                Ok(TransitionOutcome::Applied((transaction, payout))) => {
                    self.after_release(&transaction, &payout, Actor::System).await;
                    report.released += 1;
                }
                Ok(TransitionOutcome::Rejected(_)) | Ok(TransitionOutcome::NotFound) => {
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!("Auto-release of {} failed: {}", transaction_id, e);
                    report.failed += 1;
                }
            }
        }

        if report.candidates > 0 {
            tracing::info!(
                "Auto-release sweep: {} candidates, {} released, {} skipped, {} failed",
                report.candidates,
                report.released,
                report.skipped,
                report.failed
            );
        }
        Ok(report)
    }

    /// Admin records the outcome of paying a provider out.
    pub async fn settle_payout(
        &self,
        payout_id: Uuid,
        outcome: PayoutOutcome,
        admin_id: Uuid,
    ) -> Result<ProviderPayout, ServiceError> {
        let (status, external_reference, failure_reason) = match outcome {
            PayoutOutcome::Completed { external_reference } => (
                PayoutStatus::Completed,
                Some(required(external_reference, "external_reference")?),
                None,
            ),
            PayoutOutcome::Failed { reason } => {
                (PayoutStatus::Failed, None, Some(required(reason, "A failure reason")?))
            }
        };

        let payout = self
            .store
            .get_payout(payout_id)
            .await?
            .ok_or(ServiceError::PayoutNotFound(payout_id))?;
        if payout.status != PayoutStatus::Pending {
            return Err(ServiceError::PayoutAlreadySettled(payout_id, payout.status));
        }

        let settled = match self
            .store
            .settle_payout(
                payout_id,
                status,
                external_reference,
                failure_reason,
                admin_id,
                self.clock.now(),
            )
            .await?
        {
            Some(settled) => settled,
            None => {
                let current = self
                    .store
                    .get_payout(payout_id)
                    .await?
                    .ok_or(ServiceError::PayoutNotFound(payout_id))?;
                return Err(ServiceError::PayoutAlreadySettled(payout_id, current.status));
            }
        };

        tracing::info!("Payout {} settled as {:?}", payout_id, settled.status);

        self.audit
            .log_audit_event(
                admin_id,
                "payout_settled",
                Some(payout_id),
                Some(settled.provider_id),
                Some(serde_json::json!({
                    "transaction_id": settled.transaction_id,
                    "status": settled.status,
                    "external_reference": settled.external_reference,
                    "failure_reason": settled.failure_reason,
                })),
                format!("Payout of {} settled", format_xaf(settled.amount_xaf)),
            )
            .await;

        deliver(
            self.notifier.as_ref(),
            Notice::new(
                settled.provider_id,
                NotificationEvent::PayoutSettled,
                Some(payout_id),
                serde_json::json!({ "status": settled.status, "amount_xaf": settled.amount_xaf }),
                match settled.status {
                    PayoutStatus::Completed => {
                        format!("{} has been paid out to you", format_xaf(settled.amount_xaf))
                    }
                    _ => "Your payout could not be completed, support will contact you".to_string(),
                },
            ),
        )
        .await;

        Ok(settled)
    }
}
