// service/error.rs
use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    models::{
        escrowmodels::{EscrowStatus, PayoutStatus, SubscriptionTier},
        verificationmodels::{AccountKind, DocumentStatus, EligibleAt},
    },
};

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Sequence,
    ConcurrencyConflict,
    DependencyFailure,
    NotFound,
    Forbidden,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Verification record not found for account {0}")]
    RecordNotFound(Uuid),

    #[error("Verification document {0} not found")]
    DocumentNotFound(Uuid),

    #[error("Escrow transaction {0} not found")]
    TransactionNotFound(Uuid),

    #[error("Service quote {0} not found")]
    QuoteNotFound(Uuid),

    #[error("Payout {0} not found")]
    PayoutNotFound(Uuid),

    #[error("Report {0} not found")]
    ReportNotFound(Uuid),

    #[error("Level {0} does not exist")]
    InvalidLevel(i16),

    #[error("Cannot start level {requested} while working on level {current}")]
    InvalidLevelOrder { requested: i16, current: i16 },

    #[error("Level {level} is not requestable yet ({eligible_at:?})")]
    LevelNotEligible { level: i16, eligible_at: EligibleAt },

    #[error("Level {0} is already approved")]
    LevelAlreadyApproved(i16),

    #[error("Level {level} is not available to {kind:?} accounts")]
    LevelNotAvailable { level: i16, kind: AccountKind },

    #[error("Level {0} has no pending submission")]
    LevelNotPending(i16),

    #[error("Document {0} was already decided as {1:?}")]
    DocumentAlreadyDecided(Uuid, DocumentStatus),

    #[error("Accounts cannot vote on themselves")]
    SelfVote,

    #[error("Suspended account {0} cannot vote")]
    VoterSuspended(Uuid),

    #[error("Vote limit of {0} per day reached")]
    RateLimited(i64),

    #[error("Report {0} was already resolved")]
    ReportAlreadyResolved(Uuid),

    #[error("Account {0} is not suspended")]
    NotSuspended(Uuid),

    #[error("Escrow not allowed: {0}")]
    EscrowIneligible(String),

    #[error("Quote {0} has not been accepted")]
    QuoteNotAccepted(Uuid),

    #[error("Cannot {action} transaction {id} in status {from:?}")]
    InvalidEscrowTransition {
        id: Uuid,
        from: EscrowStatus,
        action: &'static str,
    },

    #[error("Transaction {0} is already {1:?}")]
    AlreadyTerminal(Uuid, EscrowStatus),

    #[error("User {0} is not a party to transaction {1}")]
    NotTransactionParty(Uuid, Uuid),

    #[error("{0}")]
    Forbidden(String),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Payment reference {0} already funds transaction {1}")]
    PaymentReferenceInUse(String, Uuid),

    #[error("Payout {0} is already {1:?}")]
    PayoutAlreadySettled(Uuid, PayoutStatus),

    #[error("No commission rule for {country_code}/{tier:?} at {amount_xaf} XAF")]
    CommissionRuleMissing {
        country_code: String,
        tier: SubscriptionTier,
        amount_xaf: i64,
    },

    #[error("{matches} commission rules match {country_code}/{tier:?} at {amount_xaf} XAF")]
    CommissionRuleAmbiguous {
        country_code: String,
        tier: SubscriptionTier,
        amount_xaf: i64,
        matches: usize,
    },

    #[error("Concurrent update on {0}, retry the request")]
    ConcurrencyConflict(String),

    #[error("{dependency} unavailable: {message}")]
    DependencyFailure {
        dependency: &'static str,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ServiceError {
    pub fn dependency(dependency: &'static str, message: impl Into<String>) -> Self {
        ServiceError::DependencyFailure {
            dependency,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::RecordNotFound(_)
            | ServiceError::DocumentNotFound(_)
            | ServiceError::TransactionNotFound(_)
            | ServiceError::QuoteNotFound(_)
            | ServiceError::PayoutNotFound(_)
            | ServiceError::ReportNotFound(_) => ErrorKind::NotFound,

            ServiceError::InvalidLevel(_)
            | ServiceError::SelfVote
            | ServiceError::RateLimited(_)
            | ServiceError::PaymentDeclined(_)
            | ServiceError::Validation(_) => ErrorKind::Validation,

            ServiceError::InvalidLevelOrder { .. }
            | ServiceError::LevelNotEligible { .. }
            | ServiceError::LevelAlreadyApproved(_)
            | ServiceError::LevelNotPending(_)
            | ServiceError::DocumentAlreadyDecided(_, _)
            | ServiceError::ReportAlreadyResolved(_)
            | ServiceError::NotSuspended(_)
            | ServiceError::QuoteNotAccepted(_)
            | ServiceError::InvalidEscrowTransition { .. }
            | ServiceError::AlreadyTerminal(_, _)
            | ServiceError::PaymentReferenceInUse(_, _)
            | ServiceError::PayoutAlreadySettled(_, _) => ErrorKind::Sequence,

            ServiceError::LevelNotAvailable { .. }
            | ServiceError::VoterSuspended(_)
            | ServiceError::EscrowIneligible(_)
            | ServiceError::NotTransactionParty(_, _)
            | ServiceError::Forbidden(_) => ErrorKind::Forbidden,

            ServiceError::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,

            ServiceError::DependencyFailure { .. } => ErrorKind::DependencyFailure,

            ServiceError::CommissionRuleMissing { .. }
            | ServiceError::CommissionRuleAmbiguous { .. }
            | ServiceError::Database(_)
            | ServiceError::Other(_) => ErrorKind::Internal,
        }
    }

    /// The same call may succeed if repeated unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConcurrencyConflict | ErrorKind::DependencyFailure
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            _ => match self.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Sequence | ErrorKind::ConcurrencyConflict => StatusCode::CONFLICT,
                ErrorKind::DependencyFailure => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match error.kind() {
            // Store errors are logged, never echoed back.
            ErrorKind::Internal => {
                tracing::error!("Internal service error: {}", error);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
            ErrorKind::ConcurrencyConflict => HttpError::conflict(error.to_string()),
            ErrorKind::DependencyFailure => HttpError::service_unavailable(error.to_string()),
            _ => HttpError::new(error.to_string(), error.status_code()),
        }
    }
}
