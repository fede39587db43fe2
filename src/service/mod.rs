pub mod audit_service;
pub mod background_jobs;
pub mod commission_service;
pub mod document_storage;
pub mod error;
pub mod escrow_service;
pub mod notification_service;
pub mod payment_provider;
pub mod reputation_service;
pub mod trust_service;
pub mod verification_service;

use std::{future::Future, time::Duration};

use uuid::Uuid;

use self::error::ServiceError;

/// Bound on optimistic retries against a verification record.
pub(crate) const MAX_SAVE_ATTEMPTS: usize = 3;

/// Actor recorded for jobs the platform runs on its own (sweeps, automatic
/// suspension).
pub const SYSTEM_ACTOR: Uuid = Uuid::nil();

/// Run a collaborator call with a deadline. An elapsed deadline is reported as
/// a dependency failure.
pub(crate) async fn with_timeout<T, F>(
    dependency: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} did not answer within {:?}", dependency, limit);
            Err(ServiceError::dependency(
                dependency,
                format!("no response within {:?}", limit),
            ))
        }
    }
}
