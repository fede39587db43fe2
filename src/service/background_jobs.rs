// service/background_jobs.rs
use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::service::{escrow_service::EscrowService, verification_service::VerificationService};

/// Release funded escrows whose auto-release window has passed.
pub async fn start_auto_release_job(escrow: Arc<EscrowService>, every: Duration) {
    let mut interval = interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        tracing::debug!("Running auto-release sweep");

        match escrow.auto_release().await {
            Ok(report) if report.failed > 0 => tracing::warn!(
                "Auto-release sweep finished with {} failed rows",
                report.failed
            ),
            Ok(_) => {}
            Err(e) => tracing::error!("Auto-release sweep failed: {}", e),
        }
    }
}

/// Expire verification submissions nobody reviewed in time.
pub async fn start_expiry_job(verification: Arc<VerificationService>, every: Duration) {
    let mut interval = interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        tracing::debug!("Running verification expiry sweep");

        if let Err(e) = verification.expire_stale_submissions().await {
            tracing::error!("Verification expiry sweep failed: {}", e);
        }
    }
}
