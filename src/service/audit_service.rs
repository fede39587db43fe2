// service/audit_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::TrustStore,
    models::auditmodels::{AuditLog, NewAuditLog},
    service::error::ServiceError,
    utils::clock::Clock,
};

#[derive(Debug, Clone)]
pub struct AuditService {
    store: Arc<dyn TrustStore>,
    clock: Arc<dyn Clock>,
}

impl AuditService {
    pub fn new(store: Arc<dyn TrustStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append an audit row. The state change it describes has already been
    /// committed and carries its actor, so a failed write is logged and
    /// swallowed.
    pub async fn log_audit_event(
        &self,
        actor_id: Uuid,
        event_type: &str,
        subject_id: Option<Uuid>,
        related_user_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
        description: String,
    ) {
        let entry = NewAuditLog {
            actor_id,
            event_type: event_type.to_string(),
            subject_id,
            related_user_id,
            metadata,
            description,
        };

        if let Err(e) = self.store.insert_audit_log(entry, self.clock.now()).await {
            tracing::error!(
                "Failed to write audit log {} for subject {:?} by {}: {}",
                event_type,
                subject_id,
                actor_id,
                e
            );
        }
    }

    pub async fn get_audit_trail(
        &self,
        subject_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, ServiceError> {
        Ok(self
            .store
            .get_audit_logs_for_subject(subject_id, limit, offset)
            .await?)
    }
}
