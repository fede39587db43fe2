// models/auditmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub event_type: String,
    pub subject_id: Option<Uuid>,
    pub related_user_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub actor_id: Uuid,
    pub event_type: String,
    pub subject_id: Option<Uuid>,
    pub related_user_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: String,
    pub subject_id: Option<Uuid>,
    pub payload: Option<serde_json::Value>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
