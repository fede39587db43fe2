// db/auditdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::db::DBClient;

use crate::models::auditmodels::{AuditLog, NewAuditLog, Notification};

#[async_trait]
pub trait AuditExt: Send + Sync {
    async fn insert_audit_log(
        &self,
        entry: NewAuditLog,
        at: DateTime<Utc>,
    ) -> Result<AuditLog, sqlx::Error>;

    async fn get_audit_logs_for_subject(
        &self,
        subject_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, sqlx::Error>;

    async fn store_notification(
        &self,
        user_id: Uuid,
        event_type: &str,
        subject_id: Option<Uuid>,
        payload: Option<serde_json::Value>,
        message: String,
        at: DateTime<Utc>,
    ) -> Result<Notification, sqlx::Error>;

    async fn get_notifications_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Notification>, sqlx::Error>;
}

#[async_trait]
impl AuditExt for DBClient {
    async fn insert_audit_log(
        &self,
        entry: NewAuditLog,
        at: DateTime<Utc>,
    ) -> Result<AuditLog, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs
                (id, actor_id, event_type, subject_id, related_user_id, metadata, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, actor_id, event_type, subject_id, related_user_id, metadata, description, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.actor_id)
        .bind(entry.event_type)
        .bind(entry.subject_id)
        .bind(entry.related_user_id)
        .bind(entry.metadata)
        .bind(entry.description)
        .bind(at)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_audit_logs_for_subject(
        &self,
        subject_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT id, actor_id, event_type, subject_id, related_user_id, metadata, description, created_at
            FROM audit_logs
            WHERE subject_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(subject_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
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
        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, user_id, event_type, subject_id, payload, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, event_type, subject_id, payload, message, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(event_type)
        .bind(subject_id)
        .bind(payload)
        .bind(message)
        .bind(at)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_notifications_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, event_type, subject_id, payload, message, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
