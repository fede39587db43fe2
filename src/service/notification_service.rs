// service/notification_service.rs
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::TrustStore,
    models::auditmodels::Notification,
    service::error::ServiceError,
    utils::clock::Clock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    LevelApproved,
    DocumentRejected,
    LevelRejected,
    AccountSuspended,
    SuspensionLifted,
    TransactionFunded,
    TransactionReleased,
    TransactionRefunded,
    TransactionDisputed,
    PayoutSettled,
    BadgeAwarded,
}

impl NotificationEvent {
    pub fn to_str(&self) -> &'static str {
        match self {
            NotificationEvent::LevelApproved => "level_approved",
            NotificationEvent::DocumentRejected => "document_rejected",
            NotificationEvent::LevelRejected => "level_rejected",
            NotificationEvent::AccountSuspended => "account_suspended",
            NotificationEvent::SuspensionLifted => "suspension_lifted",
            NotificationEvent::TransactionFunded => "transaction_funded",
            NotificationEvent::TransactionReleased => "transaction_released",
            NotificationEvent::TransactionRefunded => "transaction_refunded",
            NotificationEvent::TransactionDisputed => "transaction_disputed",
            NotificationEvent::PayoutSettled => "payout_settled",
            NotificationEvent::BadgeAwarded => "badge_awarded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub user_id: Uuid,
    pub event: NotificationEvent,
    pub subject_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub message: String,
}

impl Notice {
    pub fn new(
        user_id: Uuid,
        event: NotificationEvent,
        subject_id: Option<Uuid>,
        payload: serde_json::Value,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            event,
            subject_id,
            payload,
            message: message.into(),
        }
    }
}

/// Outbound channel for user-facing events (email, SMS, push all sit behind
/// this).
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    async fn notify(&self, notice: Notice) -> Result<(), ServiceError>;
}

/// Fire-and-forget delivery. State has already been committed when this runs,
/// so failures are only logged.
pub async fn deliver(notifier: &dyn Notifier, notice: Notice) {
    let event = notice.event;
    let user_id = notice.user_id;
    if let Err(e) = notifier.notify(notice).await {
        tracing::warn!(
            "Notification {} for user {} was not delivered: {}",
            event.to_str(),
            user_id,
            e
        );
    }
}

/// Keeps an inbox copy of every event and logs it for the delivery workers.
#[derive(Debug, Clone)]
pub struct NotificationService {
    store: Arc<dyn TrustStore>,
    clock: Arc<dyn Clock>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn TrustStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn get_user_notifications(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Notification>, ServiceError> {
        Ok(self.store.get_notifications_for_user(user_id, limit).await?)
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn notify(&self, notice: Notice) -> Result<(), ServiceError> {
        tracing::info!(
            "Notification {} -> user {}: {}",
            notice.event.to_str(),
            notice.user_id,
            notice.message
        );

        self.store
            .store_notification(
                notice.user_id,
                notice.event.to_str(),
                notice.subject_id,
                Some(notice.payload),
                notice.message,
                self.clock.now(),
            )
            .await?;

        Ok(())
    }
}
