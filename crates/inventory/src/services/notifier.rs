//! Fire-and-forget notifications about order progress.

use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// A customer cart was committed.
    OrderPlaced,
    /// An order moved to a new status.
    StatusChanged { status: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: UserId,
    pub order: OrderId,
    pub kind: NotificationKind,
}

/// Delivery channel for notifications. Failures are the implementor's concern.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) {
        tracing::info!(
            recipient = %notification.recipient,
            order_id = %notification.order,
            kind = ?notification.kind,
            "notification"
        );
    }
}

/// Records notifications for assertions in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: Notification) {
        self.sent.write().await.push(notification);
    }
}
