use std::collections::HashMap;

use async_trait::async_trait;
use sentinel_core::{ApprovalId, NotificationId, TenantId};
use tokio::sync::RwLock;

use crate::error::NotifyError;
use crate::notification::{ApprovalRequest, Notification};

/// Storage seam for the notification queue and approval table. The
/// in-memory default mirrors `arbiter::escalation::approval::ApprovalWorkflow`'s
/// `parking_lot::RwLock<HashMap<..>>`, swapped for `tokio::sync::RwLock`
/// to match this workspace's async-everywhere convention.
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn insert_notification(&self, notification: Notification) -> Result<(), NotifyError>;
    async fn get_notification(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, NotifyError>;
    async fn update_notification(&self, notification: Notification) -> Result<(), NotifyError>;
    async fn list_pending(
        &self,
        tenant_id: Option<TenantId>,
        limit: usize,
    ) -> Result<Vec<Notification>, NotifyError>;

    async fn insert_approval(&self, approval: ApprovalRequest) -> Result<(), NotifyError>;
    async fn get_approval(&self, id: ApprovalId) -> Result<Option<ApprovalRequest>, NotifyError>;
    async fn update_approval(&self, approval: ApprovalRequest) -> Result<(), NotifyError>;
    async fn pending_approvals(&self) -> Result<Vec<ApprovalRequest>, NotifyError>;
}

#[derive(Default)]
pub struct InMemoryNotificationBackend {
    notifications: RwLock<HashMap<NotificationId, Notification>>,
    approvals: RwLock<HashMap<ApprovalId, ApprovalRequest>>,
}

impl InMemoryNotificationBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationBackend for InMemoryNotificationBackend {
    async fn insert_notification(&self, notification: Notification) -> Result<(), NotifyError> {
        self.notifications
            .write()
            .await
            .insert(notification.notification_id, notification);
        Ok(())
    }

    async fn get_notification(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, NotifyError> {
        Ok(self.notifications.read().await.get(&id).cloned())
    }

    async fn update_notification(&self, notification: Notification) -> Result<(), NotifyError> {
        self.notifications
            .write()
            .await
            .insert(notification.notification_id, notification);
        Ok(())
    }

    async fn list_pending(
        &self,
        tenant_id: Option<TenantId>,
        limit: usize,
    ) -> Result<Vec<Notification>, NotifyError> {
        let guard = self.notifications.read().await;
        let mut pending: Vec<Notification> = guard
            .values()
            .filter(|n| n.status == crate::notification::NotificationStatus::Pending)
            .filter(|n| tenant_id.map(|t| n.tenant_id == Some(t)).unwrap_or(true))
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn insert_approval(&self, approval: ApprovalRequest) -> Result<(), NotifyError> {
        self.approvals
            .write()
            .await
            .insert(approval.approval_id, approval);
        Ok(())
    }

    async fn get_approval(&self, id: ApprovalId) -> Result<Option<ApprovalRequest>, NotifyError> {
        Ok(self.approvals.read().await.get(&id).cloned())
    }

    async fn update_approval(&self, approval: ApprovalRequest) -> Result<(), NotifyError> {
        self.approvals
            .write()
            .await
            .insert(approval.approval_id, approval);
        Ok(())
    }

    async fn pending_approvals(&self) -> Result<Vec<ApprovalRequest>, NotifyError> {
        Ok(self
            .approvals
            .read()
            .await
            .values()
            .filter(|a| a.status == crate::notification::ApprovalStatus::Pending)
            .cloned()
            .collect())
    }
}
