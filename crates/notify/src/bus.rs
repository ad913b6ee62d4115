//! The Approval & Notification Bus (spec §4.6).
//!
//! Grounded on `arbiter::escalation::approval::ApprovalWorkflow`
//! (request/approve/reject/expire over a lock-guarded map) and
//! `arbiter::escalation::webhook::WebhookNotifier` (per-channel,
//! fire-and-forget delivery). The teacher's webhook notifier calls
//! channels synchronously from the request path; this design elevates
//! delivery to a persistent, bounded-retry background worker per spec
//! §4.6 ("never blocks the caller on channel delivery") and per DESIGN
//! NOTES §9 ("Admin notification fire-and-forget... elevates the
//! Notification Bus to a first-class component with a persistent queue").

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sentinel_core::{
    AgentId, ApprovalId, NotificationChannelSeverities, NotificationId, RecommendedAction,
    RiskLevel, SharedClock, SystemAction, TenantId,
};
use tokio::sync::mpsc;

use crate::backend::{InMemoryNotificationBackend, NotificationBackend};
use crate::channel::{ChannelKind, NotificationChannel};
use crate::error::NotifyError;
use crate::notification::{
    ApprovalAction, ApprovalRequest, ApprovalStatus, Notification, NotificationDecision,
    NotificationStatus,
};

const DELIVERY_QUEUE_CAPACITY: usize = 4096;
const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Everything needed to enqueue a `Notification`, before it is assigned an
/// id and timestamp -- mirrors `sentinel_audit::ActivityDraft`'s
/// builder shape.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub tenant_id: Option<TenantId>,
    pub risk_level: RiskLevel,
    pub title: String,
    pub description: String,
    pub agent_id: Option<AgentId>,
    pub activity_id: Option<sentinel_core::ActivityId>,
    pub recommended_actions: Vec<RecommendedAction>,
    pub system_action_taken: SystemAction,
}

impl NotificationDraft {
    pub fn new(risk_level: RiskLevel, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            risk_level,
            title: title.into(),
            description: description.into(),
            agent_id: None,
            activity_id: None,
            recommended_actions: Vec::new(),
            system_action_taken: SystemAction::None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn with_activity(mut self, activity_id: sentinel_core::ActivityId) -> Self {
        self.activity_id = Some(activity_id);
        self
    }

    pub fn with_recommended_actions(mut self, actions: Vec<RecommendedAction>) -> Self {
        self.recommended_actions = actions;
        self
    }

    pub fn with_system_action(mut self, action: SystemAction) -> Self {
        self.system_action_taken = action;
        self
    }
}

fn channel_min_severity(kind: ChannelKind, severities: &NotificationChannelSeverities) -> RiskLevel {
    match kind {
        ChannelKind::Email => severities.email,
        ChannelKind::Slack => severities.slack,
        ChannelKind::Pager => severities.pager,
    }
}

pub struct NotificationBus {
    backend: Arc<dyn NotificationBackend>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    severities: NotificationChannelSeverities,
    clock: SharedClock,
    delivery_tx: mpsc::Sender<Notification>,
}

impl NotificationBus {
    pub fn new(
        backend: Arc<dyn NotificationBackend>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        severities: NotificationChannelSeverities,
        clock: SharedClock,
    ) -> Self {
        let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_QUEUE_CAPACITY);
        tokio::spawn(delivery_worker(delivery_rx, channels.clone(), severities.clone()));
        Self {
            backend,
            channels,
            severities,
            clock,
            delivery_tx,
        }
    }

    pub fn in_memory(
        channels: Vec<Arc<dyn NotificationChannel>>,
        severities: NotificationChannelSeverities,
        clock: SharedClock,
    ) -> Self {
        Self::new(Arc::new(InMemoryNotificationBackend::new()), channels, severities, clock)
    }

    /// Enqueue a notification and hand it to the delivery worker. Channel
    /// delivery failures never propagate to the caller (spec §4.6).
    #[tracing::instrument(skip(self, draft))]
    pub async fn notify(&self, draft: NotificationDraft) -> Result<Notification, NotifyError> {
        let notification = Notification {
            notification_id: NotificationId::new(),
            tenant_id: draft.tenant_id,
            created_at: self.clock.now(),
            risk_level: draft.risk_level,
            title: draft.title,
            description: draft.description,
            agent_id: draft.agent_id,
            activity_id: draft.activity_id,
            recommended_actions: draft.recommended_actions,
            system_action_taken: draft.system_action_taken,
            status: NotificationStatus::Pending,
            admin_response: None,
            responded_by: None,
            responded_at: None,
            resolution: None,
        };

        self.backend.insert_notification(notification.clone()).await?;

        if self.delivery_tx.try_send(notification.clone()).is_err() {
            tracing::warn!(
                notification_id = %notification.notification_id,
                "delivery queue full, dropping live channel fan-out (notification is still persisted)"
            );
        }

        Ok(notification)
    }

    pub async fn list_pending(
        &self,
        tenant_id: Option<TenantId>,
        limit: usize,
    ) -> Result<Vec<Notification>, NotifyError> {
        self.backend.list_pending(tenant_id, limit).await
    }

    #[tracing::instrument(skip(self, decision))]
    pub async fn respond(
        &self,
        notification_id: NotificationId,
        admin_id: &str,
        decision: NotificationDecision,
    ) -> Result<Notification, NotifyError> {
        let mut notification = self
            .backend
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| NotifyError::NotificationNotFound(notification_id.to_string()))?;

        if notification.status == NotificationStatus::Resolved {
            return Err(NotifyError::NotificationResolved(notification_id.to_string()));
        }

        notification.responded_by = Some(admin_id.to_string());
        notification.responded_at = Some(self.clock.now());
        match decision {
            NotificationDecision::Acknowledge { response } => {
                notification.status = NotificationStatus::Acknowledged;
                notification.admin_response = response;
            }
            NotificationDecision::Resolve { response, resolution } => {
                notification.status = NotificationStatus::Resolved;
                notification.admin_response = response;
                notification.resolution = Some(resolution);
            }
        }

        self.backend.update_notification(notification.clone()).await?;
        Ok(notification)
    }

    /// Create a `Pending` approval request and emit a high-priority
    /// notification for it (spec §4.6).
    #[tracing::instrument(skip(self, reason))]
    pub async fn request_approval(
        &self,
        action: ApprovalAction,
        target_agent_id: AgentId,
        requested_by: &str,
        reason: impl Into<String>,
        ttl_seconds: i64,
        tenant_id: Option<TenantId>,
    ) -> Result<ApprovalRequest, NotifyError> {
        let reason = reason.into();
        let now = self.clock.now();
        let request = ApprovalRequest {
            approval_id: ApprovalId::new(),
            target_agent_id,
            action,
            requested_by: requested_by.to_string(),
            requested_at: now,
            reason: reason.clone(),
            status: ApprovalStatus::Pending,
            decided_by: None,
            decided_at: None,
            approval_notes: None,
            expires_at: now + chrono::Duration::seconds(ttl_seconds),
        };
        self.backend.insert_approval(request.clone()).await?;

        let mut draft = NotificationDraft::new(
            RiskLevel::High,
            format!("Approval required: {action:?} for agent {target_agent_id}"),
            reason,
        )
        .with_agent(target_agent_id)
        .with_system_action(SystemAction::Escalate);
        draft.tenant_id = tenant_id;
        self.notify(draft).await?;

        Ok(request)
    }

    #[tracing::instrument(skip(self, notes))]
    pub async fn approve(
        &self,
        approval_id: ApprovalId,
        admin_id: &str,
        notes: Option<String>,
    ) -> Result<ApprovalRequest, NotifyError> {
        self.decide(approval_id, admin_id, notes, ApprovalStatus::Approved).await
    }

    #[tracing::instrument(skip(self, notes))]
    pub async fn reject(
        &self,
        approval_id: ApprovalId,
        admin_id: &str,
        notes: Option<String>,
    ) -> Result<ApprovalRequest, NotifyError> {
        self.decide(approval_id, admin_id, notes, ApprovalStatus::Rejected).await
    }

    async fn decide(
        &self,
        approval_id: ApprovalId,
        admin_id: &str,
        notes: Option<String>,
        decision: ApprovalStatus,
    ) -> Result<ApprovalRequest, NotifyError> {
        let mut approval = self
            .backend
            .get_approval(approval_id)
            .await?
            .ok_or_else(|| NotifyError::ApprovalNotFound(approval_id.to_string()))?;

        let now = self.clock.now();
        if approval.status != ApprovalStatus::Pending {
            return Err(NotifyError::ApprovalNotPending(
                approval_id.to_string(),
                approval.status_label(),
            ));
        }
        if approval.is_expired(now) {
            approval.status = ApprovalStatus::Expired;
            self.backend.update_approval(approval.clone()).await?;
            return Err(NotifyError::ApprovalExpired(approval_id.to_string()));
        }

        approval.status = decision;
        approval.decided_by = Some(admin_id.to_string());
        approval.decided_at = Some(now);
        approval.approval_notes = notes;
        self.backend.update_approval(approval.clone()).await?;
        Ok(approval)
    }

    /// Atomically check that `approval_id` is `Approved`, unexpired, still
    /// targets `target_agent_id`, and not previously consumed, then mark it
    /// `Consumed` (spec §4.6 invariant, §8 property 5). The Lifecycle
    /// Manager calls this inside the same critical section that executes
    /// the destructive action.
    #[tracing::instrument(skip(self))]
    pub async fn consume_approved(
        &self,
        approval_id: ApprovalId,
        target_agent_id: AgentId,
    ) -> Result<ApprovalRequest, NotifyError> {
        let mut approval = self
            .backend
            .get_approval(approval_id)
            .await?
            .ok_or_else(|| NotifyError::ApprovalNotFound(approval_id.to_string()))?;

        if approval.target_agent_id != target_agent_id {
            return Err(NotifyError::ApprovalNotFound(approval_id.to_string()));
        }

        match approval.status {
            ApprovalStatus::Consumed => {
                return Err(NotifyError::ApprovalAlreadyConsumed(approval_id.to_string()))
            }
            ApprovalStatus::Pending | ApprovalStatus::Rejected | ApprovalStatus::Expired => {
                return Err(NotifyError::ApprovalNotPending(
                    approval_id.to_string(),
                    approval.status_label(),
                ))
            }
            ApprovalStatus::Approved => {}
        }

        let now = self.clock.now();
        if approval.is_expired(now) {
            approval.status = ApprovalStatus::Expired;
            self.backend.update_approval(approval.clone()).await?;
            return Err(NotifyError::ApprovalExpired(approval_id.to_string()));
        }

        approval.status = ApprovalStatus::Consumed;
        self.backend.update_approval(approval.clone()).await?;
        Ok(approval)
    }

    /// Sweep pending approvals past their TTL to `Expired` (spec §4.6
    /// "periodic job"). Returns the ids that were swept.
    pub async fn sweep_expired(&self) -> Result<Vec<ApprovalId>, NotifyError> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for approval in self.backend.pending_approvals().await? {
            if approval.is_expired(now) {
                let id = approval.approval_id;
                let mut approval = approval;
                approval.status = ApprovalStatus::Expired;
                self.backend.update_approval(approval).await?;
                expired.push(id);
            }
        }
        Ok(expired)
    }
}

async fn delivery_worker(
    mut rx: mpsc::Receiver<Notification>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    severities: NotificationChannelSeverities,
) {
    while let Some(notification) = rx.recv().await {
        for channel in &channels {
            if channel_min_severity(channel.kind(), &severities) > notification.risk_level {
                continue;
            }
            let mut attempt = 0;
            loop {
                attempt += 1;
                match channel.deliver(&notification).await {
                    Ok(()) => break,
                    Err(err) if attempt < MAX_DELIVERY_ATTEMPTS => {
                        tracing::debug!(
                            channel = ?channel.kind(),
                            attempt,
                            error = %err,
                            "channel delivery failed, retrying"
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(50 * attempt as u64)).await;
                    }
                    Err(err) => {
                        tracing::error!(
                            channel = ?channel.kind(),
                            notification_id = %notification.notification_id,
                            error = %err,
                            "channel delivery failed, giving up after max attempts"
                        );
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::system_clock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        kind: ChannelKind,
        count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for CountingChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn deliver(&self, _notification: &Notification) -> Result<(), String> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn notify_persists_and_is_listed_pending() {
        let bus = NotificationBus::in_memory(vec![], NotificationChannelSeverities::default(), system_clock());
        let draft = NotificationDraft::new(RiskLevel::High, "t", "d");
        let n = bus.notify(draft).await.unwrap();
        let pending = bus.list_pending(None, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].notification_id, n.notification_id);
    }

    #[tokio::test]
    async fn resolved_notification_is_immutable() {
        let bus = NotificationBus::in_memory(vec![], NotificationChannelSeverities::default(), system_clock());
        let n = bus.notify(NotificationDraft::new(RiskLevel::Medium, "t", "d")).await.unwrap();
        bus.respond(
            n.notification_id,
            "admin-1",
            NotificationDecision::Resolve {
                response: Some("ok".into()),
                resolution: "handled".into(),
            },
        )
        .await
        .unwrap();

        let err = bus
            .respond(
                n.notification_id,
                "admin-1",
                NotificationDecision::Acknowledge { response: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::NotificationResolved(_)));
    }

    #[tokio::test]
    async fn approval_is_single_use() {
        let bus = NotificationBus::in_memory(vec![], NotificationChannelSeverities::default(), system_clock());
        let agent = AgentId::new();
        let request = bus
            .request_approval(ApprovalAction::Decommission, agent, "admin-a", "cleanup", 3600, None)
            .await
            .unwrap();

        bus.approve(request.approval_id, "admin-b", Some("reviewed".into()))
            .await
            .unwrap();

        let consumed = bus.consume_approved(request.approval_id, agent).await.unwrap();
        assert_eq!(consumed.status, ApprovalStatus::Consumed);

        let err = bus.consume_approved(request.approval_id, agent).await.unwrap_err();
        assert!(matches!(err, NotifyError::ApprovalAlreadyConsumed(_)));
    }

    #[tokio::test]
    async fn expired_approval_cannot_satisfy_gate() {
        let bus = NotificationBus::in_memory(vec![], NotificationChannelSeverities::default(), system_clock());
        let agent = AgentId::new();
        let request = bus
            .request_approval(ApprovalAction::Decommission, agent, "admin-a", "cleanup", -1, None)
            .await
            .unwrap();
        bus.approve(request.approval_id, "admin-b", None).await.unwrap_err();
    }

    #[tokio::test]
    async fn sweep_expired_marks_stale_pending_requests() {
        let bus = NotificationBus::in_memory(vec![], NotificationChannelSeverities::default(), system_clock());
        let agent = AgentId::new();
        let request = bus
            .request_approval(ApprovalAction::Decommission, agent, "admin-a", "cleanup", -1, None)
            .await
            .unwrap();
        let swept = bus.sweep_expired().await.unwrap();
        assert_eq!(swept, vec![request.approval_id]);
    }

    #[tokio::test]
    async fn delivery_reaches_channel_above_min_severity() {
        let count = Arc::new(AtomicUsize::new(0));
        let channel = Arc::new(CountingChannel {
            kind: ChannelKind::Pager,
            count: count.clone(),
        });
        let mut severities = NotificationChannelSeverities::default();
        severities.pager = RiskLevel::Critical;
        let bus = NotificationBus::in_memory(vec![channel], severities, system_clock());

        bus.notify(NotificationDraft::new(RiskLevel::Low, "t", "d")).await.unwrap();
        bus.notify(NotificationDraft::new(RiskLevel::Critical, "t", "d")).await.unwrap();

        // Give the background worker a chance to drain the queue.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
