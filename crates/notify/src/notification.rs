//! The `Notification` entity (spec §3) and the `ApprovalRequest` entity
//! that gates destructive lifecycle actions (spec §3/§4.6).

use chrono::{DateTime, Utc};
use sentinel_core::{
    ActivityId, AgentId, ApprovalId, NotificationId, RecommendedAction, RiskLevel, SystemAction,
    TenantId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: NotificationId,
    pub tenant_id: Option<TenantId>,
    pub created_at: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub title: String,
    pub description: String,
    pub agent_id: Option<AgentId>,
    pub activity_id: Option<ActivityId>,
    pub recommended_actions: Vec<RecommendedAction>,
    pub system_action_taken: SystemAction,
    pub status: NotificationStatus,
    pub admin_response: Option<String>,
    pub responded_by: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

/// What an admin does with a pending notification (spec §4.6 `respond`).
#[derive(Debug, Clone)]
pub enum NotificationDecision {
    Acknowledge { response: Option<String> },
    Resolve { response: Option<String>, resolution: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Decommission,
    PermanentDelete,
    TenantModification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    /// Ambient addition: the Lifecycle Manager marks an `Approved` request
    /// `Consumed` in the same critical section that executes the
    /// destructive action (spec §4.6 invariant / §8 property 5). Kept
    /// distinct from `Approved` so a second `execute_action` replay attempt
    /// reports a more specific cause than "not pending".
    Consumed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_id: ApprovalId,
    pub target_agent_id: AgentId,
    pub action: ApprovalAction,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub reason: String,
    pub status: ApprovalStatus,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub approval_notes: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn status_label(&self) -> &'static str {
        match self.status {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Expired => "expired",
            ApprovalStatus::Consumed => "consumed",
        }
    }
}
