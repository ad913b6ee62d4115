//! Domain events published by the control plane (spec §6: "the core
//! publishes events by subject; transport is unspecified").
//!
//! Grounded on `arbiter::escalation::webhook::WebhookPayload` -- the
//! teacher's shape for "one typed event, one delivery trait, one default
//! that just logs" -- generalized here from a single escalation payload
//! to the full set of subjects this control plane raises.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ApprovalId, FreezeId, NotificationId, TenantId};
use crate::types::{AgentStatus, FreezeScope, RiskLevel};

/// One occurrence worth telling the outside world about. Each variant
/// corresponds to a subject a deployment might subscribe to; the crate
/// never assumes anything about the transport it travels over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "subject", rename_all = "snake_case")]
pub enum DomainEvent {
    AgentStatusChanged {
        agent_id: AgentId,
        tenant_id: TenantId,
        from: AgentStatus,
        to: AgentStatus,
    },
    SecurityViolationRecorded {
        agent_id: AgentId,
        tenant_id: TenantId,
        violation_type: String,
        risk_level: RiskLevel,
    },
    EntityFrozen {
        freeze_id: FreezeId,
        scope: FreezeScope,
        risk_level: RiskLevel,
    },
    EntityUnfrozen {
        scope: FreezeScope,
        authorized_by: String,
    },
    ApprovalRequested {
        approval_id: ApprovalId,
        agent_id: AgentId,
    },
    ApprovalDecided {
        approval_id: ApprovalId,
        approved: bool,
    },
    NotificationRaised {
        notification_id: NotificationId,
        tenant_id: Option<TenantId>,
        risk_level: RiskLevel,
    },
}

impl DomainEvent {
    /// Stable dot-separated subject name, for deployments that route on a
    /// string key rather than matching the enum (message-bus topic,
    /// metrics label, log field).
    pub fn subject(&self) -> &'static str {
        match self {
            Self::AgentStatusChanged { .. } => "agent.status_changed",
            Self::SecurityViolationRecorded { .. } => "agent.security_violation",
            Self::EntityFrozen { .. } => "freeze.entity_frozen",
            Self::EntityUnfrozen { .. } => "freeze.entity_unfrozen",
            Self::ApprovalRequested { .. } => "approval.requested",
            Self::ApprovalDecided { .. } => "approval.decided",
            Self::NotificationRaised { .. } => "notification.raised",
        }
    }
}

/// Where `DomainEvent`s go. Message-bus transport is explicitly out of
/// scope (spec §1); this trait is the seam a deployment wires a real
/// publisher into.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Default sink: structured log line per event, nothing else. Matches
/// the teacher's fallback of logging an escalation it has no webhook
/// configured for rather than silently dropping it.
#[derive(Debug, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn publish(&self, event: DomainEvent) {
        tracing::info!(subject = event.subject(), event = ?event, "domain event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_names_are_stable() {
        let event = DomainEvent::ApprovalDecided {
            approval_id: ApprovalId::new(),
            approved: true,
        };
        assert_eq!(event.subject(), "approval.decided");
    }
}
