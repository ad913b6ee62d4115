//! The admin dashboard (spec §4.7 `get_dashboard`) and compliance report
//! (spec §4.7 `generate_compliance_report`).
//!
//! Grounded on `arbiter::coordinator::Coordinator`'s read-side aggregation
//! over its sub-managers -- the same "ask every component for its slice,
//! assemble a summary" shape, applied here to lifecycle/freeze/notify
//! state instead of lock/queue state.

use sentinel_audit::{ActivityFilter, AuditStore, Window};
use sentinel_core::{AgentId, AgentStatus, RiskLevel, TenantId};
use sentinel_freeze::{FreezeRecord, FreezeRegistry};
use sentinel_lifecycle::{Agent, LifecycleManager};
use sentinel_notify::NotificationBus;

const ATTENTION_SCORE_THRESHOLD: i32 = 70;
const DASHBOARD_NOTIFICATION_LIMIT: usize = 50;

/// An agent flagged on the dashboard for needing admin attention (spec
/// §4.7: "score < 70 OR status in {Suspended, Frozen, Compromised}").
#[derive(Debug, Clone)]
pub struct AttentionItem {
    pub agent_id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub security_score: i32,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardSummary {
    pub total_agents: usize,
    pub active_agents: usize,
    pub suspended_agents: usize,
    pub frozen_agents: usize,
    pub compromised_agents: usize,
    pub pending_notifications: usize,
    pub frozen_entities: Vec<FreezeRecord>,
    pub agents_needing_attention: Vec<AttentionItem>,
    pub prioritized_recommendations: Vec<String>,
}

fn needs_attention(agent: &Agent) -> Option<&'static str> {
    if agent.status == AgentStatus::Compromised {
        Some("status is Compromised")
    } else if agent.status == AgentStatus::Frozen {
        Some("status is Frozen")
    } else if agent.status == AgentStatus::Suspended {
        Some("status is Suspended")
    } else if agent.security_score < ATTENTION_SCORE_THRESHOLD {
        Some("security score below warning threshold")
    } else {
        None
    }
}

/// Ranks attention items worst-first: Compromised, then Frozen, then
/// Suspended, then a plain low score -- ties broken by ascending score.
fn attention_rank(item: &AttentionItem) -> (u8, i32) {
    let severity = match item.status {
        AgentStatus::Compromised => 0,
        AgentStatus::Frozen => 1,
        AgentStatus::Suspended => 2,
        _ => 3,
    };
    (severity, item.security_score)
}

pub(crate) async fn build(
    lifecycle: &LifecycleManager,
    freeze: &FreezeRegistry,
    notify: &NotificationBus,
    tenant_id: TenantId,
) -> sentinel_core::Result<DashboardSummary> {
    let agents = lifecycle.list_by_tenant(tenant_id).await?;
    let frozen_entities = freeze.frozen_entities().await?;
    let pending = notify
        .list_pending(Some(tenant_id), DASHBOARD_NOTIFICATION_LIMIT)
        .await?;

    let mut summary = DashboardSummary {
        total_agents: agents.len(),
        pending_notifications: pending.len(),
        frozen_entities,
        ..Default::default()
    };

    let mut attention: Vec<AttentionItem> = Vec::new();
    for agent in &agents {
        match agent.status {
            AgentStatus::Active => summary.active_agents += 1,
            AgentStatus::Suspended => summary.suspended_agents += 1,
            AgentStatus::Frozen => summary.frozen_agents += 1,
            AgentStatus::Compromised => summary.compromised_agents += 1,
            _ => {}
        }
        if let Some(reason) = needs_attention(agent) {
            attention.push(AttentionItem {
                agent_id: agent.agent_id,
                name: agent.name.clone(),
                status: agent.status,
                security_score: agent.security_score,
                reason,
            });
        }
    }
    attention.sort_by_key(attention_rank);

    summary.prioritized_recommendations = attention
        .iter()
        .map(|item| format!("review agent {} ({}): {}", item.name, item.agent_id, item.reason))
        .collect();
    summary.agents_needing_attention = attention;

    Ok(summary)
}

/// One agent's contribution to a compliance report (spec §4.7
/// `generate_compliance_report`).
#[derive(Debug, Clone)]
pub struct AgentComplianceSummary {
    pub agent_id: AgentId,
    pub total_activities: usize,
    pub security_violations: usize,
    pub compliance_flags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ComplianceReport {
    pub window: Window,
    pub agents_covered: usize,
    pub total_activities: usize,
    pub total_security_violations: usize,
    pub chain_integrity_failures: usize,
    pub per_agent: Vec<AgentComplianceSummary>,
}

/// Build a compliance report for `range` across `agents` (spec §4.7).
/// Retention of the underlying activity rows is left entirely to the
/// Audit Store backend -- this function only reads, it never purges (see
/// DESIGN.md).
pub(crate) async fn generate_report(
    audit: &AuditStore,
    agents: &[Agent],
    range: Window,
) -> sentinel_core::Result<ComplianceReport> {
    let mut per_agent = Vec::with_capacity(agents.len());
    let mut total_activities = 0usize;
    let mut total_security_violations = 0usize;
    let mut chain_integrity_failures = 0usize;

    for agent in agents {
        let activities = audit
            .query(agent.agent_id, Some(range), ActivityFilter::default(), usize::MAX, 0)
            .await?;
        let security_violations = activities
            .iter()
            .filter(|a| a.risk_level >= RiskLevel::High && a.requires_review)
            .count();
        let mut compliance_flags: Vec<String> = activities
            .iter()
            .flat_map(|a| a.compliance_flags.iter().cloned())
            .collect();
        compliance_flags.sort();
        compliance_flags.dedup();

        if !activities.is_empty() {
            let verification = audit
                .verify_chain(agent.agent_id, 0, activities.len() as u64 - 1)
                .await?;
            if !verification.valid {
                chain_integrity_failures += 1;
            }
        }

        total_activities += activities.len();
        total_security_violations += security_violations;
        per_agent.push(AgentComplianceSummary {
            agent_id: agent.agent_id,
            total_activities: activities.len(),
            security_violations,
            compliance_flags,
        });
    }

    Ok(ComplianceReport {
        window: range,
        agents_covered: agents.len(),
        total_activities,
        total_security_violations,
        chain_integrity_failures,
        per_agent,
    })
}
