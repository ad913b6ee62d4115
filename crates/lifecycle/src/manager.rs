//! The Lifecycle Manager (spec §4.2): the agent state machine, quotas,
//! security score, and destructive-action execution with approval
//! routing.
//!
//! Grounded on `arbiter::coordinator::Coordinator` for the "compose
//! sub-managers behind one API" shape and `arbiter::killswitch::KillSwitch`
//! for the terminate/record idiom reused here for the `Decommission` and
//! `Compromised` transitions. Per-agent serialization (spec §5) is
//! implemented with a sharded `tokio::sync::Mutex` keyed by `agent_id`,
//! generalizing `arbiter::locks::LockManager`'s per-resource lock map from
//! TTL'd business locks to an unconditional critical section per agent.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use sentinel_audit::{ActivityDraft, AuditStore};
use sentinel_core::{
    config::{LifecycleConfig, ScoreThresholds},
    ActivityType, AgentId, AgentStatus, ApprovalId, CorrelationId, RiskAssessment, RiskLevel,
    SharedClock, SystemAction, TenantId, ViolationSeverity,
};
use sentinel_freeze::FreezeRegistry;
use sentinel_notify::{ApprovalAction, NotificationBus, NotificationDraft};
use tokio::sync::{Mutex, RwLock};

use crate::agent::{Agent, AgentMetrics, AgentSpec, INITIAL_SECURITY_SCORE};
use crate::backend::{AgentBackend, InMemoryAgentBackend};
use crate::error::LifecycleError;
use crate::score::{apply_thresholds, clamp_score, violation_delta};

/// Admin-triggered transitions (spec §4.2 table). Transitions driven by
/// heartbeats or security violations are handled by dedicated methods,
/// not this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Activate,
    EnterMaintenance,
    ExitMaintenance,
    Deactivate,
    Suspend,
    Resume,
    Freeze,
    Decommission,
}

impl LifecycleAction {
    fn label(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::EnterMaintenance => "enter_maintenance",
            Self::ExitMaintenance => "exit_maintenance",
            Self::Deactivate => "deactivate",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Freeze => "freeze",
            Self::Decommission => "decommission",
        }
    }
}

/// Table-driven transition lookup (spec §4.2). Any `(from, action)` pair
/// not covered here is rejected with `InvalidTransition` (spec §8
/// property 4).
fn transition_for(from: AgentStatus, action: LifecycleAction) -> Option<AgentStatus> {
    use AgentStatus::*;
    use LifecycleAction::*;
    match (from, action) {
        (Registered, Activate) => Some(Active),
        (Active, EnterMaintenance) => Some(Maintenance),
        (Maintenance, ExitMaintenance) => Some(Active),
        (Active, Deactivate) => Some(Inactive),
        (Active, Suspend) => Some(Suspended),
        (Suspended, Resume) => Some(Active),
        (Suspended, Freeze) => Some(Frozen),
        (Frozen, Decommission) => Some(Decommissioned),
        (Compromised, Decommission) => Some(Decommissioned),
        _ => None,
    }
}

fn status_label(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Registered => "Registered",
        AgentStatus::Active => "Active",
        AgentStatus::Inactive => "Inactive",
        AgentStatus::Maintenance => "Maintenance",
        AgentStatus::Offline => "Offline",
        AgentStatus::Suspended => "Suspended",
        AgentStatus::Frozen => "Frozen",
        AgentStatus::Compromised => "Compromised",
        AgentStatus::Decommissioned => "Decommissioned",
    }
}

/// Outcome of `execute_action` (spec §4.2: "{ executed | pending_approval
/// (approval_id) | rejected(cause) }").
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Executed { agent: Agent },
    PendingApproval { approval_id: ApprovalId },
}

/// Outcome of `handle_security_violation` (spec §4.2).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ViolationOutcome {
    pub outcome: &'static str,
    pub new_status: AgentStatus,
    pub new_score: i32,
}

fn negligible_assessment() -> RiskAssessment {
    RiskAssessment {
        risk_level: RiskLevel::Negligible,
        compliance_flags: Vec::new(),
        requires_review: false,
        recommended_actions: Vec::new(),
        system_action: SystemAction::None,
    }
}

fn transition_risk(to: AgentStatus) -> RiskAssessment {
    let level = match to {
        AgentStatus::Compromised | AgentStatus::Decommissioned | AgentStatus::Frozen => {
            RiskLevel::High
        }
        AgentStatus::Suspended | AgentStatus::Offline => RiskLevel::Medium,
        _ => RiskLevel::Negligible,
    };
    RiskAssessment {
        risk_level: level,
        compliance_flags: Vec::new(),
        requires_review: level >= RiskLevel::High,
        recommended_actions: Vec::new(),
        system_action: SystemAction::None,
    }
}

pub struct LifecycleManager {
    backend: Arc<dyn AgentBackend>,
    audit: Arc<AuditStore>,
    freeze: Arc<FreezeRegistry>,
    notify: Arc<NotificationBus>,
    clock: SharedClock,
    config: LifecycleConfig,
    score_thresholds: ScoreThresholds,
    approval_ttl_seconds: i64,
    known_capabilities: HashSet<String>,
    agent_locks: RwLock<HashMap<AgentId, Arc<Mutex<()>>>>,
    idempotency: RwLock<HashMap<(AgentId, CorrelationId), ExecuteIdempotent>>,
    metrics: RwLock<HashMap<AgentId, AgentMetrics>>,
}

#[derive(Clone)]
enum ExecuteIdempotent {
    Executed(Agent),
    PendingApproval(ApprovalId),
}

impl LifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn AgentBackend>,
        audit: Arc<AuditStore>,
        freeze: Arc<FreezeRegistry>,
        notify: Arc<NotificationBus>,
        clock: SharedClock,
        config: LifecycleConfig,
        score_thresholds: ScoreThresholds,
        approval_ttl_seconds: i64,
        known_capabilities: HashSet<String>,
    ) -> Self {
        Self {
            backend,
            audit,
            freeze,
            notify,
            clock,
            config,
            score_thresholds,
            approval_ttl_seconds,
            known_capabilities,
            agent_locks: RwLock::new(HashMap::new()),
            idempotency: RwLock::new(HashMap::new()),
            metrics: RwLock::new(HashMap::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn in_memory(
        audit: Arc<AuditStore>,
        freeze: Arc<FreezeRegistry>,
        notify: Arc<NotificationBus>,
        clock: SharedClock,
        config: LifecycleConfig,
        score_thresholds: ScoreThresholds,
        approval_ttl_seconds: i64,
        known_capabilities: HashSet<String>,
    ) -> Self {
        Self::new(
            Arc::new(InMemoryAgentBackend::new()),
            audit,
            freeze,
            notify,
            clock,
            config,
            score_thresholds,
            approval_ttl_seconds,
            known_capabilities,
        )
    }

    async fn agent_lock(&self, agent_id: AgentId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.agent_locks.read().await.get(&agent_id) {
            return lock.clone();
        }
        let mut guard = self.agent_locks.write().await;
        guard
            .entry(agent_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn fail_if_system_frozen(&self) -> Result<(), LifecycleError> {
        if self
            .freeze
            .is_frozen(&sentinel_core::FreezeScope::System)
            .await?
        {
            return Err(LifecycleError::Frozen(
                "system is frozen, refusing new lifecycle operations".to_string(),
            ));
        }
        Ok(())
    }

    async fn record_transition(
        &self,
        agent: &Agent,
        from: AgentStatus,
        to: AgentStatus,
        reason: &str,
        actor: &str,
        correlation_id: CorrelationId,
        linked_activity: Option<sentinel_core::ActivityId>,
    ) -> Result<(), LifecycleError> {
        let mut draft = ActivityDraft::new(
            agent.agent_id,
            agent.tenant_id,
            ActivityType::SystemModification,
            format!(
                "{from}\u{2192}{to}: {reason}",
                from = status_label(from),
                to = status_label(to)
            ),
        )
        .with_correlation_id(correlation_id)
        .with_category("lifecycle_transition")
        .with_context("actor", serde_json::json!(actor))
        .with_context("from", serde_json::json!(status_label(from)))
        .with_context("to", serde_json::json!(status_label(to)));
        if let Some(parent) = linked_activity {
            draft = draft.with_parent(parent);
        }
        self.audit.append(draft, transition_risk(to)).await?;
        Ok(())
    }

    /// Register a new agent (spec §4.2 `register_agent`). Quota and
    /// name-uniqueness are enforced atomically by the backend (spec §8
    /// property 1).
    #[tracing::instrument(skip(self, spec))]
    pub async fn register_agent(&self, spec: AgentSpec) -> Result<Agent, LifecycleError> {
        self.fail_if_system_frozen().await?;

        for capability in &spec.capabilities {
            if !self.known_capabilities.contains(capability) {
                return Err(LifecycleError::InvalidCapability(capability.clone()));
            }
        }

        let agent = Agent {
            agent_id: AgentId::new(),
            tenant_id: spec.tenant_id,
            name: spec.name,
            agent_type: spec.agent_type,
            version: spec.version,
            capabilities: spec.capabilities,
            permissions: spec.permissions,
            status: AgentStatus::Registered,
            security_score: INITIAL_SECURITY_SCORE,
            created_at: self.clock.now(),
            registered_by: spec.registered_by.clone(),
            last_heartbeat_at: None,
            last_score_update_at: None,
        };

        let agent = self
            .backend
            .register(agent, self.config.max_agents_per_tenant)
            .await?;

        let draft = ActivityDraft::new(
            agent.agent_id,
            agent.tenant_id,
            ActivityType::SystemModification,
            format!("agent {} registered by {}", agent.name, spec.registered_by),
        )
        .with_category("lifecycle_registration");
        self.audit.append(draft, negligible_assessment()).await?;

        Ok(agent)
    }

    /// Execute an admin-triggered action (spec §4.2 `execute_action`).
    /// Idempotent on `(agent_id, correlation_id)` when a correlation id is
    /// supplied.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(self, reason))]
    pub async fn execute_action(
        &self,
        agent_id: AgentId,
        action: LifecycleAction,
        actor: &str,
        reason: impl Into<String>,
        approval_id: Option<ApprovalId>,
        correlation_id: CorrelationId,
    ) -> Result<ActionOutcome, LifecycleError> {
        self.fail_if_system_frozen().await?;
        let reason = reason.into();

        if let Some(cached) = self
            .idempotency
            .read()
            .await
            .get(&(agent_id, correlation_id))
            .cloned()
        {
            return Ok(match cached {
                ExecuteIdempotent::Executed(agent) => ActionOutcome::Executed { agent },
                ExecuteIdempotent::PendingApproval(id) => {
                    ActionOutcome::PendingApproval { approval_id: id }
                }
            });
        }

        let lock = self.agent_lock(agent_id).await;
        let _guard = lock.lock().await;

        let mut agent = self
            .backend
            .get(agent_id)
            .await?
            .ok_or(LifecycleError::NotFound(agent_id))?;

        if agent.status.is_terminal() {
            return Err(LifecycleError::Immutable {
                agent_id,
                status: status_label(agent.status),
            });
        }

        let to = transition_for(agent.status, action).ok_or(LifecycleError::InvalidTransition {
            from: status_label(agent.status),
            action: action.label(),
        })?;

        let requires_approval = action == LifecycleAction::Decommission
            && self.config.require_admin_approval_for_delete;

        if requires_approval {
            let consumed = match approval_id {
                Some(id) => Some(self.notify.consume_approved(id, agent_id).await?),
                None => None,
            };

            if consumed.is_none() {
                let request = self
                    .notify
                    .request_approval(
                        ApprovalAction::Decommission,
                        agent_id,
                        actor,
                        reason.clone(),
                        self.approval_ttl_seconds,
                        Some(agent.tenant_id),
                    )
                    .await?;
                self.idempotency.write().await.insert(
                    (agent_id, correlation_id),
                    ExecuteIdempotent::PendingApproval(request.approval_id),
                );
                return Ok(ActionOutcome::PendingApproval {
                    approval_id: request.approval_id,
                });
            }
        }

        let from = agent.status;
        agent.status = to;
        if to == AgentStatus::Decommissioned {
            self.backend.decrement_quota(agent.tenant_id).await?;
        }
        self.backend.update(agent.clone()).await?;

        self.record_transition(&agent, from, to, &reason, actor, correlation_id, None)
            .await?;

        self.idempotency.write().await.insert(
            (agent_id, correlation_id),
            ExecuteIdempotent::Executed(agent.clone()),
        );

        Ok(ActionOutcome::Executed { agent })
    }

    /// Synchronous handling of an externally-reported or internally
    /// detected security violation (spec §4.2 `handle_security_violation`).
    #[tracing::instrument(skip(self, details))]
    pub async fn handle_security_violation(
        &self,
        agent_id: AgentId,
        violation_type: &str,
        severity: ViolationSeverity,
        details: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Result<ViolationOutcome, LifecycleError> {
        self.fail_if_system_frozen().await?;
        let details = details.into();

        let lock = self.agent_lock(agent_id).await;
        let _guard = lock.lock().await;

        let mut agent = self
            .backend
            .get(agent_id)
            .await?
            .ok_or(LifecycleError::NotFound(agent_id))?;

        if agent.status.is_terminal() {
            return Err(LifecycleError::Immutable {
                agent_id,
                status: status_label(agent.status),
            });
        }

        let from = agent.status;
        let delta = violation_delta(severity);
        let mut score = clamp_score(agent.security_score + delta);

        // Violation-specific direct transition (spec §4.2 table): any
        // violation >= Medium suspends an Active agent; a second Critical
        // violation while already Suspended is the path to Compromised
        // (see DESIGN.md for the source table's Frozen/Compromised
        // ambiguity and how this was resolved).
        let mut status = from;
        match (from, severity) {
            (AgentStatus::Active, ViolationSeverity::Critical | ViolationSeverity::Medium) => {
                status = AgentStatus::Suspended;
            }
            (AgentStatus::Suspended, ViolationSeverity::Critical) => {
                status = AgentStatus::Compromised;
                score = 0;
            }
            _ => {}
        }

        let threshold_outcome = apply_thresholds(
            status,
            score,
            self.config.auto_suspend_on_security_violation,
            &self.score_thresholds,
        );
        status = threshold_outcome.status;

        agent.security_score = score;
        agent.status = status;
        agent.last_score_update_at = Some(self.clock.now());
        self.backend.update(agent.clone()).await?;

        let violation_risk = RiskAssessment {
            risk_level: match severity {
                ViolationSeverity::Critical => RiskLevel::Critical,
                ViolationSeverity::Medium | ViolationSeverity::Warning => RiskLevel::High,
            },
            compliance_flags: vec!["security_violation".to_string()],
            requires_review: true,
            recommended_actions: Vec::new(),
            system_action: SystemAction::None,
        };
        let draft = ActivityDraft::new(
            agent.agent_id,
            agent.tenant_id,
            ActivityType::SecurityEvent,
            format!("security violation {violation_type}: {details}"),
        )
        .with_correlation_id(correlation_id)
        .with_category("security_violation")
        .with_context("violation_type", serde_json::json!(violation_type))
        .with_context("severity", serde_json::json!(format!("{severity:?}")));
        let violation_activity = self.audit.append(draft, violation_risk).await?;

        if status != from {
            self.record_transition(
                &agent,
                from,
                status,
                &format!("security violation: {violation_type}"),
                "system:surveillance",
                correlation_id,
                Some(violation_activity.activity_id),
            )
            .await?;
        }

        if threshold_outcome.mandatory_freeze || status == AgentStatus::Frozen {
            let outcome = self
                .freeze
                .freeze(
                    sentinel_core::FreezeScope::Agent(agent_id),
                    format!("security violation: {violation_type}"),
                    Some(violation_activity.activity_id),
                    if status == AgentStatus::Compromised {
                        RiskLevel::Critical
                    } else {
                        RiskLevel::High
                    },
                )
                .await?;
            if outcome.newly_frozen {
                let draft = NotificationDraft::new(
                    RiskLevel::Critical,
                    format!("Agent {agent_id} frozen"),
                    format!("Security violation {violation_type} triggered an automatic freeze"),
                )
                .with_agent(agent_id)
                .with_activity(violation_activity.activity_id)
                .with_system_action(SystemAction::FreezeAgent);
                self.notify.notify(draft).await?;
            }
        } else if threshold_outcome.warning {
            let draft = NotificationDraft::new(
                RiskLevel::Medium,
                format!("Agent {agent_id} security score below warning threshold"),
                format!("Current score {score} after violation {violation_type}"),
            )
            .with_agent(agent_id)
            .with_activity(violation_activity.activity_id)
            .with_system_action(SystemAction::Alert);
            self.notify.notify(draft).await?;
        }

        let outcome = match status {
            AgentStatus::Compromised => "compromised",
            AgentStatus::Frozen => "frozen",
            AgentStatus::Suspended if status != from => "suspended",
            _ => "logged",
        };

        Ok(ViolationOutcome {
            outcome,
            new_status: status,
            new_score: score,
        })
    }

    /// Record a heartbeat. Resumes an `Offline` agent to `Active` (spec
    /// §4.2 table); otherwise only refreshes `last_heartbeat_at`.
    #[tracing::instrument(skip(self, metrics))]
    pub async fn heartbeat(
        &self,
        agent_id: AgentId,
        metrics: AgentMetrics,
        correlation_id: CorrelationId,
    ) -> Result<(), LifecycleError> {
        let lock = self.agent_lock(agent_id).await;
        let _guard = lock.lock().await;

        let mut agent = self
            .backend
            .get(agent_id)
            .await?
            .ok_or(LifecycleError::NotFound(agent_id))?;

        agent.last_heartbeat_at = Some(self.clock.now());
        self.metrics.write().await.insert(agent_id, metrics);

        if agent.status == AgentStatus::Offline {
            let from = agent.status;
            agent.status = AgentStatus::Active;
            self.backend.update(agent.clone()).await?;
            self.record_transition(
                &agent,
                from,
                AgentStatus::Active,
                "heartbeat resumed",
                "system:surveillance",
                correlation_id,
                None,
            )
            .await?;
        } else {
            self.backend.update(agent).await?;
        }

        Ok(())
    }

    /// Transition an `Active` agent to `Offline` after a heartbeat timeout
    /// (spec §4.2 table; called by the Surveillance Engine).
    #[tracing::instrument(skip(self))]
    pub async fn mark_offline_due_to_timeout(
        &self,
        agent_id: AgentId,
        correlation_id: CorrelationId,
    ) -> Result<(), LifecycleError> {
        let lock = self.agent_lock(agent_id).await;
        let _guard = lock.lock().await;

        let mut agent = self
            .backend
            .get(agent_id)
            .await?
            .ok_or(LifecycleError::NotFound(agent_id))?;

        if agent.status != AgentStatus::Active {
            return Ok(());
        }

        agent.security_score = clamp_score(agent.security_score + crate::score::HEARTBEAT_FAILURE_DELTA);
        agent.status = AgentStatus::Offline;
        agent.last_score_update_at = Some(self.clock.now());
        self.backend.update(agent.clone()).await?;

        self.record_transition(
            &agent,
            AgentStatus::Active,
            AgentStatus::Offline,
            "heartbeat timeout",
            "system:surveillance",
            correlation_id,
            None,
        )
        .await?;

        Ok(())
    }

    /// Apply a score delta outside the violation path (spec §4.2 "good
    /// behavior tick", "failed/passed compliance check"). Never reverses a
    /// status a prior rule already chose, but re-runs the threshold ladder
    /// so a tick that pushes score back above a warning boundary is
    /// reflected immediately.
    #[tracing::instrument(skip(self, reason))]
    pub async fn adjust_score(
        &self,
        agent_id: AgentId,
        delta: i32,
        reason: &str,
        correlation_id: CorrelationId,
    ) -> Result<i32, LifecycleError> {
        let lock = self.agent_lock(agent_id).await;
        let _guard = lock.lock().await;

        let mut agent = self
            .backend
            .get(agent_id)
            .await?
            .ok_or(LifecycleError::NotFound(agent_id))?;

        if agent.status.is_terminal() {
            return Err(LifecycleError::Immutable {
                agent_id,
                status: status_label(agent.status),
            });
        }

        let from = agent.status;
        let score = clamp_score(agent.security_score + delta);
        let threshold_outcome = apply_thresholds(
            from,
            score,
            self.config.auto_suspend_on_security_violation,
            &self.score_thresholds,
        );

        agent.security_score = score;
        agent.status = threshold_outcome.status;
        agent.last_score_update_at = Some(self.clock.now());
        self.backend.update(agent.clone()).await?;

        let draft = ActivityDraft::new(
            agent.agent_id,
            agent.tenant_id,
            ActivityType::SystemModification,
            format!("score adjustment ({delta:+}): {reason}"),
        )
        .with_correlation_id(correlation_id)
        .with_category("score_adjustment")
        .with_context("delta", serde_json::json!(delta))
        .with_context("new_score", serde_json::json!(score));
        self.audit.append(draft, negligible_assessment()).await?;

        if threshold_outcome.status != from {
            self.record_transition(
                &agent,
                from,
                threshold_outcome.status,
                reason,
                "system:surveillance",
                correlation_id,
                None,
            )
            .await?;
        }

        Ok(score)
    }

    pub async fn get(&self, agent_id: AgentId) -> Result<Agent, LifecycleError> {
        self.backend
            .get(agent_id)
            .await?
            .ok_or(LifecycleError::NotFound(agent_id))
    }

    pub async fn list_by_status(
        &self,
        tenant_id: Option<TenantId>,
        statuses: &[AgentStatus],
    ) -> Result<Vec<Agent>, LifecycleError> {
        self.backend.list_by_status(tenant_id, statuses).await
    }

    pub async fn list_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<Agent>, LifecycleError> {
        self.backend.list_by_tenant(tenant_id).await
    }

    pub async fn latest_metrics(&self, agent_id: AgentId) -> Option<AgentMetrics> {
        self.metrics.read().await.get(&agent_id).copied()
    }
}
