//! Sentinel: the Agent Manager Façade (spec §4.7).
//!
//! The only component the external API layer talks to. Composes the six
//! subsystems (Clock & Identity lives in `sentinel-core` and is threaded
//! through all of them) behind one explicit dependency graph, built once
//! at startup -- no module-level globals, matching the redesign note in
//! spec §9 that replaces the source's singleton "Supreme Agent Manager".
//!
//! Grounded on `arbiter::coordinator::Coordinator`, the teacher's "compose
//! every pillar manager behind one API, constructed once and handed an
//! `Arc` of each dependency" shape.

pub mod dashboard;
pub mod pipeline;

use std::collections::HashSet;
use std::sync::Arc;

use sentinel_audit::{Activity, ActivityFilter, AuditStore, ChainVerification, Window};
use sentinel_classify::{ClassifierConfig, RiskClassifier};
use sentinel_core::{
    config::NotificationChannelSeverities, system_clock, ActivityId, ActivityType, AgentId,
    ApprovalId, CorrelationId, DomainEvent, EventSink, LoggingEventSink, NotificationId, Result,
    SentinelConfig, SharedClock, TenantId, ViolationSeverity,
};
use sentinel_freeze::{FreezeRecord, FreezeRegistry};
use sentinel_lifecycle::{
    Agent, AgentMetrics, AgentSpec, ActionOutcome, LifecycleAction, LifecycleManager,
    ViolationOutcome,
};
use sentinel_notify::{
    ApprovalAction, ApprovalRequest, Notification, NotificationBus, NotificationDecision,
};
use sentinel_surveillance::{BehaviorAnalyzer, CycleReport, HeuristicBehaviorAnalyzer, SurveillanceEngine};

pub use dashboard::{AgentComplianceSummary, AttentionItem, ComplianceReport, DashboardSummary};
pub use pipeline::{LogActivityInput, LogActivityResult};

use pipeline::Pipeline;

/// Everything the Façade needs to construct its subsystem graph. Mirrors
/// `SentinelConfig` (spec §6) plus the pieces that are not plain config --
/// a clock, a channel fan-out, and the known-capability registry spec §9
/// calls for in place of the source's duck-typed dicts.
pub struct FacadeDependencies {
    pub config: SentinelConfig,
    pub clock: SharedClock,
    pub channels: Vec<Arc<dyn sentinel_notify::NotificationChannel>>,
    pub behavior_analyzer: Arc<dyn BehaviorAnalyzer>,
    pub known_capabilities: HashSet<String>,
    pub event_sink: Arc<dyn EventSink>,
}

impl Default for FacadeDependencies {
    fn default() -> Self {
        Self {
            config: SentinelConfig::default(),
            clock: system_clock(),
            channels: Vec::new(),
            behavior_analyzer: Arc::new(HeuristicBehaviorAnalyzer),
            known_capabilities: HashSet::new(),
            event_sink: Arc::new(LoggingEventSink),
        }
    }
}

/// The Agent Manager Façade (spec §4.7): the single entry point the
/// external API layer talks to.
pub struct AgentManagerFacade {
    lifecycle: Arc<LifecycleManager>,
    audit: Arc<AuditStore>,
    freeze: Arc<FreezeRegistry>,
    notify: Arc<NotificationBus>,
    classifier: RiskClassifier,
    surveillance: Arc<SurveillanceEngine>,
    clock: SharedClock,
    event_sink: Arc<dyn EventSink>,
}

impl AgentManagerFacade {
    /// Build the full subsystem graph in-memory, wiring each component's
    /// backing store handle to the others the way spec §9 calls for
    /// ("each component owns its backing store handle; the Façade is
    /// constructed once at startup and passed where needed").
    pub fn in_memory(deps: FacadeDependencies) -> Self {
        let clock = deps.clock;
        let audit = Arc::new(AuditStore::in_memory(clock.clone()));
        let freeze = Arc::new(FreezeRegistry::in_memory(clock.clone()));
        let severities = NotificationChannelSeverities {
            email: deps.config.notifications.email,
            slack: deps.config.notifications.slack,
            pager: deps.config.notifications.pager,
        };
        let notify = Arc::new(NotificationBus::in_memory(deps.channels, severities, clock.clone()));
        let lifecycle = Arc::new(LifecycleManager::in_memory(
            audit.clone(),
            freeze.clone(),
            notify.clone(),
            clock.clone(),
            deps.config.agent_lifecycle.clone(),
            deps.config.score.clone(),
            deps.config.approval.ttl_seconds,
            deps.known_capabilities,
        ));
        let surveillance = Arc::new(SurveillanceEngine::new(
            lifecycle.clone(),
            audit.clone(),
            notify.clone(),
            deps.behavior_analyzer,
            deps.config.surveillance.clone(),
            deps.config.thresholds.clone(),
            clock.clone(),
        ));
        let classifier = RiskClassifier::new(ClassifierConfig::default());

        Self {
            lifecycle,
            audit,
            freeze,
            notify,
            classifier,
            surveillance,
            clock,
            event_sink: deps.event_sink,
        }
    }

    /// The Surveillance Engine this Façade composed, for the caller to
    /// spawn `run_forever` on (or drive `run_cycle` directly in tests). The
    /// Façade does not spawn the loop itself -- spec §9 treats the
    /// supervisory loop as a supervised worker the embedding process owns.
    pub fn surveillance(&self) -> Arc<SurveillanceEngine> {
        self.surveillance.clone()
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            lifecycle: &self.lifecycle,
            audit: &self.audit,
            freeze: &self.freeze,
            notify: &self.notify,
            classifier: &self.classifier,
            event_sink: self.event_sink.as_ref(),
        }
    }

    // ---- Lifecycle ----------------------------------------------------

    pub async fn register_agent(&self, spec: AgentSpec) -> Result<Agent> {
        Ok(self.lifecycle.register_agent(spec).await?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn execute_action(
        &self,
        agent_id: AgentId,
        action: LifecycleAction,
        actor: &str,
        reason: impl Into<String>,
        approval_id: Option<ApprovalId>,
        correlation_id: CorrelationId,
    ) -> Result<ActionOutcome> {
        Ok(self
            .lifecycle
            .execute_action(agent_id, action, actor, reason, approval_id, correlation_id)
            .await?)
    }

    pub async fn handle_security_violation(
        &self,
        agent_id: AgentId,
        violation_type: &str,
        severity: ViolationSeverity,
        details: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Result<ViolationOutcome> {
        Ok(self
            .lifecycle
            .handle_security_violation(agent_id, violation_type, severity, details, correlation_id)
            .await?)
    }

    pub async fn heartbeat(
        &self,
        agent_id: AgentId,
        metrics: AgentMetrics,
        correlation_id: CorrelationId,
    ) -> Result<()> {
        Ok(self.lifecycle.heartbeat(agent_id, metrics, correlation_id).await?)
    }

    pub async fn get_agent(&self, agent_id: AgentId) -> Result<Agent> {
        Ok(self.lifecycle.get(agent_id).await?)
    }

    pub async fn list_agents(&self, tenant_id: TenantId) -> Result<Vec<Agent>> {
        Ok(self.lifecycle.list_by_tenant(tenant_id).await?)
    }

    // ---- Approval & Notification Bus -----------------------------------

    /// Supply an admin decision for a destructive-action approval request
    /// (spec §4.7 `approve_action`). Consumption against the matching
    /// `execute_action`'s `approval_id` gate happens separately and once,
    /// inside `LifecycleManager::execute_action` (spec §4.6 invariant).
    pub async fn approve_action(
        &self,
        approval_id: ApprovalId,
        admin_id: &str,
        notes: Option<String>,
    ) -> Result<ApprovalRequest> {
        let request = self.notify.approve(approval_id, admin_id, notes).await?;
        self.event_sink.publish(DomainEvent::ApprovalDecided { approval_id, approved: true });
        Ok(request)
    }

    pub async fn reject_action(
        &self,
        approval_id: ApprovalId,
        admin_id: &str,
        notes: Option<String>,
    ) -> Result<ApprovalRequest> {
        let request = self.notify.reject(approval_id, admin_id, notes).await?;
        self.event_sink.publish(DomainEvent::ApprovalDecided { approval_id, approved: false });
        Ok(request)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn request_approval(
        &self,
        action: ApprovalAction,
        target_agent_id: AgentId,
        requested_by: &str,
        reason: impl Into<String>,
        ttl_seconds: i64,
        tenant_id: Option<TenantId>,
    ) -> Result<ApprovalRequest> {
        let request = self
            .notify
            .request_approval(action, target_agent_id, requested_by, reason, ttl_seconds, tenant_id)
            .await?;
        self.event_sink.publish(DomainEvent::ApprovalRequested {
            approval_id: request.approval_id,
            agent_id: target_agent_id,
        });
        Ok(request)
    }

    pub async fn list_pending_notifications(
        &self,
        tenant_id: Option<TenantId>,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        Ok(self.notify.list_pending(tenant_id, limit).await?)
    }

    pub async fn respond_to_notification(
        &self,
        notification_id: NotificationId,
        admin_id: &str,
        decision: NotificationDecision,
    ) -> Result<Notification> {
        Ok(self.notify.respond(notification_id, admin_id, decision).await?)
    }

    /// Periodic sweep of expired approval requests (spec §4.6). The
    /// embedding process is expected to call this on its own interval,
    /// alongside `surveillance().run_forever`.
    pub async fn sweep_expired_approvals(&self) -> Result<Vec<ApprovalId>> {
        Ok(self.notify.sweep_expired().await?)
    }

    // ---- Freeze Registry ------------------------------------------------

    pub async fn get_frozen_entities(&self) -> Result<Vec<FreezeRecord>> {
        Ok(self.freeze.frozen_entities().await?)
    }

    /// Unfreeze `scope` (spec §4.4: "every freeze and unfreeze emits an
    /// Activity and a Notification" -- the freeze side gets both via the
    /// triggering activity and the `newly_frozen` notification in
    /// `LifecycleManager::handle_security_violation`; this mirrors it).
    pub async fn unfreeze(
        &self,
        scope: sentinel_core::FreezeScope,
        authorized_by: &str,
        reason: impl Into<String>,
    ) -> Result<FreezeRecord> {
        let reason = reason.into();
        let record = self.freeze.unfreeze(&scope, authorized_by, &reason).await?;

        let mut notification_draft = sentinel_notify::NotificationDraft::new(
            record.risk_level,
            format!("{} unfrozen", sentinel_freeze::record::scope_key(&scope)),
            format!("{reason} (authorized by {authorized_by})"),
        );

        if let sentinel_core::FreezeScope::Agent(agent_id) = scope {
            if let Ok(agent) = self.lifecycle.get(agent_id).await {
                let draft = sentinel_audit::ActivityDraft::new(
                    agent_id,
                    agent.tenant_id,
                    ActivityType::SystemModification,
                    format!("agent unfrozen by {authorized_by}: {reason}"),
                )
                .with_category("freeze_lifecycle")
                .with_context("authorized_by", serde_json::json!(authorized_by));
                let assessment = sentinel_core::RiskAssessment {
                    risk_level: sentinel_core::RiskLevel::Negligible,
                    compliance_flags: Vec::new(),
                    requires_review: false,
                    recommended_actions: Vec::new(),
                    system_action: sentinel_core::SystemAction::None,
                };
                let activity = self.audit.append_with_retry(draft, assessment).await?;
                notification_draft = notification_draft
                    .with_agent(agent_id)
                    .with_activity(activity.activity_id)
                    .with_tenant(agent.tenant_id);
            }
        }
        self.notify.notify(notification_draft).await?;

        self.event_sink.publish(DomainEvent::EntityUnfrozen {
            scope,
            authorized_by: authorized_by.to_string(),
        });
        Ok(record)
    }

    // ---- Activity pipeline (the hot path, spec §4.7) --------------------

    pub async fn log_interaction(&self, input: LogActivityInput) -> Result<LogActivityResult> {
        debug_assert_eq!(input.activity_type, ActivityType::Interaction);
        self.pipeline().run(input).await
    }

    pub async fn log_knowledge(&self, input: LogActivityInput) -> Result<LogActivityResult> {
        debug_assert_eq!(input.activity_type, ActivityType::KnowledgeGained);
        self.pipeline().run(input).await
    }

    pub async fn log_process(&self, input: LogActivityInput) -> Result<LogActivityResult> {
        debug_assert_eq!(input.activity_type, ActivityType::ProcessExecution);
        self.pipeline().run(input).await
    }

    pub async fn log_data_access(&self, input: LogActivityInput) -> Result<LogActivityResult> {
        debug_assert_eq!(input.activity_type, ActivityType::DataAccess);
        self.pipeline().run(input).await
    }

    pub async fn report_error(&self, input: LogActivityInput) -> Result<LogActivityResult> {
        debug_assert_eq!(input.activity_type, ActivityType::Error);
        self.pipeline().run(input).await
    }

    // ---- Audit / compliance read paths ----------------------------------

    pub async fn get_activity_log(
        &self,
        agent_id: AgentId,
        window: Option<Window>,
        filter: ActivityFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Activity>> {
        Ok(self.audit.query(agent_id, window, filter, limit, offset).await?)
    }

    pub async fn verify_chain(
        &self,
        agent_id: AgentId,
        from: u64,
        to: u64,
    ) -> Result<ChainVerification> {
        Ok(self.audit.verify_chain(agent_id, from, to).await?)
    }

    pub async fn mark_reviewed(&self, activity_id: ActivityId, reviewer: &str) -> Result<Activity> {
        let original = self
            .audit
            .get(activity_id)
            .await?
            .ok_or(sentinel_core::Error::NotFound {
                kind: "activity",
                id: activity_id.to_string(),
            })?;
        Ok(self.audit.mark_reviewed(&original, reviewer).await?)
    }

    // ---- Dashboard / compliance (spec §4.7) -----------------------------

    pub async fn get_dashboard(&self, tenant_id: TenantId, _admin_id: &str) -> Result<DashboardSummary> {
        dashboard::build(&self.lifecycle, &self.freeze, &self.notify, tenant_id).await
    }

    pub async fn generate_compliance_report(
        &self,
        tenant_id: TenantId,
        range: Window,
    ) -> Result<ComplianceReport> {
        let agents = self.lifecycle.list_by_tenant(tenant_id).await?;
        dashboard::generate_report(&self.audit, &agents, range).await
    }

    pub async fn run_surveillance_cycle(&self, tenant_id: Option<TenantId>) -> CycleReport {
        self.surveillance.run_cycle(tenant_id).await
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facade() -> AgentManagerFacade {
        let mut deps = FacadeDependencies::default();
        deps.known_capabilities.insert("batch".to_string());
        AgentManagerFacade::in_memory(deps)
    }

    fn spec(tenant_id: TenantId) -> AgentSpec {
        AgentSpec {
            tenant_id,
            name: "worker-1".to_string(),
            agent_type: "data_processor".to_string(),
            version: "1.0.0".to_string(),
            capabilities: vec!["batch".to_string()],
            permissions: Vec::new(),
            registered_by: "admin-1".to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_activate_then_log_interaction() {
        let facade = facade();
        let tenant = TenantId::new();
        let agent = facade.register_agent(spec(tenant)).await.unwrap();
        assert_eq!(agent.security_score, 100);

        let outcome = facade
            .execute_action(
                agent.agent_id,
                LifecycleAction::Activate,
                "admin-1",
                "go live",
                None,
                CorrelationId::new(),
            )
            .await
            .unwrap();
        let ActionOutcome::Executed { agent } = outcome else {
            panic!("expected executed");
        };
        assert_eq!(agent.status, sentinel_core::AgentStatus::Active);

        let result = facade
            .log_interaction(LogActivityInput::new(
                agent.agent_id,
                ActivityType::Interaction,
                "answered a user question",
            ))
            .await
            .unwrap();
        assert!(result.risk_assessed);
        assert_eq!(result.risk_level, sentinel_core::RiskLevel::Low);
    }

    #[tokio::test]
    async fn decommission_gated_behind_approval_end_to_end() {
        let facade = facade();
        let tenant = TenantId::new();
        let agent = facade.register_agent(spec(tenant)).await.unwrap();
        facade
            .execute_action(
                agent.agent_id,
                LifecycleAction::Activate,
                "admin-1",
                "go live",
                None,
                CorrelationId::new(),
            )
            .await
            .unwrap();
        // Decommission is only a valid transition from Frozen/Compromised
        // (spec §4.2), so drive the agent there with two Critical violations
        // first (same escalation path as S2).
        facade
            .handle_security_violation(
                agent.agent_id,
                "policy_breach",
                ViolationSeverity::Critical,
                "forced freeze for test",
                CorrelationId::new(),
            )
            .await
            .unwrap();
        facade
            .handle_security_violation(
                agent.agent_id,
                "policy_breach",
                ViolationSeverity::Critical,
                "second forced freeze for test",
                CorrelationId::new(),
            )
            .await
            .unwrap();

        let pending = facade
            .execute_action(
                agent.agent_id,
                LifecycleAction::Decommission,
                "admin-1",
                "cleanup",
                None,
                CorrelationId::new(),
            )
            .await
            .unwrap();
        let ActionOutcome::PendingApproval { approval_id } = pending else {
            panic!("expected pending approval");
        };

        facade
            .approve_action(approval_id, "admin-2", Some("reviewed".to_string()))
            .await
            .unwrap();

        let executed = facade
            .execute_action(
                agent.agent_id,
                LifecycleAction::Decommission,
                "admin-1",
                "cleanup",
                Some(approval_id),
                CorrelationId::new(),
            )
            .await
            .unwrap();
        assert!(matches!(executed, ActionOutcome::Executed { .. }));

        let replay = facade
            .execute_action(
                agent.agent_id,
                LifecycleAction::Decommission,
                "admin-1",
                "cleanup again",
                Some(approval_id),
                CorrelationId::new(),
            )
            .await;
        assert!(replay.is_err());
    }

    #[tokio::test]
    async fn system_freeze_fails_closed_on_log_activity() {
        let facade = facade();
        let tenant = TenantId::new();
        let agent = facade.register_agent(spec(tenant)).await.unwrap();

        facade
            .freeze
            .freeze(
                sentinel_core::FreezeScope::System,
                "manual test freeze",
                None,
                sentinel_core::RiskLevel::Emergency,
            )
            .await
            .unwrap();

        let err = facade
            .log_interaction(LogActivityInput::new(
                agent.agent_id,
                ActivityType::Interaction,
                "should be rejected",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, sentinel_core::Error::Frozen { .. }));

        let log = facade
            .get_activity_log(agent.agent_id, None, ActivityFilter::default(), 50, 0)
            .await
            .unwrap();
        assert!(
            log.iter().all(|a| a.description != "should be rejected"),
            "rejected attempt must not append an Activity"
        );
    }

    #[tokio::test]
    async fn dashboard_flags_low_score_agents() {
        let facade = facade();
        let tenant = TenantId::new();
        let agent = facade.register_agent(spec(tenant)).await.unwrap();
        facade
            .execute_action(
                agent.agent_id,
                LifecycleAction::Activate,
                "admin-1",
                "go live",
                None,
                CorrelationId::new(),
            )
            .await
            .unwrap();
        facade
            .handle_security_violation(
                agent.agent_id,
                "rate_limit_abuse",
                ViolationSeverity::Medium,
                "burst detected",
                CorrelationId::new(),
            )
            .await
            .unwrap();

        let dashboard = facade.get_dashboard(tenant, "admin-1").await.unwrap();
        assert_eq!(dashboard.total_agents, 1);
        assert_eq!(dashboard.agents_needing_attention.len(), 1);
    }
}
