//! Sentinel: the Surveillance Engine (spec §4.5).
//!
//! A long-running supervisory loop, independent of any user-driven event,
//! that periodically evaluates every active agent's health, behavior, and
//! API pattern and feeds the results back through `sentinel-lifecycle` and
//! `sentinel-notify`.

pub mod analyzer;
pub mod engine;
pub mod error;
pub mod health;

pub use analyzer::{severity_for_score, AnalysisInput, AnalysisOutput, BehaviorAnalyzer, HeuristicBehaviorAnalyzer};
pub use engine::{CycleReport, SurveillanceEngine};
pub use error::SurveillanceError;
pub use health::{check_health, HealthBreach};

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_audit::AuditStore;
    use sentinel_core::config::SurveillanceConfig;
    use sentinel_core::{system_clock, AgentStatus, TenantId};
    use sentinel_freeze::FreezeRegistry;
    use sentinel_lifecycle::{AgentSpec, LifecycleAction, LifecycleManager};
    use sentinel_notify::NotificationBus;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn build() -> (SurveillanceEngine, Arc<LifecycleManager>) {
        let clock = system_clock();
        let audit = Arc::new(AuditStore::in_memory(clock.clone()));
        let freeze = Arc::new(FreezeRegistry::in_memory(clock.clone()));
        let notify = Arc::new(NotificationBus::in_memory(vec![], Default::default(), clock.clone()));
        let lifecycle = Arc::new(LifecycleManager::in_memory(
            audit.clone(),
            freeze,
            notify.clone(),
            clock.clone(),
            Default::default(),
            Default::default(),
            86_400,
            HashSet::new(),
        ));
        let mut config = SurveillanceConfig::default();
        config.heartbeat_timeout_seconds = 1;
        let engine = SurveillanceEngine::new(
            lifecycle.clone(),
            audit,
            notify,
            Arc::new(HeuristicBehaviorAnalyzer),
            config,
            Default::default(),
            clock,
        );
        (engine, lifecycle)
    }

    #[tokio::test]
    async fn stale_heartbeat_is_marked_offline() {
        let (engine, lifecycle) = build();
        let tenant = TenantId::new();
        let agent = lifecycle
            .register_agent(AgentSpec {
                tenant_id: tenant,
                name: "scout".to_string(),
                agent_type: "worker".to_string(),
                version: "1.0.0".to_string(),
                capabilities: Vec::new(),
                permissions: Vec::new(),
                registered_by: "admin-1".to_string(),
            })
            .await
            .unwrap();
        lifecycle
            .execute_action(
                agent.agent_id,
                LifecycleAction::Activate,
                "admin-1",
                "go live",
                None,
                sentinel_core::CorrelationId::new(),
            )
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let report = engine.run_cycle(Some(tenant)).await;
        assert_eq!(report.agents_scanned, 1);
        assert_eq!(report.marked_offline, 1);

        let agent = lifecycle.get(agent.agent_id).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Offline);
    }

    #[tokio::test]
    async fn healthy_agent_without_heartbeat_timeout_receives_good_behavior_tick() {
        let (engine, lifecycle) = build();
        let tenant = TenantId::new();
        let agent = lifecycle
            .register_agent(AgentSpec {
                tenant_id: tenant,
                name: "scout".to_string(),
                agent_type: "worker".to_string(),
                version: "1.0.0".to_string(),
                capabilities: Vec::new(),
                permissions: Vec::new(),
                registered_by: "admin-1".to_string(),
            })
            .await
            .unwrap();
        let agent = match lifecycle
            .execute_action(
                agent.agent_id,
                LifecycleAction::Activate,
                "admin-1",
                "go live",
                None,
                sentinel_core::CorrelationId::new(),
            )
            .await
            .unwrap()
        {
            sentinel_lifecycle::ActionOutcome::Executed { agent } => agent,
            _ => panic!("expected executed"),
        };
        lifecycle
            .heartbeat(
                agent.agent_id,
                Default::default(),
                sentinel_core::CorrelationId::new(),
            )
            .await
            .unwrap();

        let report = engine.run_cycle(Some(tenant)).await;
        assert_eq!(report.good_behavior_ticks, 1);

        let agent = lifecycle.get(agent.agent_id).await.unwrap();
        assert_eq!(agent.security_score, 100, "score stays clamped at 100");
    }
}
