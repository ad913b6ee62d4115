//! Storage seam for agents and their tenant quota counters (spec §3
//! Tenant Quota / §5 "quota check and agent insert performed inside the
//! same transaction").
//!
//! Grounded on `arbiter::locks::LockManager`'s single `RwLock<HashMap<..>>`
//! guarding both the presence check and the insert in one critical
//! section -- generalized here to guard name-uniqueness and the quota
//! counter in that same section, which is the property spec §8 property 1
//! ("quota safety (concurrent)") depends on.

use std::collections::HashMap;

use async_trait::async_trait;
use sentinel_core::{AgentId, AgentStatus, TenantId};
use tokio::sync::RwLock;

use crate::agent::Agent;
use crate::error::LifecycleError;

#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn get(&self, agent_id: AgentId) -> Result<Option<Agent>, LifecycleError>;

    /// Atomically: reject `DuplicateName` if `(tenant_id, name)` exists,
    /// reject `QuotaExceeded` if the tenant is already at `max_agents`,
    /// otherwise insert and increment the tenant's counter.
    async fn register(&self, agent: Agent, max_agents: u32) -> Result<Agent, LifecycleError>;

    async fn update(&self, agent: Agent) -> Result<(), LifecycleError>;

    /// Decrement the tenant's quota counter (called once, on decommission).
    async fn decrement_quota(&self, tenant_id: TenantId) -> Result<(), LifecycleError>;

    async fn tenant_count(&self, tenant_id: TenantId) -> Result<u32, LifecycleError>;

    async fn list_by_status(
        &self,
        tenant_id: Option<TenantId>,
        statuses: &[AgentStatus],
    ) -> Result<Vec<Agent>, LifecycleError>;

    async fn list_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<Agent>, LifecycleError>;
}

#[derive(Default)]
struct Inner {
    agents: HashMap<AgentId, Agent>,
    names: HashMap<(TenantId, String), AgentId>,
    quota_counts: HashMap<TenantId, u32>,
}

#[derive(Default)]
pub struct InMemoryAgentBackend {
    inner: RwLock<Inner>,
}

impl InMemoryAgentBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentBackend for InMemoryAgentBackend {
    async fn get(&self, agent_id: AgentId) -> Result<Option<Agent>, LifecycleError> {
        Ok(self.inner.read().await.agents.get(&agent_id).cloned())
    }

    async fn register(&self, agent: Agent, max_agents: u32) -> Result<Agent, LifecycleError> {
        let mut inner = self.inner.write().await;
        let name_key = (agent.tenant_id, agent.name.clone());
        if inner.names.contains_key(&name_key) {
            return Err(LifecycleError::DuplicateName { name: agent.name });
        }
        let count = inner.quota_counts.get(&agent.tenant_id).copied().unwrap_or(0);
        if count >= max_agents {
            return Err(LifecycleError::QuotaExceeded);
        }
        inner.names.insert(name_key, agent.agent_id);
        inner.quota_counts.insert(agent.tenant_id, count + 1);
        inner.agents.insert(agent.agent_id, agent.clone());
        Ok(agent)
    }

    async fn update(&self, agent: Agent) -> Result<(), LifecycleError> {
        let mut inner = self.inner.write().await;
        inner.agents.insert(agent.agent_id, agent);
        Ok(())
    }

    async fn decrement_quota(&self, tenant_id: TenantId) -> Result<(), LifecycleError> {
        let mut inner = self.inner.write().await;
        if let Some(count) = inner.quota_counts.get_mut(&tenant_id) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }

    async fn tenant_count(&self, tenant_id: TenantId) -> Result<u32, LifecycleError> {
        Ok(self
            .inner
            .read()
            .await
            .quota_counts
            .get(&tenant_id)
            .copied()
            .unwrap_or(0))
    }

    async fn list_by_status(
        &self,
        tenant_id: Option<TenantId>,
        statuses: &[AgentStatus],
    ) -> Result<Vec<Agent>, LifecycleError> {
        let inner = self.inner.read().await;
        Ok(inner
            .agents
            .values()
            .filter(|a| tenant_id.map(|t| a.tenant_id == t).unwrap_or(true))
            .filter(|a| statuses.contains(&a.status))
            .cloned()
            .collect())
    }

    async fn list_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<Agent>, LifecycleError> {
        let inner = self.inner.read().await;
        Ok(inner
            .agents
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}
