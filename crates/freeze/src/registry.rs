//! The Freeze Registry (spec §4.4): the single authoritative cache of
//! which agents, modules, and the system as a whole are currently frozen.
//!
//! Grounded on `arbiter::killswitch::KillSwitch` (`terminated_agents`/
//! `terminated_swarms` sets plus a global `emergency_shutdown` flag checked
//! first by every alive-check) and `arbiter::locks::LockManager`'s
//! resource-keyed `RwLock<HashMap<..>>`, generalized to the spec's
//! scope-precedence rule (System > Module > Agent) and to an explicit
//! unfreeze path gated on a named admin principal, which the teacher's
//! kill switch does not need (it has no "un-kill").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sentinel_core::{ActivityId, Clock, FreezeId, FreezeScope, RiskLevel, SharedClock};
use tokio::sync::RwLock;

use crate::error::FreezeError;
use crate::record::{scope_key, FreezeRecord};

/// Storage seam for freeze state. The in-memory default mirrors the
/// teacher's `RwLock<HashMap<..>>`; a real backend only needs read-after-
/// write consistency within the process boundary it serves (spec §5).
#[async_trait]
pub trait FreezeBackend: Send + Sync {
    /// The currently active record for `scope`, if any.
    async fn active(&self, scope: &FreezeScope) -> Result<Option<FreezeRecord>, FreezeError>;

    /// Insert a new active record, replacing nothing (the caller has
    /// already checked `active` returned `None` for idempotency).
    async fn insert(&self, record: FreezeRecord) -> Result<(), FreezeError>;

    /// Mark the active record for `scope` unfrozen. No-op if none is active.
    async fn deactivate(
        &self,
        scope: &FreezeScope,
        authorized_by: &str,
        reason: &str,
        unfrozen_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<FreezeRecord>, FreezeError>;

    async fn all_active(&self) -> Result<Vec<FreezeRecord>, FreezeError>;
}

#[derive(Default)]
pub struct InMemoryFreezeBackend {
    active: RwLock<HashMap<String, FreezeRecord>>,
}

impl InMemoryFreezeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FreezeBackend for InMemoryFreezeBackend {
    async fn active(&self, scope: &FreezeScope) -> Result<Option<FreezeRecord>, FreezeError> {
        let guard = self.active.read().await;
        Ok(guard.get(&scope_key(scope)).cloned())
    }

    async fn insert(&self, record: FreezeRecord) -> Result<(), FreezeError> {
        let mut guard = self.active.write().await;
        guard.insert(scope_key(&record.scope), record);
        Ok(())
    }

    async fn deactivate(
        &self,
        scope: &FreezeScope,
        authorized_by: &str,
        reason: &str,
        unfrozen_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<FreezeRecord>, FreezeError> {
        let mut guard = self.active.write().await;
        if let Some(record) = guard.get_mut(&scope_key(scope)) {
            record.unfreeze_timestamp = Some(unfrozen_at);
            record.unfreeze_authorized_by = Some(authorized_by.to_string());
            record.unfreeze_reason = Some(reason.to_string());
            let resolved = record.clone();
            guard.remove(&scope_key(scope));
            return Ok(Some(resolved));
        }
        Ok(None)
    }

    async fn all_active(&self) -> Result<Vec<FreezeRecord>, FreezeError> {
        let guard = self.active.read().await;
        Ok(guard.values().cloned().collect())
    }
}

/// Result of a `freeze()` call: whether a new record was created, or an
/// existing one was returned because the scope was already frozen (spec
/// §4.4: "idempotent per scope ... emits no duplicate notification").
#[derive(Debug, Clone)]
pub struct FreezeOutcome {
    pub record: FreezeRecord,
    pub newly_frozen: bool,
}

pub struct FreezeRegistry {
    backend: Arc<dyn FreezeBackend>,
    clock: SharedClock,
}

impl FreezeRegistry {
    pub fn new(backend: Arc<dyn FreezeBackend>, clock: SharedClock) -> Self {
        Self { backend, clock }
    }

    pub fn in_memory(clock: SharedClock) -> Self {
        Self::new(Arc::new(InMemoryFreezeBackend::new()), clock)
    }

    /// True if `scope` itself, or the system as a whole, is frozen. Does
    /// NOT account for module membership -- callers that need "is this
    /// agent frozen, directly or via its module" should call
    /// `is_any_frozen` with both scopes (spec §4.4: module identity is
    /// caller-defined, so this registry cannot derive it on its own).
    #[tracing::instrument(skip(self))]
    pub async fn is_frozen(&self, scope: &FreezeScope) -> Result<bool, FreezeError> {
        if !matches!(scope, FreezeScope::System)
            && self.backend.active(&FreezeScope::System).await?.is_some()
        {
            return Ok(true);
        }
        Ok(self.backend.active(scope).await?.is_some())
    }

    /// True if any of `scopes` is frozen (system freeze is checked once,
    /// implicitly, via `is_frozen`). Use this to fold an agent's own scope
    /// and its module scope(s) into one fail-closed check.
    pub async fn is_any_frozen(&self, scopes: &[FreezeScope]) -> Result<bool, FreezeError> {
        for scope in scopes {
            if self.is_frozen(scope).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Freeze `scope`. Idempotent: freezing an already-frozen scope returns
    /// the existing record with `newly_frozen = false` and does not touch
    /// the backend (spec §4.4).
    #[tracing::instrument(skip(self, reason))]
    pub async fn freeze(
        &self,
        scope: FreezeScope,
        reason: impl Into<String>,
        triggering_activity_id: Option<ActivityId>,
        risk_level: RiskLevel,
    ) -> Result<FreezeOutcome, FreezeError> {
        if let Some(existing) = self.backend.active(&scope).await? {
            return Ok(FreezeOutcome {
                record: existing,
                newly_frozen: false,
            });
        }

        let record = FreezeRecord {
            freeze_id: FreezeId::new(),
            scope: scope.clone(),
            freeze_timestamp: self.clock.now(),
            unfreeze_timestamp: None,
            reason: reason.into(),
            triggering_activity_id,
            risk_level,
            unfreeze_authorized_by: None,
            unfreeze_reason: None,
        };
        self.backend.insert(record.clone()).await?;
        tracing::warn!(scope = %scope_key(&scope), "scope frozen");
        Ok(FreezeOutcome {
            record,
            newly_frozen: true,
        })
    }

    /// Unfreeze `scope`. Only meaningful when called with a named admin
    /// principal (spec §4.4); this crate does not authenticate `authorized_by`
    /// -- that is the out-of-scope auth boundary's job (spec §1) -- but
    /// requires a non-empty principal as a structural guard.
    #[tracing::instrument(skip(self, reason))]
    pub async fn unfreeze(
        &self,
        scope: &FreezeScope,
        authorized_by: &str,
        reason: impl Into<String>,
    ) -> Result<FreezeRecord, FreezeError> {
        if authorized_by.trim().is_empty() {
            return Err(FreezeError::NotAuthorized {
                actor: authorized_by.to_string(),
            });
        }
        let reason = reason.into();
        match self
            .backend
            .deactivate(scope, authorized_by, &reason, self.clock.now())
            .await?
        {
            Some(record) => {
                tracing::warn!(scope = %scope_key(scope), by = authorized_by, "scope unfrozen");
                Ok(record)
            }
            None => Err(FreezeError::NotFound(scope_key(scope))),
        }
    }

    pub async fn frozen_entities(&self) -> Result<Vec<FreezeRecord>, FreezeError> {
        self.backend.all_active().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{system_clock, AgentId};

    #[tokio::test]
    async fn freeze_is_idempotent_per_scope() {
        let registry = FreezeRegistry::in_memory(system_clock());
        let agent = AgentId::new();
        let scope = FreezeScope::Agent(agent);

        let first = registry
            .freeze(scope.clone(), "violation", None, RiskLevel::Critical)
            .await
            .unwrap();
        assert!(first.newly_frozen);

        let second = registry
            .freeze(scope.clone(), "violation again", None, RiskLevel::Critical)
            .await
            .unwrap();
        assert!(!second.newly_frozen);
        assert_eq!(second.record.freeze_id, first.record.freeze_id);
    }

    #[tokio::test]
    async fn system_freeze_dominates_agent_scope() {
        let registry = FreezeRegistry::in_memory(system_clock());
        let agent = AgentId::new();

        assert!(!registry
            .is_frozen(&FreezeScope::Agent(agent))
            .await
            .unwrap());

        registry
            .freeze(FreezeScope::System, "integrity violation", None, RiskLevel::Emergency)
            .await
            .unwrap();

        assert!(registry
            .is_frozen(&FreezeScope::Agent(agent))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn unfreeze_requires_named_principal() {
        let registry = FreezeRegistry::in_memory(system_clock());
        let scope = FreezeScope::Module("ingestion".to_string());
        registry
            .freeze(scope.clone(), "anomaly", None, RiskLevel::High)
            .await
            .unwrap();

        let err = registry.unfreeze(&scope, "", "resolved").await.unwrap_err();
        assert!(matches!(err, FreezeError::NotAuthorized { .. }));

        let record = registry
            .unfreeze(&scope, "admin-1", "resolved")
            .await
            .unwrap();
        assert!(!record.is_active());
        assert!(!registry.is_frozen(&scope).await.unwrap());
    }

    #[tokio::test]
    async fn unfreeze_without_active_freeze_is_not_found() {
        let registry = FreezeRegistry::in_memory(system_clock());
        let scope = FreezeScope::Agent(AgentId::new());
        let err = registry
            .unfreeze(&scope, "admin-1", "n/a")
            .await
            .unwrap_err();
        assert!(matches!(err, FreezeError::NotFound(_)));
    }
}
