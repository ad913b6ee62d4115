//! The Audit Store (spec §4.1): append-only, hash-chained per agent.
//!
//! Grounded on `arbiter::audit::AuditLedger`'s `Arc<RwLock<VecDeque<_>>>`
//! ring buffer and its `query_by_*` family of methods, generalized in two
//! ways the teacher's ledger did not need: a real hash chain per agent
//! (`prev_hash` verification), and a persistence-trait seam
//! (`AuditBackend`) so a real database can replace the in-memory default
//! without touching callers -- matching `sentinel-core`'s stated boundary
//! that persistence engine specifics are out of scope.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use sentinel_core::{ActivityId, AgentId, Clock, RiskAssessment, SharedClock};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::activity::{Activity, ActivityDraft, ActivityFilter, Window};
use crate::error::AuditError;

/// Result of `AuditStore::verify_chain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub valid: bool,
    pub first_break_at: Option<ActivityId>,
}

/// Storage seam for the audit log. The default `InMemoryAuditBackend`
/// mirrors the teacher's ledger; a `sql` feature could add a Postgres
/// implementation behind the same trait without touching `AuditStore`.
#[async_trait]
pub trait AuditBackend: Send + Sync {
    /// Returns `(prev_hash, next_position)` for the agent's chain, or the
    /// genesis values if the agent has no prior activity.
    async fn chain_head(&self, agent_id: AgentId) -> Result<(String, u64), AuditError>;

    /// Insert a fully-built activity at the given position. Must fail with
    /// `AuditError::ConcurrentWrite` if `position` was already taken for
    /// this agent (i.e. another append raced and won).
    async fn insert(&self, activity: Activity, position: u64) -> Result<(), AuditError>;

    async fn get(&self, activity_id: ActivityId) -> Result<Option<Activity>, AuditError>;

    async fn query(
        &self,
        agent_id: AgentId,
        window: Option<Window>,
        filter: ActivityFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Activity>, AuditError>;

    /// Activities for `agent_id` in chain-position order `[from, to]`,
    /// inclusive, used by `verify_chain`.
    async fn range(
        &self,
        agent_id: AgentId,
        from: u64,
        to: u64,
    ) -> Result<Vec<Activity>, AuditError>;
}

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000";

/// Canonical, deterministic byte representation of every field except
/// `hash_signature` -- the input to the chain hash. `BTreeMap` context and
/// `Vec` compliance flags are already construction-order-deterministic;
/// `serde_json`'s default (non-`preserve_order`) `Map` sorts object keys,
/// so nested JSON values hash deterministically too.
fn canonical_bytes(activity: &Activity) -> Vec<u8> {
    #[derive(serde::Serialize)]
    struct Canonical<'a> {
        activity_id: &'a ActivityId,
        correlation_id: &'a sentinel_core::CorrelationId,
        parent_activity_id: &'a Option<ActivityId>,
        agent_id: &'a AgentId,
        tenant_id: &'a sentinel_core::TenantId,
        timestamp: &'a chrono::DateTime<Utc>,
        activity_type: &'a sentinel_core::ActivityType,
        activity_category: &'a str,
        description: &'a str,
        context: &'a std::collections::BTreeMap<String, serde_json::Value>,
        user_id: &'a Option<String>,
        session_id: &'a Option<String>,
        input_hash: &'a Option<String>,
        output_hash: &'a Option<String>,
        knowledge_payload: &'a Option<serde_json::Value>,
        risk_level: &'a sentinel_core::RiskLevel,
        compliance_flags: &'a [String],
        requires_review: bool,
        reviewed_by: &'a Option<String>,
        reviewed_at: &'a Option<chrono::DateTime<Utc>>,
    }

    let canonical = Canonical {
        activity_id: &activity.activity_id,
        correlation_id: &activity.correlation_id,
        parent_activity_id: &activity.parent_activity_id,
        agent_id: &activity.agent_id,
        tenant_id: &activity.tenant_id,
        timestamp: &activity.timestamp,
        activity_type: &activity.activity_type,
        activity_category: &activity.activity_category,
        description: &activity.description,
        context: &activity.context,
        user_id: &activity.user_id,
        session_id: &activity.session_id,
        input_hash: &activity.input_hash,
        output_hash: &activity.output_hash,
        knowledge_payload: &activity.knowledge_payload,
        risk_level: &activity.risk_level,
        compliance_flags: &activity.compliance_flags,
        requires_review: activity.requires_review,
        reviewed_by: &activity.reviewed_by,
        reviewed_at: &activity.reviewed_at,
    };

    // Infallible: every field is a plain serde type with no custom
    // fallible serialization.
    serde_json::to_vec(&canonical).expect("canonical activity serialization cannot fail")
}

fn compute_hash(prev_hash: &str, activity: &Activity) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(canonical_bytes(activity));
    format!("{:x}", hasher.finalize())
}

/// In-memory default backend: one `Vec<Activity>` per agent behind a
/// single `RwLock`, matching the teacher's whole-ledger lock idiom. Each
/// agent's `Vec` index is its chain position.
#[derive(Default)]
pub struct InMemoryAuditBackend {
    by_agent: RwLock<HashMap<AgentId, Vec<Activity>>>,
}

impl InMemoryAuditBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-only hook for the tamper-detection property (spec §8.3): mutate
    /// a committed field in place, bypassing the append-only contract, the
    /// way an external actor tampering with the backing table would.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn tamper(&self, agent_id: AgentId, position: usize, new_description: &str) {
        let mut guard = self.by_agent.write().await;
        if let Some(rows) = guard.get_mut(&agent_id) {
            if let Some(row) = rows.get_mut(position) {
                row.description = new_description.to_string();
            }
        }
    }
}

#[async_trait]
impl AuditBackend for InMemoryAuditBackend {
    async fn chain_head(&self, agent_id: AgentId) -> Result<(String, u64), AuditError> {
        let guard = self.by_agent.read().await;
        match guard.get(&agent_id) {
            Some(rows) if !rows.is_empty() => {
                let last = rows.last().expect("checked non-empty");
                Ok((last.hash_signature.clone(), rows.len() as u64))
            }
            _ => Ok((GENESIS_HASH.to_string(), 0)),
        }
    }

    async fn insert(&self, activity: Activity, position: u64) -> Result<(), AuditError> {
        let mut guard = self.by_agent.write().await;
        let rows = guard.entry(activity.agent_id).or_default();
        if rows.len() as u64 != position {
            return Err(AuditError::ConcurrentWrite(activity.agent_id));
        }
        rows.push(activity);
        Ok(())
    }

    async fn get(&self, activity_id: ActivityId) -> Result<Option<Activity>, AuditError> {
        let guard = self.by_agent.read().await;
        Ok(guard
            .values()
            .flatten()
            .find(|a| a.activity_id == activity_id)
            .cloned())
    }

    async fn query(
        &self,
        agent_id: AgentId,
        window: Option<Window>,
        filter: ActivityFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Activity>, AuditError> {
        let guard = self.by_agent.read().await;
        let rows = guard.get(&agent_id).cloned().unwrap_or_default();

        let mut matched: Vec<Activity> = rows
            .into_iter()
            .filter(|a| match window {
                Some(w) => a.timestamp >= w.from && a.timestamp <= w.to,
                None => true,
            })
            .filter(|a| filter.risk_level.map(|r| r == a.risk_level).unwrap_or(true))
            .filter(|a| {
                filter
                    .requires_review
                    .map(|r| r == a.requires_review)
                    .unwrap_or(true)
            })
            .filter(|a| {
                filter
                    .activity_type
                    .map(|t| t == a.activity_type)
                    .unwrap_or(true)
            })
            .collect();

        // Newest-first by default (spec §4.1).
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn range(
        &self,
        agent_id: AgentId,
        from: u64,
        to: u64,
    ) -> Result<Vec<Activity>, AuditError> {
        let guard = self.by_agent.read().await;
        let rows = guard.get(&agent_id).cloned().unwrap_or_default();
        let from = from as usize;
        let to = (to as usize).min(rows.len().saturating_sub(1));
        if rows.is_empty() || from > to {
            return Ok(Vec::new());
        }
        Ok(rows[from..=to].to_vec())
    }
}

/// The Audit Store: hash-chain bookkeeping layered over an `AuditBackend`.
pub struct AuditStore {
    backend: Arc<dyn AuditBackend>,
    clock: SharedClock,
}

impl AuditStore {
    pub fn new(backend: Arc<dyn AuditBackend>, clock: SharedClock) -> Self {
        Self { backend, clock }
    }

    pub fn in_memory(clock: SharedClock) -> Self {
        Self::new(Arc::new(InMemoryAuditBackend::new()), clock)
    }

    /// Append a risk-assessed activity to the chain. Retries are the
    /// caller's responsibility (spec §4.1: "caller retries with bounded
    /// backoff" on `ConcurrentWrite`); this call makes exactly one attempt.
    #[tracing::instrument(skip(self, draft, assessment), fields(agent_id = %draft.agent_id))]
    pub async fn append(
        &self,
        draft: ActivityDraft,
        assessment: RiskAssessment,
    ) -> Result<Activity, AuditError> {
        let (prev_hash, position) = self.backend.chain_head(draft.agent_id).await?;

        let mut activity = Activity {
            activity_id: ActivityId::new(),
            correlation_id: draft.correlation_id,
            parent_activity_id: draft.parent_activity_id,
            agent_id: draft.agent_id,
            tenant_id: draft.tenant_id,
            timestamp: self.clock.now(),
            activity_type: draft.activity_type,
            activity_category: draft.activity_category,
            description: draft.description,
            context: draft.context,
            user_id: draft.user_id,
            session_id: draft.session_id,
            input_hash: draft.input_hash,
            output_hash: draft.output_hash,
            knowledge_payload: draft.knowledge_payload,
            risk_level: assessment.risk_level,
            compliance_flags: assessment.compliance_flags,
            requires_review: assessment.requires_review,
            reviewed_by: None,
            reviewed_at: None,
            hash_signature: String::new(),
        };
        activity.hash_signature = compute_hash(&prev_hash, &activity);

        self.backend.insert(activity.clone(), position).await?;
        tracing::debug!(activity_id = %activity.activity_id, position, "activity appended");
        Ok(activity)
    }

    /// `append`, retried with jittered backoff on `ConcurrentWrite` (spec
    /// §7: "Conflict errors are retried internally with jitter and only
    /// surfaced after budget exhaustion", max 3 attempts). Use this from
    /// any caller that does not already hold a per-agent lock around the
    /// append -- the Façade's activity pipeline (spec §5) races exactly
    /// this way when two `log_*` calls for the same agent land
    /// concurrently. The Lifecycle Manager serializes its own appends
    /// behind a per-agent mutex and never observes a conflict, so it calls
    /// `append` directly.
    pub async fn append_with_retry(
        &self,
        draft: ActivityDraft,
        assessment: RiskAssessment,
    ) -> Result<Activity, AuditError> {
        const MAX_ATTEMPTS: u32 = 3;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.append(draft.clone(), assessment.clone()).await {
                Ok(activity) => return Ok(activity),
                Err(AuditError::ConcurrentWrite(agent_id)) if attempt < MAX_ATTEMPTS => {
                    let jitter_ms: u64 = rand::rng().random_range(5..=25u64) * attempt as u64;
                    tracing::debug!(
                        agent_id = %agent_id,
                        attempt,
                        jitter_ms,
                        "audit append conflict, retrying with jitter"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Record a review by appending a linked `SystemModification` activity
    /// rather than mutating the original row (spec §3 invariant).
    pub async fn mark_reviewed(
        &self,
        original: &Activity,
        reviewer: &str,
    ) -> Result<Activity, AuditError> {
        let mut draft = ActivityDraft::new(
            original.agent_id,
            original.tenant_id,
            sentinel_core::ActivityType::SystemModification,
            format!("activity {} reviewed by {reviewer}", original.activity_id),
        )
        .with_parent(original.activity_id)
        .with_category("review");
        draft.user_id = Some(reviewer.to_string());

        let assessment = RiskAssessment {
            risk_level: sentinel_core::RiskLevel::Negligible,
            compliance_flags: Vec::new(),
            requires_review: false,
            recommended_actions: Vec::new(),
            system_action: sentinel_core::SystemAction::None,
        };

        self.append_with_retry(draft, assessment).await
    }

    pub async fn query(
        &self,
        agent_id: AgentId,
        window: Option<Window>,
        filter: ActivityFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Activity>, AuditError> {
        self.backend
            .query(agent_id, window, filter, limit, offset)
            .await
    }

    pub async fn get(&self, activity_id: ActivityId) -> Result<Option<Activity>, AuditError> {
        self.backend.get(activity_id).await
    }

    /// Re-hash `[from, to]` and report the first position where
    /// `prev_hash` no longer matches the prior record's `hash_signature`
    /// (spec §4.1 / §8.3).
    pub async fn verify_chain(
        &self,
        agent_id: AgentId,
        from: u64,
        to: u64,
    ) -> Result<ChainVerification, AuditError> {
        let rows = self.backend.range(agent_id, from, to).await?;
        let mut prev_hash = if from == 0 {
            GENESIS_HASH.to_string()
        } else {
            // Re-derive the hash immediately preceding `from` by reading one
            // extra row back; if `from > 0` the caller is verifying a
            // sub-range and trusts the chain up to `from - 1`.
            let preceding = self.backend.range(agent_id, from - 1, from - 1).await?;
            preceding
                .first()
                .map(|a| a.hash_signature.clone())
                .unwrap_or_else(|| GENESIS_HASH.to_string())
        };

        for row in &rows {
            let expected = compute_hash(&prev_hash, row);
            if expected != row.hash_signature {
                return Ok(ChainVerification {
                    valid: false,
                    first_break_at: Some(row.activity_id),
                });
            }
            prev_hash = row.hash_signature.clone();
        }

        Ok(ChainVerification {
            valid: true,
            first_break_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{system_clock, ActivityType, TenantId};

    fn draft(agent_id: AgentId, tenant_id: TenantId) -> ActivityDraft {
        ActivityDraft::new(agent_id, tenant_id, ActivityType::Interaction, "did a thing")
    }

    fn negligible() -> RiskAssessment {
        RiskAssessment {
            risk_level: sentinel_core::RiskLevel::Negligible,
            compliance_flags: vec![],
            requires_review: false,
            recommended_actions: vec![],
            system_action: sentinel_core::SystemAction::None,
        }
    }

    #[tokio::test]
    async fn genesis_record_chains_from_zero_hash() {
        let store = AuditStore::in_memory(system_clock());
        let agent = AgentId::new();
        let tenant = TenantId::new();
        let a1 = store.append(draft(agent, tenant), negligible()).await.unwrap();
        assert_ne!(a1.hash_signature, GENESIS_HASH);

        let a2 = store.append(draft(agent, tenant), negligible()).await.unwrap();
        assert_ne!(a1.hash_signature, a2.hash_signature);

        let check = store.verify_chain(agent, 0, 1).await.unwrap();
        assert!(check.valid);
        assert!(check.first_break_at.is_none());
    }

    #[tokio::test]
    async fn tamper_is_detected_at_the_mutated_row() {
        let backend = Arc::new(InMemoryAuditBackend::new());
        let store = AuditStore::new(backend.clone(), system_clock());
        let agent = AgentId::new();
        let tenant = TenantId::new();

        for _ in 0..3 {
            store.append(draft(agent, tenant), negligible()).await.unwrap();
        }

        backend.tamper(agent, 1, "an attacker rewrote this").await;

        let check = store.verify_chain(agent, 0, 2).await.unwrap();
        assert!(!check.valid);
        let tampered_id = backend
            .query(agent, None, ActivityFilter::default(), 10, 0)
            .await
            .unwrap()
            .iter()
            .find(|a| a.description == "an attacker rewrote this")
            .unwrap()
            .activity_id;
        assert_eq!(check.first_break_at, Some(tampered_id));
    }

    #[tokio::test]
    async fn mark_reviewed_appends_rather_than_mutates() {
        let store = AuditStore::in_memory(system_clock());
        let agent = AgentId::new();
        let tenant = TenantId::new();
        let original = store.append(draft(agent, tenant), negligible()).await.unwrap();

        let review = store.mark_reviewed(&original, "admin-1").await.unwrap();
        assert_eq!(review.parent_activity_id, Some(original.activity_id));
        assert_eq!(review.activity_type, ActivityType::SystemModification);

        let fetched_original = store.get(original.activity_id).await.unwrap().unwrap();
        assert!(fetched_original.reviewed_by.is_none());
    }

    #[tokio::test]
    async fn concurrent_append_with_retry_produces_a_gapless_chain() {
        let store = Arc::new(AuditStore::in_memory(system_clock()));
        let agent = AgentId::new();
        let tenant = TenantId::new();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_with_retry(
                        ActivityDraft::new(agent, tenant, ActivityType::Interaction, format!("activity {i}")),
                        negligible(),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let all = store
            .query(agent, None, ActivityFilter::default(), 100, 0)
            .await
            .unwrap();
        assert_eq!(all.len(), 8, "every concurrent append must eventually succeed");

        let check = store.verify_chain(agent, 0, 7).await.unwrap();
        assert!(check.valid, "chain must be gapless and internally consistent");
    }
}
