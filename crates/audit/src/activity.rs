//! The `Activity` record and its `SecurityViolation` specialization
//! (spec §3). Grounded on the teacher's `AuditRecord` builder idiom
//! (`arbiter::audit::AuditRecord::new()` + `with_*` setters), generalized
//! from a flat policy-evaluation record to the spec's richer activity
//! shape and given a hash-chain field the teacher's ledger did not need.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sentinel_core::{ActivityId, ActivityType, AgentId, CorrelationId, RiskLevel, TenantId};
use serde::{Deserialize, Serialize};

/// A durable audit record. Append-only: once built and committed by the
/// store, none of these fields are ever mutated in place. Corrections are
/// new `Activity` rows linked via `parent_activity_id` (see
/// `AuditStore::mark_reviewed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub activity_id: ActivityId,
    pub correlation_id: CorrelationId,
    pub parent_activity_id: Option<ActivityId>,
    pub agent_id: AgentId,
    pub tenant_id: TenantId,
    pub timestamp: DateTime<Utc>,
    pub activity_type: ActivityType,
    pub activity_category: String,
    pub description: String,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub input_hash: Option<String>,
    pub output_hash: Option<String>,
    pub knowledge_payload: Option<serde_json::Value>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub compliance_flags: Vec<String>,
    pub requires_review: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// `H(prev_hash || canonical_bytes(fields_except_hash))`, computed by the
    /// store at append time. Never set by the caller.
    pub hash_signature: String,
}

/// Everything needed to build an `Activity` except the identifiers and
/// hash the store assigns -- the input to `AuditStore::append`.
#[derive(Debug, Clone)]
pub struct ActivityDraft {
    pub correlation_id: CorrelationId,
    pub parent_activity_id: Option<ActivityId>,
    pub agent_id: AgentId,
    pub tenant_id: TenantId,
    pub activity_type: ActivityType,
    pub activity_category: String,
    pub description: String,
    pub context: BTreeMap<String, serde_json::Value>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub input_hash: Option<String>,
    pub output_hash: Option<String>,
    pub knowledge_payload: Option<serde_json::Value>,
}

impl ActivityDraft {
    pub fn new(
        agent_id: AgentId,
        tenant_id: TenantId,
        activity_type: ActivityType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            parent_activity_id: None,
            agent_id,
            tenant_id,
            activity_type,
            activity_category: "general".to_string(),
            description: description.into(),
            context: BTreeMap::new(),
            user_id: None,
            session_id: None,
            input_hash: None,
            output_hash: None,
            knowledge_payload: None,
        }
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = id;
        self
    }

    pub fn with_parent(mut self, id: ActivityId) -> Self {
        self.parent_activity_id = Some(id);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.activity_category = category.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// `violation_type`/`severity`/`details` for a `SecurityEvent`-category
/// activity (spec §3 `SecurityViolation`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityViolation {
    pub violation_type: String,
    pub severity: sentinel_core::ViolationSeverity,
    pub details: String,
}

/// Bounded query filters used by `AuditStore::query`.
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub risk_level: Option<RiskLevel>,
    pub requires_review: Option<bool>,
    pub activity_type: Option<ActivityType>,
}

#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}
