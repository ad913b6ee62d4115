//! The `Agent` entity (spec §3) and its registration input.

use chrono::{DateTime, Utc};
use sentinel_core::{AgentId, AgentStatus, TenantId};
use serde::{Deserialize, Serialize};

pub const INITIAL_SECURITY_SCORE: i32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub tenant_id: TenantId,
    pub name: String,
    pub agent_type: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub permissions: Vec<String>,
    pub status: AgentStatus,
    pub security_score: i32,
    pub created_at: DateTime<Utc>,
    pub registered_by: String,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_score_update_at: Option<DateTime<Utc>>,
}

/// Input to `LifecycleManager::register_agent` (spec §4.2).
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub tenant_id: TenantId,
    pub name: String,
    pub agent_type: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub permissions: Vec<String>,
    pub registered_by: String,
}

/// Operator-reported health metrics, supplied with each `heartbeat` call
/// and read back by the Surveillance Engine's health check (spec §4.5).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub cpu: f64,
    pub memory: f64,
    pub response_time_ms: f64,
    pub error_rate: f64,
}
