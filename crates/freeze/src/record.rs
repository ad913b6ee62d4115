//! The `FreezeRecord` entity (spec §3).

use chrono::{DateTime, Utc};
use sentinel_core::{ActivityId, FreezeId, FreezeScope, RiskLevel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeRecord {
    pub freeze_id: FreezeId,
    pub scope: FreezeScope,
    pub freeze_timestamp: DateTime<Utc>,
    pub unfreeze_timestamp: Option<DateTime<Utc>>,
    pub reason: String,
    pub triggering_activity_id: Option<ActivityId>,
    pub risk_level: RiskLevel,
    pub unfreeze_authorized_by: Option<String>,
    pub unfreeze_reason: Option<String>,
}

impl FreezeRecord {
    pub fn is_active(&self) -> bool {
        self.unfreeze_timestamp.is_none()
    }
}

/// Stable key for an active freeze: at most one active record exists per
/// `(freeze_type, target)` (spec §3 invariant). `FreezeScope` already
/// carries the type tag, so the scope itself is the key.
pub fn scope_key(scope: &FreezeScope) -> String {
    match scope {
        FreezeScope::Agent(id) => format!("agent:{id}"),
        FreezeScope::Module(name) => format!("module:{name}"),
        FreezeScope::System => "system".to_string(),
    }
}
