//! Enums shared across the control plane's components.
//!
//! Kept as closed, serde-derived enums (per the redesign notes: the source
//! system's duck-typed dicts become tagged variants here) rather than
//! strings, so an unknown variant is a deserialization error instead of a
//! silently-ignored typo.

use serde::{Deserialize, Serialize};

/// Deterministically assigned by the Risk Classifier; ordering is
/// significant -- thresholds throughout the system compare `RiskLevel`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Negligible,
    Low,
    Medium,
    High,
    Critical,
    /// Reserved for conditions the classifier maps to a system-wide freeze;
    /// distinct from `Critical`, which stays agent-scoped. See DESIGN.md.
    Emergency,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negligible => "negligible",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Interaction,
    KnowledgeGained,
    ProcessExecution,
    DataAccess,
    SystemModification,
    Error,
    SecurityEvent,
}

/// Scope a freeze (or a freeze check) applies to. Precedence at read time
/// is System > Module > Agent, enforced by `sentinel_freeze`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "target")]
pub enum FreezeScope {
    Agent(crate::ids::AgentId),
    /// Module identity is caller-defined; this design does not pick module
    /// boundaries (see DESIGN.md Open Questions).
    Module(String),
    System,
}

/// Directive returned by the Risk Classifier alongside a `RiskLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemAction {
    None,
    Alert,
    FreezeAgent,
    FreezeModule,
    FreezeSystem,
    Escalate,
}

/// A single recommended follow-up action, ordered by priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub action: String,
    pub priority: u8,
    pub description: String,
}

/// Agent lifecycle state (spec §3/§4.2). Owned in behavior by
/// `sentinel-lifecycle`, but the enum itself is shared: the Risk
/// Classifier reads it as an input signal and the Audit Store records it
/// in transition activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Registered,
    Active,
    Inactive,
    Maintenance,
    Offline,
    Suspended,
    Frozen,
    Compromised,
    Decommissioned,
}

impl AgentStatus {
    /// Terminal states are immutable thereafter (spec §3 invariant d).
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Decommissioned)
    }
}

/// Severity of a `SecurityViolation` (spec §3), shared by the Risk
/// Classifier (reads it as an input signal for `SecurityEvent` activities)
/// and the Lifecycle Manager (maps it to a security-score delta).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Warning,
    Medium,
    Critical,
}

/// Output of the Risk Classifier for one activity (spec §4.3), threaded
/// from `sentinel-classify` into `sentinel-audit::AuditStore::append`
/// without either crate depending on the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub compliance_flags: Vec<String>,
    pub requires_review: bool,
    pub recommended_actions: Vec<RecommendedAction>,
    pub system_action: SystemAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_ordering_is_monotonic() {
        assert!(RiskLevel::Negligible < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert!(RiskLevel::Critical < RiskLevel::Emergency);
    }
}
