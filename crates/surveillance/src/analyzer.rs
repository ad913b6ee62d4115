//! Pluggable behavior analysis (spec §4.5 "Behavior check").
//!
//! Grounded on `arbiter::antifragile::FailureCategory`'s severity-scoring
//! idiom, generalized from a failure taxonomy to an anomaly-score contract
//! over an agent's recent activity history. A real deployment substitutes a
//! model-backed analyzer behind this trait; the default here is a
//! deterministic heuristic so the engine has a working analyzer without an
//! external dependency.

use sentinel_audit::Activity;
use sentinel_core::AgentId;

/// Input to a `BehaviorAnalyzer`: the recent activity window for one agent.
#[derive(Debug, Clone)]
pub struct AnalysisInput<'a> {
    pub agent_id: AgentId,
    pub history: &'a [Activity],
}

/// Output of a behavior analysis pass (spec §4.5: "{ is_anomaly, score,
/// confidence, explanation }").
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub is_anomaly: bool,
    pub score: f64,
    pub confidence: f64,
    pub explanation: String,
}

#[async_trait::async_trait]
pub trait BehaviorAnalyzer: Send + Sync {
    async fn analyze(&self, input: AnalysisInput<'_>) -> AnalysisOutput;
}

/// Maps an anomaly score monotonically onto `ViolationSeverity` (spec
/// §4.5: "severity maps monotonically from score").
pub fn severity_for_score(score: f64) -> sentinel_core::ViolationSeverity {
    if score >= 0.9 {
        sentinel_core::ViolationSeverity::Critical
    } else if score >= 0.8 {
        sentinel_core::ViolationSeverity::Medium
    } else {
        sentinel_core::ViolationSeverity::Warning
    }
}

/// Deterministic heuristic analyzer: flags an agent whose recent window has
/// an elevated share of `SecurityEvent`/`Error` activities. Not a model --
/// a real implementation of this trait is expected to call out to one.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicBehaviorAnalyzer;

#[async_trait::async_trait]
impl BehaviorAnalyzer for HeuristicBehaviorAnalyzer {
    async fn analyze(&self, input: AnalysisInput<'_>) -> AnalysisOutput {
        if input.history.is_empty() {
            return AnalysisOutput {
                is_anomaly: false,
                score: 0.0,
                confidence: 1.0,
                explanation: "no recent activity".to_string(),
            };
        }

        let total = input.history.len() as f64;
        let flagged = input
            .history
            .iter()
            .filter(|a| {
                matches!(
                    a.activity_type,
                    sentinel_core::ActivityType::SecurityEvent | sentinel_core::ActivityType::Error
                )
            })
            .count() as f64;
        let score = flagged / total;
        let is_anomaly = score > 0.3;

        AnalysisOutput {
            is_anomaly,
            score,
            confidence: if total >= 5.0 { 0.9 } else { 0.5 },
            explanation: format!(
                "{flagged}/{total} recent activities were security/error events",
                flagged = flagged as u64,
                total = total as u64
            ),
        }
    }
}
