//! Security score arithmetic (spec §4.2).

use sentinel_core::{config::ScoreThresholds, AgentStatus, ViolationSeverity};

pub const CRITICAL_VIOLATION_DELTA: i32 = -30;
pub const MEDIUM_OR_WARNING_VIOLATION_DELTA: i32 = -15;
pub const HEARTBEAT_FAILURE_DELTA: i32 = -5;
pub const FAILED_COMPLIANCE_CHECK_DELTA: i32 = -10;
pub const GOOD_BEHAVIOR_TICK_DELTA: i32 = 5;
pub const PASSED_COMPLIANCE_AUDIT_DELTA: i32 = 10;

pub fn clamp_score(score: i32) -> i32 {
    score.clamp(0, 100)
}

pub fn violation_delta(severity: ViolationSeverity) -> i32 {
    match severity {
        ViolationSeverity::Critical => CRITICAL_VIOLATION_DELTA,
        ViolationSeverity::Medium | ViolationSeverity::Warning => MEDIUM_OR_WARNING_VIOLATION_DELTA,
    }
}

/// Result of applying the score-threshold enforcement ladder (spec §4.2
/// "Automatic enforcement thresholds") on top of whatever status a
/// violation-specific rule already produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdOutcome {
    pub status: AgentStatus,
    pub mandatory_freeze: bool,
    pub warning: bool,
}

/// Apply score-threshold enforcement to `status`/`score`. Only ever
/// escalates (never reverses a status a violation-specific rule already
/// chose) and never touches terminal or already-frozen/compromised
/// states.
pub fn apply_thresholds(
    status: AgentStatus,
    score: i32,
    auto_suspend_on_violation: bool,
    thresholds: &ScoreThresholds,
) -> ThresholdOutcome {
    let warning = score < thresholds.warning_below;

    if matches!(status, AgentStatus::Decommissioned | AgentStatus::Compromised) {
        return ThresholdOutcome {
            status,
            mandatory_freeze: false,
            warning,
        };
    }

    if score == 0 {
        return ThresholdOutcome {
            status: AgentStatus::Compromised,
            mandatory_freeze: true,
            warning,
        };
    }

    if score < thresholds.mandatory_freeze_below && status != AgentStatus::Frozen {
        return ThresholdOutcome {
            status: AgentStatus::Frozen,
            mandatory_freeze: true,
            warning,
        };
    }

    if status == AgentStatus::Active
        && auto_suspend_on_violation
        && score < thresholds.auto_suspend_below
    {
        return ThresholdOutcome {
            status: AgentStatus::Suspended,
            mandatory_freeze: false,
            warning,
        };
    }

    ThresholdOutcome {
        status,
        mandatory_freeze: false,
        warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_score_forces_compromised_regardless_of_prior_status() {
        let out = apply_thresholds(AgentStatus::Suspended, 0, true, &ScoreThresholds::default());
        assert_eq!(out.status, AgentStatus::Compromised);
        assert!(out.mandatory_freeze);
    }

    #[test]
    fn below_freeze_threshold_forces_frozen() {
        let out = apply_thresholds(AgentStatus::Suspended, 25, true, &ScoreThresholds::default());
        assert_eq!(out.status, AgentStatus::Frozen);
        assert!(out.mandatory_freeze);
    }

    #[test]
    fn below_suspend_threshold_only_applies_to_active() {
        let out = apply_thresholds(AgentStatus::Active, 45, true, &ScoreThresholds::default());
        assert_eq!(out.status, AgentStatus::Suspended);

        let out = apply_thresholds(AgentStatus::Maintenance, 45, true, &ScoreThresholds::default());
        assert_eq!(out.status, AgentStatus::Maintenance);
    }

    #[test]
    fn score_clamps_to_valid_range() {
        assert_eq!(clamp_score(-50), 0);
        assert_eq!(clamp_score(150), 100);
        assert_eq!(clamp_score(55), 55);
    }
}
