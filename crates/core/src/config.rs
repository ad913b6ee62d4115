//! Runtime configuration (spec §6), threaded in at construction rather than
//! read from the environment ad hoc inside components -- matching the
//! teacher's `AppState` composition in `bin/server.rs`, generalized so
//! every knob the spec enumerates has a typed home and a documented default.

use serde::{Deserialize, Serialize};

use crate::types::RiskLevel;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub auto_suspend_on_security_violation: bool,
    pub require_admin_approval_for_delete: bool,
    pub max_agents_per_tenant: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            auto_suspend_on_security_violation: true,
            require_admin_approval_for_delete: true,
            max_agents_per_tenant: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveillanceConfig {
    pub monitoring_interval_seconds: u64,
    pub anomaly_threshold: f64,
    pub max_concurrent_analyses: usize,
    pub enable_behavior_analysis: bool,
    pub heartbeat_timeout_seconds: u64,
}

impl Default for SurveillanceConfig {
    fn default() -> Self {
        Self {
            monitoring_interval_seconds: 60,
            anomaly_threshold: 0.7,
            max_concurrent_analyses: 10,
            enable_behavior_analysis: false,
            heartbeat_timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub cpu: f64,
    pub memory: f64,
    pub response_time_ms: f64,
    pub error_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: 0.90,
            memory: 0.90,
            response_time_ms: 5_000.0,
            error_rate: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreThresholds {
    pub auto_suspend_below: i32,
    pub mandatory_freeze_below: i32,
    pub warning_below: i32,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            auto_suspend_below: 50,
            mandatory_freeze_below: 30,
            warning_below: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub ttl_seconds: i64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { ttl_seconds: 86_400 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationChannelSeverities {
    pub email: RiskLevel,
    pub slack: RiskLevel,
    pub pager: RiskLevel,
}

impl Default for NotificationChannelSeverities {
    fn default() -> Self {
        Self {
            email: RiskLevel::Low,
            slack: RiskLevel::Medium,
            pager: RiskLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub agent_lifecycle: LifecycleConfig,
    pub surveillance: SurveillanceConfig,
    pub thresholds: Thresholds,
    pub score: ScoreThresholds,
    pub approval: ApprovalConfig,
    pub notifications: NotificationChannelSeverities,
}

impl SentinelConfig {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// field the file omits (every field has `#[serde(default)]`).
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Load configuration from the `SENTINEL_CONFIG` environment variable
    /// (a path to a TOML file), or defaults if unset.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var("SENTINEL_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
                Ok(Self::from_toml(&raw)?)
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SentinelConfig::default();
        assert_eq!(cfg.agent_lifecycle.max_agents_per_tenant, 100);
        assert_eq!(cfg.surveillance.monitoring_interval_seconds, 60);
        assert_eq!(cfg.score.mandatory_freeze_below, 30);
        assert_eq!(cfg.approval.ttl_seconds, 86_400);
    }

    #[test]
    fn partial_toml_fills_remaining_defaults() {
        let cfg = SentinelConfig::from_toml("[surveillance]\nanomaly_threshold = 0.5\n").unwrap();
        assert_eq!(cfg.surveillance.anomaly_threshold, 0.5);
        assert_eq!(cfg.surveillance.monitoring_interval_seconds, 60);
    }
}
