//! Health check (spec §4.5 "compare latest metrics... against per-tenant
//! thresholds").

use sentinel_core::config::Thresholds;
use sentinel_lifecycle::AgentMetrics;

/// A single threshold exceedance, for the audit/notification description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthBreach {
    Cpu,
    Memory,
    ResponseTime,
    ErrorRate,
}

impl HealthBreach {
    pub fn label(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::ResponseTime => "response_time",
            Self::ErrorRate => "error_rate",
        }
    }
}

/// Pure comparison of `metrics` against `thresholds`; returns every
/// exceeded dimension (spec does not rank them -- any exceedance matters).
pub fn check_health(metrics: &AgentMetrics, thresholds: &Thresholds) -> Vec<HealthBreach> {
    let mut breaches = Vec::new();
    if metrics.cpu > thresholds.cpu {
        breaches.push(HealthBreach::Cpu);
    }
    if metrics.memory > thresholds.memory {
        breaches.push(HealthBreach::Memory);
    }
    if metrics.response_time_ms > thresholds.response_time_ms {
        breaches.push(HealthBreach::ResponseTime);
    }
    if metrics.error_rate > thresholds.error_rate {
        breaches.push(HealthBreach::ErrorRate);
    }
    breaches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_breach_when_within_bounds() {
        let metrics = AgentMetrics {
            cpu: 0.5,
            memory: 0.5,
            response_time_ms: 100.0,
            error_rate: 0.01,
        };
        assert!(check_health(&metrics, &Thresholds::default()).is_empty());
    }

    #[test]
    fn flags_every_exceeded_dimension() {
        let metrics = AgentMetrics {
            cpu: 0.99,
            memory: 0.99,
            response_time_ms: 100.0,
            error_rate: 0.01,
        };
        let breaches = check_health(&metrics, &Thresholds::default());
        assert_eq!(breaches, vec![HealthBreach::Cpu, HealthBreach::Memory]);
    }
}
