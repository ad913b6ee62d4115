//! The Surveillance Engine (spec §4.5): the periodic health/behavior/
//! anomaly scan.
//!
//! Grounded on `arbiter::bulkhead::Bulkhead`'s `Semaphore`-gated concurrent-
//! request pattern for the bounded-concurrency pool, and on
//! `arbiter::coordinator::Coordinator`'s "own the background loop, compose
//! the pillar managers" shape for `run_forever`. Cooperative shutdown uses
//! `tokio_util::sync::CancellationToken`, the same crate family the
//! teacher's chaos/shutdown paths reach for, generalized here to a check
//! between per-agent analyses rather than a single global switch.

use std::sync::Arc;
use std::time::Duration;

use sentinel_audit::{ActivityFilter, AuditStore, Window};
use sentinel_core::config::{SurveillanceConfig, Thresholds};
use sentinel_core::{
    ActivityType, AgentStatus, CorrelationId, RiskLevel, SharedClock, TenantId, ViolationSeverity,
};
use sentinel_lifecycle::LifecycleManager;
use sentinel_notify::{NotificationBus, NotificationDraft};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::analyzer::{severity_for_score, AnalysisInput, BehaviorAnalyzer};
use crate::error::SurveillanceError;
use crate::health::check_health;

/// Burst threshold for the API-pattern check (spec §4.5 "detect rate/
/// endpoint anomalies"). Ambient tunable -- the spec leaves the exact
/// number unspecified, only the existence of the check.
const BURST_WINDOW_SECONDS: i64 = 60;
const BURST_ACTIVITY_THRESHOLD: usize = 200;
const BEHAVIOR_HISTORY_WINDOW_SECONDS: i64 = 3600;
const BEHAVIOR_HISTORY_LIMIT: usize = 200;

/// Summary of one `run_cycle` call, useful for tests and for publishing the
/// `surveillance.cycle_completed` event (spec §6).
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub agents_scanned: usize,
    pub violations_raised: usize,
    pub good_behavior_ticks: usize,
    pub marked_offline: usize,
    pub errors: usize,
}

struct Inner {
    lifecycle: Arc<LifecycleManager>,
    audit: Arc<AuditStore>,
    notify: Arc<NotificationBus>,
    analyzer: Arc<dyn BehaviorAnalyzer>,
    config: SurveillanceConfig,
    thresholds: Thresholds,
    clock: SharedClock,
}

#[derive(Clone)]
pub struct SurveillanceEngine {
    inner: Arc<Inner>,
    cancellation: CancellationToken,
}

enum AgentOutcome {
    MarkedOffline,
    Violation,
    Tick,
}

impl SurveillanceEngine {
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        audit: Arc<AuditStore>,
        notify: Arc<NotificationBus>,
        analyzer: Arc<dyn BehaviorAnalyzer>,
        config: SurveillanceConfig,
        thresholds: Thresholds,
        clock: SharedClock,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                lifecycle,
                audit,
                notify,
                analyzer,
                config,
                thresholds,
                clock,
            }),
            cancellation: CancellationToken::new(),
        }
    }

    /// A token callers can `cancel()` to stop `run_forever` cooperatively
    /// between agents (spec §4.5 "Cancellation").
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Long-running supervisory loop (spec §4.5 "Cycle"). Returns once the
    /// cancellation token fires.
    pub async fn run_forever(&self, tenant_id: Option<TenantId>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.inner.config.monitoring_interval_seconds));
        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    tracing::info!("surveillance engine shutting down");
                    return;
                }
                _ = interval.tick() => {
                    let report = self.run_cycle(tenant_id).await;
                    tracing::info!(
                        agents_scanned = report.agents_scanned,
                        violations_raised = report.violations_raised,
                        good_behavior_ticks = report.good_behavior_ticks,
                        marked_offline = report.marked_offline,
                        errors = report.errors,
                        "surveillance cycle completed"
                    );
                }
            }
        }
    }

    /// Run one scan cycle over every agent in `{Active, Maintenance}` for
    /// `tenant_id` (or every tenant if `None`). Each agent's analyses run in
    /// a bounded-concurrency pool sized by `max_concurrent_analyses`.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self, tenant_id: Option<TenantId>) -> CycleReport {
        let agents = match self
            .inner
            .lifecycle
            .list_by_status(tenant_id, &[AgentStatus::Active, AgentStatus::Maintenance])
            .await
        {
            Ok(agents) => agents,
            Err(err) => {
                tracing::error!(error = %err, "surveillance cycle could not list agents");
                return CycleReport::default();
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.inner.config.max_concurrent_analyses.max(1)));
        let mut tasks = JoinSet::new();
        let mut report = CycleReport::default();

        for agent in agents {
            if self.cancellation.is_cancelled() {
                break;
            }
            let inner = self.inner.clone();
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            tasks.spawn(async move {
                let _permit = permit;
                scan_agent(inner, agent.agent_id).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            report.agents_scanned += 1;
            match joined {
                Ok(Ok(AgentOutcome::MarkedOffline)) => report.marked_offline += 1,
                Ok(Ok(AgentOutcome::Violation)) => report.violations_raised += 1,
                Ok(Ok(AgentOutcome::Tick)) => report.good_behavior_ticks += 1,
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "surveillance check failed for one agent");
                    report.errors += 1;
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "surveillance task panicked");
                    report.errors += 1;
                }
            }
        }

        report
    }
}

async fn scan_agent(
    inner: Arc<Inner>,
    agent_id: sentinel_core::AgentId,
) -> Result<AgentOutcome, SurveillanceError> {
    let agent = inner.lifecycle.get(agent_id).await?;
    let correlation_id = CorrelationId::new();
    let now = inner.clock.now();

    let heartbeat_age = agent
        .last_heartbeat_at
        .map(|ts| (now - ts).num_seconds())
        .unwrap_or(i64::MAX);
    if heartbeat_age > inner.config.heartbeat_timeout_seconds as i64 {
        inner
            .lifecycle
            .mark_offline_due_to_timeout(agent_id, correlation_id)
            .await?;
        return Ok(AgentOutcome::MarkedOffline);
    }

    let mut violation_raised = false;

    if let Some(metrics) = inner.lifecycle.latest_metrics(agent_id).await {
        let breaches = check_health(&metrics, &inner.thresholds);
        if !breaches.is_empty() {
            let labels: Vec<&str> = breaches.iter().map(|b| b.label()).collect();
            inner
                .lifecycle
                .handle_security_violation(
                    agent_id,
                    "health_threshold_breach",
                    ViolationSeverity::Medium,
                    format!("sustained breach: {}", labels.join(", ")),
                    correlation_id,
                )
                .await?;
            violation_raised = true;
        }
    }

    if inner.config.enable_behavior_analysis {
        let window = Window {
            from: now - chrono::Duration::seconds(BEHAVIOR_HISTORY_WINDOW_SECONDS),
            to: now,
        };
        let history = inner
            .audit
            .query(
                agent_id,
                Some(window),
                ActivityFilter::default(),
                BEHAVIOR_HISTORY_LIMIT,
                0,
            )
            .await?;
        let analysis = inner
            .analyzer
            .analyze(AnalysisInput {
                agent_id,
                history: &history,
            })
            .await;

        if analysis.is_anomaly
            && analysis.confidence >= 0.8
            && analysis.score > inner.config.anomaly_threshold
        {
            inner
                .lifecycle
                .handle_security_violation(
                    agent_id,
                    "behavior_anomaly",
                    severity_for_score(analysis.score),
                    analysis.explanation,
                    correlation_id,
                )
                .await?;
            violation_raised = true;
        }
    }

    if let Err(err) = check_api_pattern(&inner, agent_id, now).await {
        tracing::warn!(agent_id = %agent_id, error = %err, "api-pattern check failed");
    }

    if violation_raised {
        Ok(AgentOutcome::Violation)
    } else {
        inner
            .lifecycle
            .adjust_score(
                agent_id,
                sentinel_lifecycle::score::GOOD_BEHAVIOR_TICK_DELTA,
                "no violations this surveillance cycle",
                correlation_id,
            )
            .await?;
        Ok(AgentOutcome::Tick)
    }
}

/// Burst detection over the recent activity rate (spec §4.5 "API-pattern
/// check"). Raises an alert notification rather than a violation -- a burst
/// alone is not evidence of a security event, only of an unusual rate.
async fn check_api_pattern(
    inner: &Inner,
    agent_id: sentinel_core::AgentId,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), SurveillanceError> {
    let window = Window {
        from: now - chrono::Duration::seconds(BURST_WINDOW_SECONDS),
        to: now,
    };
    let recent = inner
        .audit
        .query(
            agent_id,
            Some(window),
            ActivityFilter {
                activity_type: Some(ActivityType::Interaction),
                ..Default::default()
            },
            BURST_ACTIVITY_THRESHOLD + 1,
            0,
        )
        .await?;

    if recent.len() > BURST_ACTIVITY_THRESHOLD {
        let draft = NotificationDraft::new(
            RiskLevel::Medium,
            format!("Activity burst detected for agent {agent_id}"),
            format!(
                "{} interactions in the last {BURST_WINDOW_SECONDS}s, exceeding the burst threshold",
                recent.len()
            ),
        )
        .with_agent(agent_id);
        inner.notify.notify(draft).await?;
    }

    Ok(())
}
