//! The activity pipeline (spec §4.7 "hot path"): the six steps every
//! `log_*` call on the Façade runs through before returning to the
//! caller.
//!
//! Grounded on `gate::bin::server`'s request-handling shape of "classify,
//! then act on the classification, then persist" collapsed here into one
//! function shared by `log_interaction`/`log_knowledge`/`log_process`/
//! `report_error`, since spec §4.7 gives all four identical steps.

use std::collections::BTreeMap;

use sentinel_audit::{ActivityDraft, AuditStore};
use sentinel_classify::{AgentSnapshot, ClassifyInput, RiskClassifier};
use sentinel_core::{
    ActivityId, ActivityType, AgentId, CorrelationId, DomainEvent, EventSink, FreezeScope,
    RiskLevel, SystemAction, TenantId, ViolationSeverity,
};
use sentinel_freeze::FreezeRegistry;
use sentinel_lifecycle::LifecycleManager;
use sentinel_notify::{NotificationBus, NotificationDraft};

/// Lookback window for the `recent_activity_count`/`recent_error_count`
/// signals the Risk Classifier reads (spec §4.3 "recent activity rate").
/// Ambient tunable, not enumerated by spec §6.
const RECENT_ACTIVITY_WINDOW_SECONDS: i64 = 300;
const RECENT_ACTIVITY_QUERY_LIMIT: usize = 500;

/// Everything a `log_*` call needs to describe one activity before the
/// pipeline assigns it an id, risk level, and (if applicable) a freeze.
#[derive(Debug, Clone)]
pub struct LogActivityInput {
    pub agent_id: AgentId,
    pub activity_type: ActivityType,
    pub category: String,
    pub description: String,
    pub context: BTreeMap<String, serde_json::Value>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub input_hash: Option<String>,
    pub output_hash: Option<String>,
    pub knowledge_payload: Option<serde_json::Value>,
    pub correlation_id: CorrelationId,
    /// Only meaningful for `ActivityType::SecurityEvent`; the log_*
    /// pipeline never constructs one (security violations go through
    /// `handle_security_violation` instead) but the field exists so the
    /// pipeline stays the single place that builds a `ClassifyInput`.
    pub violation_severity: Option<ViolationSeverity>,
}

impl LogActivityInput {
    pub fn new(agent_id: AgentId, activity_type: ActivityType, description: impl Into<String>) -> Self {
        Self {
            agent_id,
            activity_type,
            category: "general".to_string(),
            description: description.into(),
            context: BTreeMap::new(),
            user_id: None,
            session_id: None,
            input_hash: None,
            output_hash: None,
            knowledge_payload: None,
            correlation_id: CorrelationId::new(),
            violation_severity: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_hashes(mut self, input_hash: Option<String>, output_hash: Option<String>) -> Self {
        self.input_hash = input_hash;
        self.output_hash = output_hash;
        self
    }

    pub fn with_knowledge_payload(mut self, payload: serde_json::Value) -> Self {
        self.knowledge_payload = Some(payload);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// Result of running the pipeline (spec §4.7 step 6: "Return `activity_id`,
/// `risk_assessed=true`, and the system action taken").
#[derive(Debug, Clone)]
pub struct LogActivityResult {
    pub activity_id: ActivityId,
    pub risk_assessed: bool,
    pub system_action_taken: SystemAction,
    pub risk_level: RiskLevel,
    pub requires_review: bool,
}

pub(crate) struct Pipeline<'a> {
    pub lifecycle: &'a LifecycleManager,
    pub audit: &'a AuditStore,
    pub freeze: &'a FreezeRegistry,
    pub notify: &'a NotificationBus,
    pub classifier: &'a RiskClassifier,
    pub event_sink: &'a dyn EventSink,
}

impl<'a> Pipeline<'a> {
    #[tracing::instrument(skip(self, input))]
    pub async fn run(&self, input: LogActivityInput) -> sentinel_core::Result<LogActivityResult> {
        // Fail closed (spec §4.4 "is_frozen(scope) is consulted before
        // executing any state-changing operation in the Façade") before
        // this activity's own side effects (audit append, possible further
        // freeze) begin. No Activity is appended for a rejected attempt
        // (spec §8 property 6); only the rejection itself is logged.
        if self.freeze.is_frozen(&FreezeScope::System).await? {
            tracing::warn!(agent_id = %input.agent_id, "log activity rejected: system is frozen");
            return Err(sentinel_core::Error::Frozen {
                scope: "system".to_string(),
                reason: "system is frozen".to_string(),
            });
        }
        if self
            .freeze
            .is_frozen(&FreezeScope::Agent(input.agent_id))
            .await?
        {
            tracing::warn!(agent_id = %input.agent_id, "log activity rejected: agent is frozen");
            return Err(sentinel_core::Error::Frozen {
                scope: format!("agent:{}", input.agent_id),
                reason: "agent is frozen".to_string(),
            });
        }
        if let Some(module) = input.context.get("module").and_then(|v| v.as_str()) {
            if self
                .freeze
                .is_frozen(&FreezeScope::Module(module.to_string()))
                .await?
            {
                tracing::warn!(agent_id = %input.agent_id, module, "log activity rejected: module is frozen");
                return Err(sentinel_core::Error::Frozen {
                    scope: format!("module:{module}"),
                    reason: "module is frozen".to_string(),
                });
            }
        }

        let agent = self.lifecycle.get(input.agent_id).await?;

        let window = sentinel_audit::Window {
            from: agent
                .created_at
                .max(chrono::Utc::now() - chrono::Duration::seconds(RECENT_ACTIVITY_WINDOW_SECONDS)),
            to: chrono::Utc::now(),
        };
        let recent = self
            .audit
            .query(
                input.agent_id,
                Some(window),
                sentinel_audit::ActivityFilter::default(),
                RECENT_ACTIVITY_QUERY_LIMIT,
                0,
            )
            .await?;
        let recent_activity_count = recent.len() as u32;
        let recent_error_count = recent
            .iter()
            .filter(|a| a.activity_type == ActivityType::Error)
            .count() as u32;

        // 1. Build the Activity draft (carries the correlation id).
        let mut draft = ActivityDraft::new(
            input.agent_id,
            agent.tenant_id,
            input.activity_type,
            input.description,
        )
        .with_correlation_id(input.correlation_id)
        .with_category(input.category);
        draft.context = input.context;
        draft.user_id = input.user_id;
        draft.session_id = input.session_id;
        draft.input_hash = input.input_hash;
        draft.output_hash = input.output_hash;
        draft.knowledge_payload = input.knowledge_payload;

        // 2. Risk Classifier evaluates synchronously (CPU-only, spec §5).
        let classify_input = ClassifyInput {
            activity_type: draft.activity_type,
            activity_category: &draft.activity_category,
            description: &draft.description,
            context: &draft.context,
            user_id: draft.user_id.as_deref(),
            recent_activity_count,
            recent_error_count,
            violation_severity: input.violation_severity,
            agent: AgentSnapshot {
                security_score: agent.security_score,
                status: agent.status,
            },
        };
        let assessment = self.classifier.classify(&classify_input);

        // 3. Notify before returning if the activity demands review.
        if assessment.requires_review || assessment.risk_level >= RiskLevel::High {
            let notification_draft = NotificationDraft::new(
                assessment.risk_level,
                format!("Review required: {:?} activity from agent {}", draft.activity_type, input.agent_id),
                draft.description.clone(),
            )
            .with_tenant(agent.tenant_id)
            .with_agent(input.agent_id)
            .with_recommended_actions(assessment.recommended_actions.clone())
            .with_system_action(assessment.system_action);
            self.notify.notify(notification_draft).await?;
        }

        // 4. Freeze synchronously if the classifier demands it, recording
        // the FreezeRecord's id back onto the activity before it is
        // appended.
        let mut freeze_id = None;
        match assessment.system_action {
            SystemAction::FreezeAgent => {
                let outcome = self
                    .freeze
                    .freeze(
                        FreezeScope::Agent(input.agent_id),
                        "risk classifier: freeze_agent",
                        None,
                        assessment.risk_level,
                    )
                    .await?;
                self.event_sink.publish(DomainEvent::EntityFrozen {
                    freeze_id: outcome.record.freeze_id,
                    scope: outcome.record.scope.clone(),
                    risk_level: assessment.risk_level,
                });
                freeze_id = Some(outcome.record.freeze_id);
            }
            SystemAction::FreezeModule => {
                let module = draft
                    .context
                    .get("module")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&draft.activity_category)
                    .to_string();
                let outcome = self
                    .freeze
                    .freeze(
                        FreezeScope::Module(module),
                        "risk classifier: freeze_module",
                        None,
                        assessment.risk_level,
                    )
                    .await?;
                self.event_sink.publish(DomainEvent::EntityFrozen {
                    freeze_id: outcome.record.freeze_id,
                    scope: outcome.record.scope.clone(),
                    risk_level: assessment.risk_level,
                });
                freeze_id = Some(outcome.record.freeze_id);
            }
            SystemAction::FreezeSystem => {
                let outcome = self
                    .freeze
                    .freeze(
                        FreezeScope::System,
                        "risk classifier: freeze_system",
                        None,
                        assessment.risk_level,
                    )
                    .await?;
                self.event_sink.publish(DomainEvent::EntityFrozen {
                    freeze_id: outcome.record.freeze_id,
                    scope: outcome.record.scope.clone(),
                    risk_level: assessment.risk_level,
                });
                freeze_id = Some(outcome.record.freeze_id);
            }
            SystemAction::None | SystemAction::Alert | SystemAction::Escalate => {}
        }
        if let Some(freeze_id) = freeze_id {
            draft = draft.with_context("freeze_id", serde_json::json!(freeze_id.to_string()));
        }

        // 5. Audit Store append; failure here is fatal (spec §4.7). The
        // pipeline holds no per-agent lock (unlike the Lifecycle Manager),
        // so two concurrent `log_*` calls for the same agent can race on
        // chain position -- `append_with_retry` absorbs that with bounded,
        // jittered retries (spec §7) before surfacing `Conflict`.
        let activity = self.audit.append_with_retry(draft, assessment.clone()).await?;

        // 6. Report back to the caller.
        Ok(LogActivityResult {
            activity_id: activity.activity_id,
            risk_assessed: true,
            system_action_taken: assessment.system_action,
            risk_level: assessment.risk_level,
            requires_review: assessment.requires_review,
        })
    }
}
