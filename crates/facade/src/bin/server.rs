//! Sentinel Agent Control Plane -- HTTP server binding for the
//! transport-agnostic API surface described in spec §6.
//!
//! Thin by design: every handler parses its request, calls exactly one
//! `AgentManagerFacade` method, and maps the result (or `sentinel_core::Error`)
//! to a response. All control-plane behavior lives in the library crates;
//! this binary owns nothing but wiring, matching the teacher's
//! `bin/server.rs` shape across `gate`/`arbiter`/`synapse`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel_core::{
    ActivityType, AgentId, ApprovalId, CorrelationId, FreezeScope, NotificationId, SentinelConfig,
    TenantId, ViolationSeverity,
};
use sentinel_facade::{AgentManagerFacade, FacadeDependencies, LogActivityInput};
use sentinel_lifecycle::{AgentMetrics, AgentSpec, LifecycleAction};
use sentinel_notify::NotificationDecision;

struct AppState {
    facade: AgentManagerFacade,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(err: sentinel_core::Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        sentinel_core::Error::Validation(_) => StatusCode::BAD_REQUEST,
        sentinel_core::Error::Policy(_) => StatusCode::CONFLICT,
        sentinel_core::Error::Frozen { .. } => StatusCode::LOCKED,
        sentinel_core::Error::NotFound { .. } => StatusCode::NOT_FOUND,
        sentinel_core::Error::Conflict(_) => StatusCode::CONFLICT,
        sentinel_core::Error::AuditIntegrityViolation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        sentinel_core::Error::ControlPlaneUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        sentinel_core::Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: err.to_string() }))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SentinelConfig::from_env().expect("loading SENTINEL_CONFIG");
    let mut deps = FacadeDependencies::default();
    deps.config = config;
    let facade = AgentManagerFacade::in_memory(deps);
    let surveillance = facade.surveillance();

    let state = Arc::new(AppState { facade });

    // Surveillance cycle and approval-expiry sweeper run as independent
    // background loops (spec §4.5 / §4.6), decoupled from request handling.
    tokio::spawn({
        let surveillance = surveillance.clone();
        async move { surveillance.run_forever(None).await }
    });
    tokio::spawn({
        let state = state.clone();
        async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                if let Err(err) = state.facade.sweep_expired_approvals().await {
                    tracing::warn!(%err, "approval sweep failed");
                }
            }
        }
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/agents", post(register_agent).get(list_agents))
        .route("/agents/{id}", get(get_agent))
        .route("/agents/{id}/actions", post(execute_action))
        .route("/agents/{id}/approve-action", post(approve_action))
        .route("/agents/{id}/security-violation", post(report_security_violation))
        .route("/agents/{id}/log/{kind}", post(log_activity))
        .route("/agents/{id}/activity-log", get(get_activity_log))
        .route("/agents/{id}/surveillance-report", get(surveillance_report))
        .route("/agents/{id}/heartbeat", post(heartbeat))
        .route("/admin/dashboard", get(admin_dashboard))
        .route("/admin/notifications", get(admin_list_notifications))
        .route("/admin/notifications/{id}/respond", post(admin_respond_notification))
        .route("/admin/agents/{id}/unfreeze", post(admin_unfreeze_agent))
        .route("/admin/frozen-entities", get(admin_frozen_entities))
        .route("/admin/compliance-report", get(admin_compliance_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{port}");
    tracing::info!("sentinel control plane listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", version: env!("CARGO_PKG_VERSION") })
}

// ---- Agents --------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RegisterAgentRequest {
    tenant_id: TenantId,
    name: String,
    agent_type: String,
    version: String,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    permissions: Vec<String>,
    registered_by: String,
}

async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterAgentRequest>,
) -> Result<Json<sentinel_lifecycle::Agent>, (StatusCode, Json<ErrorResponse>)> {
    state
        .facade
        .register_agent(AgentSpec {
            tenant_id: req.tenant_id,
            name: req.name,
            agent_type: req.agent_type,
            version: req.version,
            capabilities: req.capabilities,
            permissions: req.permissions,
            registered_by: req.registered_by,
        })
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct ListAgentsQuery {
    tenant_id: TenantId,
}

async fn list_agents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAgentsQuery>,
) -> Result<Json<Vec<sentinel_lifecycle::Agent>>, (StatusCode, Json<ErrorResponse>)> {
    state
        .facade
        .list_agents(query.tenant_id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AgentId>,
) -> Result<Json<sentinel_lifecycle::Agent>, (StatusCode, Json<ErrorResponse>)> {
    state.facade.get_agent(id).await.map(Json).map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct ExecuteActionRequest {
    action: String,
    reason: String,
    actor: String,
    #[serde(default)]
    approval_id: Option<ApprovalId>,
    #[serde(default)]
    correlation_id: Option<CorrelationId>,
}

fn parse_action(raw: &str) -> Result<LifecycleAction, (StatusCode, Json<ErrorResponse>)> {
    match raw {
        "activate" => Ok(LifecycleAction::Activate),
        "enter_maintenance" => Ok(LifecycleAction::EnterMaintenance),
        "exit_maintenance" => Ok(LifecycleAction::ExitMaintenance),
        "deactivate" => Ok(LifecycleAction::Deactivate),
        "suspend" => Ok(LifecycleAction::Suspend),
        "resume" => Ok(LifecycleAction::Resume),
        "freeze" => Ok(LifecycleAction::Freeze),
        "decommission" => Ok(LifecycleAction::Decommission),
        other => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: format!("unknown action: {other}") }),
        )),
    }
}

async fn execute_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AgentId>,
    Json(req): Json<ExecuteActionRequest>,
) -> Result<Json<sentinel_lifecycle::ActionOutcome>, (StatusCode, Json<ErrorResponse>)> {
    let action = parse_action(&req.action)?;
    state
        .facade
        .execute_action(
            id,
            action,
            &req.actor,
            req.reason,
            req.approval_id,
            req.correlation_id.unwrap_or_else(CorrelationId::new),
        )
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct ApproveActionRequest {
    approval_id: ApprovalId,
    admin_id: String,
    #[serde(default)]
    approve: bool,
    #[serde(default)]
    notes: Option<String>,
}

async fn approve_action(
    State(state): State<Arc<AppState>>,
    Path(_id): Path<AgentId>,
    Json(req): Json<ApproveActionRequest>,
) -> Result<Json<sentinel_notify::ApprovalRequest>, (StatusCode, Json<ErrorResponse>)> {
    let result = if req.approve {
        state.facade.approve_action(req.approval_id, &req.admin_id, req.notes).await
    } else {
        state.facade.reject_action(req.approval_id, &req.admin_id, req.notes).await
    };
    result.map(Json).map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct SecurityViolationRequest {
    violation_type: String,
    severity: ViolationSeverity,
    details: String,
    #[serde(default)]
    correlation_id: Option<CorrelationId>,
}

async fn report_security_violation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AgentId>,
    Json(req): Json<SecurityViolationRequest>,
) -> Result<Json<sentinel_lifecycle::ViolationOutcome>, (StatusCode, Json<ErrorResponse>)> {
    state
        .facade
        .handle_security_violation(
            id,
            &req.violation_type,
            req.severity,
            req.details,
            req.correlation_id.unwrap_or_else(CorrelationId::new),
        )
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    #[serde(default)]
    metrics: AgentMetrics,
    #[serde(default)]
    correlation_id: Option<CorrelationId>,
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AgentId>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .facade
        .heartbeat(id, req.metrics, req.correlation_id.unwrap_or_else(CorrelationId::new))
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct LogActivityRequest {
    description: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    context: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    input_hash: Option<String>,
    #[serde(default)]
    output_hash: Option<String>,
    #[serde(default)]
    knowledge_payload: Option<serde_json::Value>,
    #[serde(default)]
    correlation_id: Option<CorrelationId>,
}

async fn log_activity(
    State(state): State<Arc<AppState>>,
    Path((id, kind)): Path<(AgentId, String)>,
    Json(req): Json<LogActivityRequest>,
) -> Result<Json<sentinel_facade::LogActivityResult>, (StatusCode, Json<ErrorResponse>)> {
    let activity_type = match kind.as_str() {
        "interaction" => ActivityType::Interaction,
        "knowledge" => ActivityType::KnowledgeGained,
        "process" => ActivityType::ProcessExecution,
        "error" => ActivityType::Error,
        other => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { error: format!("unknown log kind: {other}") }),
            ))
        }
    };

    let mut input = LogActivityInput::new(id, activity_type, req.description);
    if let Some(category) = req.category {
        input = input.with_category(category);
    }
    input.context = req.context;
    input.user_id = req.user_id;
    input.session_id = req.session_id;
    input = input.with_hashes(req.input_hash, req.output_hash);
    if let Some(payload) = req.knowledge_payload {
        input = input.with_knowledge_payload(payload);
    }
    if let Some(correlation_id) = req.correlation_id {
        input = input.with_correlation_id(correlation_id);
    }

    let result = match activity_type {
        ActivityType::Interaction => state.facade.log_interaction(input).await,
        ActivityType::KnowledgeGained => state.facade.log_knowledge(input).await,
        ActivityType::ProcessExecution => state.facade.log_process(input).await,
        ActivityType::Error => state.facade.report_error(input).await,
        _ => unreachable!("filtered above"),
    };
    result.map(Json).map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct ActivityLogQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

async fn get_activity_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AgentId>,
    Query(query): Query<ActivityLogQuery>,
) -> Result<Json<Vec<sentinel_audit::Activity>>, (StatusCode, Json<ErrorResponse>)> {
    state
        .facade
        .get_activity_log(
            id,
            None,
            sentinel_audit::ActivityFilter::default(),
            query.limit.unwrap_or(100),
            query.offset.unwrap_or(0),
        )
        .await
        .map(Json)
        .map_err(error_response)
}

async fn surveillance_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AgentId>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let agent = state.facade.get_agent(id).await.map_err(error_response)?;
    Ok(Json(serde_json::json!({
        "agent_id": agent.agent_id,
        "status": agent.status,
        "security_score": agent.security_score,
        "last_heartbeat_at": agent.last_heartbeat_at,
    })))
}

// ---- Admin ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TenantQuery {
    tenant_id: TenantId,
}

async fn admin_dashboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<DashboardResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .facade
        .get_dashboard(query.tenant_id, "admin")
        .await
        .map(|summary| Json(DashboardResponse::from(summary)))
        .map_err(error_response)
}

/// Serializable projection of `DashboardSummary` (the library type embeds
/// `&'static str` reasons and owned domain types that warrant their own
/// wire shape rather than deriving `Serialize` directly on the internal
/// struct).
#[derive(Debug, Serialize)]
struct DashboardResponse {
    total_agents: usize,
    active_agents: usize,
    suspended_agents: usize,
    frozen_agents: usize,
    compromised_agents: usize,
    pending_notifications: usize,
    frozen_entities: Vec<sentinel_freeze::FreezeRecord>,
    agents_needing_attention: Vec<AttentionItemResponse>,
    prioritized_recommendations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AttentionItemResponse {
    agent_id: AgentId,
    name: String,
    status: sentinel_core::AgentStatus,
    security_score: i32,
    reason: &'static str,
}

impl From<sentinel_facade::DashboardSummary> for DashboardResponse {
    fn from(summary: sentinel_facade::DashboardSummary) -> Self {
        Self {
            total_agents: summary.total_agents,
            active_agents: summary.active_agents,
            suspended_agents: summary.suspended_agents,
            frozen_agents: summary.frozen_agents,
            compromised_agents: summary.compromised_agents,
            pending_notifications: summary.pending_notifications,
            frozen_entities: summary.frozen_entities,
            agents_needing_attention: summary
                .agents_needing_attention
                .into_iter()
                .map(|item| AttentionItemResponse {
                    agent_id: item.agent_id,
                    name: item.name,
                    status: item.status,
                    security_score: item.security_score,
                    reason: item.reason,
                })
                .collect(),
            prioritized_recommendations: summary.prioritized_recommendations,
        }
    }
}

async fn admin_list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Vec<sentinel_notify::Notification>>, (StatusCode, Json<ErrorResponse>)> {
    state
        .facade
        .list_pending_notifications(Some(query.tenant_id), 100)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct RespondNotificationRequest {
    admin_id: String,
    resolve: bool,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
}

async fn admin_respond_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NotificationId>,
    Json(req): Json<RespondNotificationRequest>,
) -> Result<Json<sentinel_notify::Notification>, (StatusCode, Json<ErrorResponse>)> {
    let decision = if req.resolve {
        NotificationDecision::Resolve {
            response: req.response,
            resolution: req.resolution.unwrap_or_default(),
        }
    } else {
        NotificationDecision::Acknowledge { response: req.response }
    };
    state
        .facade
        .respond_to_notification(id, &req.admin_id, decision)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct UnfreezeRequest {
    authorized_by: String,
    reason: String,
    #[serde(default)]
    scope: Option<String>,
}

async fn admin_unfreeze_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AgentId>,
    Json(req): Json<UnfreezeRequest>,
) -> Result<Json<sentinel_freeze::FreezeRecord>, (StatusCode, Json<ErrorResponse>)> {
    let scope = match req.scope.as_deref() {
        Some(module) => FreezeScope::Module(module.to_string()),
        None => FreezeScope::Agent(id),
    };
    state
        .facade
        .unfreeze(scope, &req.authorized_by, req.reason)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn admin_frozen_entities(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<sentinel_freeze::FreezeRecord>>, (StatusCode, Json<ErrorResponse>)> {
    state.facade.get_frozen_entities().await.map(Json).map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct ComplianceReportQuery {
    tenant_id: TenantId,
    from: chrono::DateTime<chrono::Utc>,
    to: chrono::DateTime<chrono::Utc>,
}

async fn admin_compliance_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ComplianceReportQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let report = state
        .facade
        .generate_compliance_report(query.tenant_id, sentinel_audit::Window { from: query.from, to: query.to })
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({
        "agents_covered": report.agents_covered,
        "total_activities": report.total_activities,
        "total_security_violations": report.total_security_violations,
        "chain_integrity_failures": report.chain_integrity_failures,
    })))
}
