use sentinel_core::AgentId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("agent name {name} already registered for this tenant")]
    DuplicateName { name: String },

    #[error("tenant has reached its agent quota")]
    QuotaExceeded,

    #[error("unknown capability: {0}")]
    InvalidCapability(String),

    #[error("no agent found with id {0}")]
    NotFound(AgentId),

    #[error("agent {agent_id} is {status} and immutable")]
    Immutable { agent_id: AgentId, status: &'static str },

    #[error("invalid transition from {from} via {action}")]
    InvalidTransition { from: &'static str, action: &'static str },

    #[error("operation refused, system is frozen: {0}")]
    Frozen(String),

    #[error("{0}")]
    Policy(String),

    #[error("audit store error: {0}")]
    Audit(#[from] sentinel_audit::AuditError),

    #[error("freeze registry error: {0}")]
    Freeze(#[from] sentinel_freeze::FreezeError),

    #[error("notification bus error: {0}")]
    Notify(#[from] sentinel_notify::NotifyError),
}

impl From<LifecycleError> for sentinel_core::Error {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::DuplicateName { name } => {
                sentinel_core::Error::Policy(format!("duplicate agent name: {name}"))
            }
            LifecycleError::QuotaExceeded => {
                sentinel_core::Error::Policy("tenant agent quota exceeded".to_string())
            }
            LifecycleError::InvalidCapability(c) => {
                sentinel_core::Error::Validation(format!("unknown capability: {c}"))
            }
            LifecycleError::NotFound(id) => sentinel_core::Error::NotFound {
                kind: "agent",
                id: id.to_string(),
            },
            LifecycleError::Immutable { agent_id, status } => sentinel_core::Error::Policy(
                format!("agent {agent_id} is {status} and immutable"),
            ),
            LifecycleError::InvalidTransition { from, action } => sentinel_core::Error::Validation(
                format!("invalid transition from {from} via {action}"),
            ),
            LifecycleError::Frozen(reason) => sentinel_core::Error::Frozen {
                scope: "system".to_string(),
                reason,
            },
            LifecycleError::Policy(msg) => sentinel_core::Error::Policy(msg),
            LifecycleError::Audit(e) => e.into(),
            LifecycleError::Freeze(e) => e.into(),
            LifecycleError::Notify(e) => e.into(),
        }
    }
}
