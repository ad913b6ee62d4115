use sentinel_core::AgentId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("concurrent write to the audit chain for agent {0}, retry with backoff")]
    ConcurrentWrite(AgentId),

    #[error("audit backend unavailable: {0}")]
    StoreUnavailable(String),

    #[error("no activity found with id {0}")]
    NotFound(String),
}

impl From<AuditError> for sentinel_core::Error {
    fn from(e: AuditError) -> Self {
        match e {
            AuditError::ConcurrentWrite(agent_id) => {
                sentinel_core::Error::Conflict(agent_id.to_string())
            }
            AuditError::StoreUnavailable(msg) => sentinel_core::Error::ControlPlaneUnavailable(msg),
            AuditError::NotFound(id) => sentinel_core::Error::NotFound {
                kind: "activity",
                id,
            },
        }
    }
}
