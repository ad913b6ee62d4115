use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no notification found with id {0}")]
    NotificationNotFound(String),

    #[error("notification {0} is already resolved and cannot be changed")]
    NotificationResolved(String),

    #[error("no approval request found with id {0}")]
    ApprovalNotFound(String),

    #[error("approval request {0} is not pending (status: {1})")]
    ApprovalNotPending(String, &'static str),

    #[error("approval request {0} has expired")]
    ApprovalExpired(String),

    #[error("approval request {0} was already consumed")]
    ApprovalAlreadyConsumed(String),

    #[error("notification backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl From<NotifyError> for sentinel_core::Error {
    fn from(e: NotifyError) -> Self {
        match e {
            NotifyError::NotificationNotFound(id) => sentinel_core::Error::NotFound {
                kind: "notification",
                id,
            },
            NotifyError::ApprovalNotFound(id) => sentinel_core::Error::NotFound {
                kind: "approval_request",
                id,
            },
            NotifyError::NotificationResolved(id) => {
                sentinel_core::Error::Policy(format!("notification {id} already resolved"))
            }
            NotifyError::ApprovalNotPending(id, status) => {
                sentinel_core::Error::Policy(format!("approval {id} is {status}, not pending"))
            }
            NotifyError::ApprovalExpired(id) => {
                sentinel_core::Error::Policy(format!("approval {id} has expired"))
            }
            NotifyError::ApprovalAlreadyConsumed(id) => {
                sentinel_core::Error::Policy(format!("approval {id} was already consumed"))
            }
            NotifyError::BackendUnavailable(msg) => {
                sentinel_core::Error::ControlPlaneUnavailable(msg)
            }
        }
    }
}
