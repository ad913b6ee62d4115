use thiserror::Error;

#[derive(Debug, Error)]
pub enum FreezeError {
    #[error("freeze backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("{actor} is not an authorized admin principal")]
    NotAuthorized { actor: String },

    #[error("no active freeze found for scope {0}")]
    NotFound(String),
}

impl From<FreezeError> for sentinel_core::Error {
    fn from(e: FreezeError) -> Self {
        match e {
            FreezeError::BackendUnavailable(msg) => {
                sentinel_core::Error::ControlPlaneUnavailable(msg)
            }
            FreezeError::NotAuthorized { actor } => {
                sentinel_core::Error::Policy(format!("{actor} is not authorized to unfreeze"))
            }
            FreezeError::NotFound(scope) => sentinel_core::Error::NotFound {
                kind: "freeze_record",
                id: scope,
            },
        }
    }
}
