use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurveillanceError {
    #[error("lifecycle manager error: {0}")]
    Lifecycle(#[from] sentinel_lifecycle::LifecycleError),

    #[error("audit store error: {0}")]
    Audit(#[from] sentinel_audit::AuditError),

    #[error("notification bus error: {0}")]
    Notify(#[from] sentinel_notify::NotifyError),
}

impl From<SurveillanceError> for sentinel_core::Error {
    fn from(e: SurveillanceError) -> Self {
        match e {
            SurveillanceError::Lifecycle(e) => e.into(),
            SurveillanceError::Audit(e) => e.into(),
            SurveillanceError::Notify(e) => e.into(),
        }
    }
}
