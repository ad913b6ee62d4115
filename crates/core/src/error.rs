//! Unified error taxonomy (spec §7).
//!
//! Every crate in the workspace defines its own narrow error enum for its
//! own operations (e.g. `sentinel_freeze::FreezeError`) and converts it into
//! this one at the Façade boundary, the way the teacher composes
//! `agentkern_gate`/`agentkern_arbiter` errors into a single response type
//! at the server layer. Keeping `retryable()` on the unified type, rather
//! than scattered through call sites, is what lets a caller implement the
//! bounded-backoff-then-surface policy in one place.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("policy violation: {0}")]
    Policy(String),

    #[error("operation refused, {scope} is frozen: {reason}")]
    Frozen { scope: String, reason: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("concurrent write conflict on {0}, retry with backoff")]
    Conflict(String),

    #[error("audit chain integrity violation for agent {agent_id} at position {first_break_at}")]
    AuditIntegrityViolation {
        agent_id: String,
        first_break_at: u64,
    },

    #[error("control plane unavailable: {0}")]
    ControlPlaneUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a caller should retry internally with bounded backoff before
    /// surfacing the error, per spec §7's propagation policy.
    pub fn retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Whether this error must escalate to a system freeze + critical
    /// notification rather than ever being swallowed (spec §7).
    pub fn must_escalate(&self) -> bool {
        matches!(self, Error::AuditIntegrityViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
