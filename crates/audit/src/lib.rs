//! Sentinel: the Code-of-Conduct Activity Log (spec §4.1).
//!
//! Append-only, hash-chained per agent, with synchronous risk
//! classification happening one layer up in `sentinel-classify` -- this
//! crate only knows how to store an already-assessed `Activity` and prove
//! its chain is intact.

pub mod activity;
pub mod error;
pub mod store;

pub use activity::{Activity, ActivityDraft, ActivityFilter, SecurityViolation, Window};
pub use error::AuditError;
pub use store::{AuditBackend, AuditStore, ChainVerification, InMemoryAuditBackend};
