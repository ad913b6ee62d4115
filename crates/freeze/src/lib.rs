//! Sentinel: the Freeze Registry (spec §4.4).
//!
//! Single authoritative cache of which agents, modules, and the system as
//! a whole are currently frozen, consulted before executing any
//! state-changing Façade operation.

pub mod error;
pub mod record;
pub mod registry;

pub use error::FreezeError;
pub use record::FreezeRecord;
pub use registry::{FreezeBackend, FreezeOutcome, FreezeRegistry, InMemoryFreezeBackend};
