//! Sentinel: clock & identity primitives, shared error taxonomy, and
//! configuration for the Agent Control Plane.
//!
//! Every other crate in this workspace depends on `sentinel-core` and
//! nothing else upstream of it -- it is the leaf of the dependency graph,
//! matching the teacher's `agentkern-governance` role as the
//! single-source-of-truth crate re-exported by the pillar crates.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod types;

pub use clock::{system_clock, Clock, SharedClock};
pub use config::SentinelConfig;
pub use error::{Error, Result};
pub use events::{DomainEvent, EventSink, LoggingEventSink};
pub use ids::{ActivityId, AgentId, ApprovalId, CorrelationId, FreezeId, NotificationId, TenantId};
pub use types::{
    ActivityType, AgentStatus, FreezeScope, RecommendedAction, RiskAssessment, RiskLevel,
    SystemAction, ViolationSeverity,
};
