//! Sentinel: the Approval & Notification Bus (spec §4.6).
//!
//! Surfaces risk events to administrators and gates destructive lifecycle
//! actions behind single-use, TTL-bounded approval requests.

pub mod backend;
pub mod bus;
pub mod channel;
pub mod error;
pub mod notification;

pub use backend::{InMemoryNotificationBackend, NotificationBackend};
pub use bus::{NotificationBus, NotificationDraft};
pub use channel::{ChannelKind, LoggingChannel, NotificationChannel};
pub use error::NotifyError;
pub use notification::{
    ApprovalAction, ApprovalRequest, ApprovalStatus, Notification, NotificationDecision,
    NotificationStatus,
};
