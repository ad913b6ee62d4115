//! Opaque identifiers shared across the control plane.
//!
//! Every identity is a ULID-backed newtype (via `uuid::Uuid::now_v7`, which is
//! lexicographically sortable like a ULID) rather than a bare `String` or
//! `i64`, so a caller can never accidentally pass a `TenantId` where an
//! `AgentId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new, time-ordered identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// All-zero identifier, used only as the audit chain's genesis marker.
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

opaque_id!(AgentId);
opaque_id!(TenantId);
opaque_id!(ActivityId);
opaque_id!(NotificationId);
opaque_id!(FreezeId);
opaque_id!(ApprovalId);
opaque_id!(CorrelationId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let id = AgentId::new();
        let parsed: AgentId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn genesis_is_nil() {
        assert_eq!(ActivityId::nil().as_uuid(), Uuid::nil());
    }

    #[test]
    fn distinct_types_do_not_compare() {
        let agent = AgentId::new();
        let tenant = TenantId::from_uuid(agent.as_uuid());
        // Same underlying uuid, but the compiler keeps the types apart --
        // this test documents that fact rather than exercising behavior.
        assert_eq!(agent.as_uuid(), tenant.as_uuid());
    }
}
