//! Monotonic time source.
//!
//! Every timestamp recorded by the control plane goes through a `Clock`
//! rather than calling `Utc::now()` directly, so surveillance cycles and
//! audit chains can be driven deterministically in tests.

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time, backed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;
    use parking_lot::Mutex;

    /// A clock that only advances when told to -- for deterministic tests of
    /// heartbeat timeouts, approval expiry, and surveillance cadence.
    pub struct FrozenClock(Mutex<DateTime<Utc>>);

    impl FrozenClock {
        pub fn new(at: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(at)))
        }

        pub fn advance(&self, delta: chrono::Duration) {
            *self.0.lock() += delta;
        }
    }

    impl Clock for FrozenClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock()
        }
    }
}
