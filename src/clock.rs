//! Time sources for pacing, breaker cooldowns and cache TTLs

use chrono::{DateTime, Utc};
use std::time::Instant;

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic instant, used for cooldown arithmetic
    fn now(&self) -> Instant;

    /// Wall-clock time, used for persisted timestamps
    fn utc_now(&self) -> DateTime<Utc>;
}

/// The real system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Clock that only moves when told to
    pub struct ManualClock {
        base: Instant,
        base_utc: DateTime<Utc>,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                base: Instant::now(),
                base_utc: Utc::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut offset = self.offset.lock().unwrap();
            *offset += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }

        fn utc_now(&self) -> DateTime<Utc> {
            let offset = *self.offset.lock().unwrap();
            self.base_utc + chrono::Duration::from_std(offset).unwrap()
        }
    }
}
