//! Adaptive pacing for the vendor lookup API
//!
//! The provider does not publish its limit, so the spacing between calls is
//! learned: throttling doubles the interval, clean responses shrink it.
//! Every worker sleeps for the current interval on its own; nothing
//! serialises calls behind a global lock. An optional hard cap on requests
//! per second is enforced with a `governor` token bucket on top.

use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, warn};

/// Multiplier applied on a throttling signal
pub const INCREASE_FACTOR: f64 = 2.0;

/// Multiplier applied on a clean response
pub const DECREASE_FACTOR: f64 = 0.8;

/// Shared, adaptive interval between outbound calls.
pub struct RateController {
    interval: Mutex<f64>,
    min_secs: f64,
    max_secs: f64,
    cap: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateController {
    /// Create a controller starting at the floor.
    ///
    /// Bounds are clamped so that `0 <= min <= max`.
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        let min_secs = min_secs.max(0.0);
        let max_secs = max_secs.max(min_secs);
        Self {
            interval: Mutex::new(min_secs),
            min_secs,
            max_secs,
            cap: None,
        }
    }

    /// Add a hard requests-per-second cap across all workers
    pub fn with_max_rps(mut self, max_rps: Option<u32>) -> Self {
        self.cap = max_rps
            .and_then(NonZeroU32::new)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));
        self
    }

    /// Current interval in seconds
    pub fn current_secs(&self) -> f64 {
        *self.lock()
    }

    /// Current interval
    pub fn current(&self) -> Duration {
        Duration::from_secs_f64(self.current_secs())
    }

    pub fn min_secs(&self) -> f64 {
        self.min_secs
    }

    pub fn max_secs(&self) -> f64 {
        self.max_secs
    }

    /// Back off after a throttling signal; returns the new interval
    pub fn increase(&self) -> f64 {
        let mut interval = self.lock();
        // A zero floor would never grow multiplicatively
        let base = if *interval > 0.0 { *interval } else { 1.0 };
        *interval = (base * INCREASE_FACTOR).min(self.max_secs);
        warn!("Vendor API throttled, interval raised to {:.2}s", *interval);
        *interval
    }

    /// Speed up after a clean response; returns the new interval
    pub fn decrease(&self) -> f64 {
        let mut interval = self.lock();
        *interval = (*interval * DECREASE_FACTOR).max(self.min_secs);
        debug!("Vendor API interval lowered to {:.2}s", *interval);
        *interval
    }

    /// Sleep for the current interval, then wait for the hard cap if one is set
    pub async fn pace(&self) {
        let wait = self.current();
        if !wait.is_zero() {
            debug!("Pacing vendor API call for {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        if let Some(cap) = &self.cap {
            cap.until_ready().await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, f64> {
        // Pacing is advisory, a poisoned value is still usable
        self.interval
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
