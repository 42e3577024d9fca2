//! Circuit breaker guarding the vendor lookup API
//!
//! Consecutive throttling or transient failures open the breaker. While
//! open, callers skip the network entirely. Once the cooldown since the
//! last failure has elapsed every caller is let through again; the next
//! recorded outcome either resets the counter or re-opens the breaker.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{error, info};

use crate::clock::{Clock, SystemClock};

#[derive(Debug, Default)]
struct BreakerState {
    failures: u32,
    last_failure: Option<Instant>,
}

/// Shared failure counter with a cooldown window
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self::with_clock(threshold, cooldown, Arc::new(SystemClock))
    }

    pub fn with_clock(threshold: u32, cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold: threshold.max(1),
            cooldown,
            clock,
        }
    }

    /// Whether calls must be skipped right now
    pub fn is_open(&self) -> bool {
        let state = self.lock();
        if state.failures < self.threshold {
            return false;
        }
        match state.last_failure {
            Some(at) => self.clock.now().saturating_duration_since(at) < self.cooldown,
            None => false,
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.failures = state.failures.saturating_add(1);
        state.last_failure = Some(self.clock.now());
        if state.failures == self.threshold {
            error!(
                "Circuit breaker opened after {} consecutive failures, pausing lookups for {:?}",
                state.failures, self.cooldown
            );
        }
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        if state.failures >= self.threshold {
            info!("Circuit breaker closed");
        }
        state.failures = 0;
    }

    /// Consecutive failures recorded so far
    pub fn failures(&self) -> u32 {
        self.lock().failures
    }

    /// Time left until calls are allowed again, if open
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        let state = self.lock();
        if state.failures < self.threshold {
            return None;
        }
        let elapsed = self
            .clock
            .now()
            .saturating_duration_since(state.last_failure?);
        self.cooldown.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
