//! Bounded retry helpers
//!
//! Throttled or failing prefixes are retried a few times with jittered
//! exponential backoff. Whatever is still unresolved afterwards waits in a
//! bounded queue for one more pass once the batch has finished.

use std::collections::VecDeque;
use std::time::Duration;

use log::debug;
use rand::Rng;

/// Capacity of the deferred retry queue
pub const RETRY_QUEUE_CAPACITY: usize = 50;

/// Exponential backoff with full jitter, `attempt` counted from 0
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.min(16)));
    let ceiling = exp.min(cap);
    if ceiling.is_zero() {
        return ceiling;
    }
    rand::thread_rng().gen_range(Duration::ZERO..=ceiling)
}

/// FIFO of prefixes awaiting a deferred retry; the oldest entry is dropped when full
#[derive(Debug)]
pub struct RetryQueue {
    items: VecDeque<String>,
    capacity: usize,
    dropped: usize,
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::with_capacity(RETRY_QUEUE_CAPACITY)
    }
}

impl RetryQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Queue a prefix, ignoring duplicates
    pub fn push(&mut self, prefix: String) {
        if self.items.contains(&prefix) {
            return;
        }
        if self.items.len() == self.capacity {
            if let Some(oldest) = self.items.pop_front() {
                debug!("Retry queue full, dropping {}", oldest);
                self.dropped += 1;
            }
        }
        self.items.push_back(prefix);
    }

    /// Take every queued prefix, oldest first
    pub fn drain(&mut self) -> Vec<String> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries evicted because the queue was full
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
