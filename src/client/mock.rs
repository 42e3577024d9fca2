//! Mock vendor API for testing
//!
//! Scripted per-prefix outcomes, call counting and hang injection so the
//! enrichment pipeline can be exercised without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CircuitBreaker, LookupOutcome, VendorApi};

/// What the mock does for one call
#[derive(Debug, Clone)]
pub enum MockReply {
    Outcome(LookupOutcome),
    /// Never completes
    Hang,
}

/// Mock API client for testing.
///
/// # Example
/// ```ignore
/// let mock = MockVendorApi::new()
///     .with_vendor("00-11-22", "Acme")
///     .with_script("AA-BB-CC", vec![LookupOutcome::Throttled, LookupOutcome::NotFound]);
/// ```
pub struct MockVendorApi {
    /// Per-prefix replies; the last one repeats once the script is exhausted
    scripts: Mutex<HashMap<String, VecDeque<MockReply>>>,
    /// Reply for prefixes without a script
    fallback: LookupOutcome,
    calls: AtomicUsize,
    calls_by_prefix: Mutex<HashMap<String, usize>>,
    /// Feedback target, mirroring what the real client does
    breaker: Option<Arc<CircuitBreaker>>,
}

impl Default for MockVendorApi {
    fn default() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: LookupOutcome::NotFound,
            calls: AtomicUsize::new(0),
            calls_by_prefix: Mutex::new(HashMap::new()),
            breaker: None,
        }
    }
}

impl MockVendorApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `Found(name)` for `prefix`
    pub fn with_vendor(self, prefix: &str, name: &str) -> Self {
        self.with_replies(prefix, vec![MockReply::Outcome(LookupOutcome::Found(name.to_string()))])
    }

    /// Answer with `outcomes` in order
    pub fn with_script(self, prefix: &str, outcomes: Vec<LookupOutcome>) -> Self {
        self.with_replies(prefix, outcomes.into_iter().map(MockReply::Outcome).collect())
    }

    /// Never answer for `prefix`
    pub fn with_hang(self, prefix: &str) -> Self {
        self.with_replies(prefix, vec![MockReply::Hang])
    }

    /// Reply for prefixes without a script
    pub fn with_fallback(mut self, outcome: LookupOutcome) -> Self {
        self.fallback = outcome;
        self
    }

    /// Record successes and failures on `breaker` and honour it
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    fn with_replies(self, prefix: &str, replies: Vec<MockReply>) -> Self {
        self.scripts
            .try_lock()
            .expect("mock is not shared while being built")
            .insert(prefix.to_string(), replies.into());
        self
    }

    /// Total lookups that reached the mock
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Lookups that reached the mock for one prefix
    pub async fn calls_for(&self, prefix: &str) -> usize {
        self.calls_by_prefix
            .lock()
            .await
            .get(prefix)
            .copied()
            .unwrap_or(0)
    }

    async fn next_reply(&self, prefix: &str) -> MockReply {
        let mut scripts = self.scripts.lock().await;
        match scripts.get_mut(prefix) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(MockReply::Hang),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or(MockReply::Outcome(self.fallback.clone())),
            None => MockReply::Outcome(self.fallback.clone()),
        }
    }
}

#[async_trait]
impl VendorApi for MockVendorApi {
    async fn lookup(&self, prefix: &str) -> LookupOutcome {
        if self.circuit_open() {
            return LookupOutcome::Throttled;
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_prefix
            .lock()
            .await
            .entry(prefix.to_string())
            .or_insert(0) += 1;

        let outcome = match self.next_reply(prefix).await {
            MockReply::Outcome(outcome) => outcome,
            MockReply::Hang => std::future::pending().await,
        };

        if let Some(breaker) = &self.breaker {
            if outcome.is_retryable() {
                breaker.record_failure();
            } else {
                breaker.record_success();
            }
        }
        outcome
    }

    fn circuit_open(&self) -> bool {
        self.breaker.as_ref().is_some_and(|b| b.is_open())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_script_then_repeat_last() {
        let mock = MockVendorApi::new().with_script(
            "00-11-22",
            vec![LookupOutcome::Throttled, LookupOutcome::Found("Acme".into())],
        );

        assert_eq!(mock.lookup("00-11-22").await, LookupOutcome::Throttled);
        assert_eq!(mock.lookup("00-11-22").await, LookupOutcome::Found("Acme".into()));
        assert_eq!(mock.lookup("00-11-22").await, LookupOutcome::Found("Acme".into()));
        assert_eq!(mock.calls_for("00-11-22").await, 3);
    }

    #[tokio::test]
    async fn test_fallback_and_counts() {
        let mock = MockVendorApi::new();
        assert_eq!(mock.lookup("AA-BB-CC").await, LookupOutcome::NotFound);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_hang_never_completes() {
        let mock = MockVendorApi::new().with_hang("00-11-22");
        let result = tokio::time::timeout(Duration::from_millis(50), mock.lookup("00-11-22")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_breaker_short_circuits() {
        let breaker = Arc::new(CircuitBreaker::new(1, Duration::from_secs(60)));
        let mock = MockVendorApi::new()
            .with_fallback(LookupOutcome::TransientError("down".into()))
            .with_breaker(breaker.clone());

        mock.lookup("00-11-22").await;
        assert!(mock.circuit_open());
        assert_eq!(mock.lookup("00-11-22").await, LookupOutcome::Throttled);
        assert_eq!(mock.call_count(), 1);
    }
}
