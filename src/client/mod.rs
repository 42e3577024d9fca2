//! Vendor lookup API client

use async_trait::async_trait;

pub mod circuit;
pub mod macvendors;
#[cfg(test)]
pub mod mock;
pub mod rate_limit;

pub use circuit::CircuitBreaker;
pub use macvendors::MacVendorsClient;
#[cfg(test)]
pub use mock::MockVendorApi;
pub use rate_limit::RateController;

/// Classified result of a single vendor lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// HTTP 200 with a vendor name
    Found(String),
    /// HTTP 404, the prefix has no registered vendor
    NotFound,
    /// HTTP 429, or the circuit breaker is open
    Throttled,
    /// 5xx, network failure or timeout
    TransientError(String),
}

impl LookupOutcome {
    /// Whether a later attempt could produce a different answer
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled | Self::TransientError(_))
    }
}

/// Vendor lookup API trait
///
/// Implementations never fail: transport problems come back as
/// [`LookupOutcome::TransientError`].
#[async_trait]
pub trait VendorApi: Send + Sync {
    /// Look up the vendor of a MAC prefix (`AA-BB-CC`)
    async fn lookup(&self, prefix: &str) -> LookupOutcome;

    /// Whether calls are currently short-circuited
    fn circuit_open(&self) -> bool {
        false
    }
}
