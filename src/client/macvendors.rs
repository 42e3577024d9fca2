//! MacVendors API client implementation
//!
//! Two variants share one classification contract:
//! - free: `GET {url}/{prefix}`, plain-text vendor name
//! - paid: `GET {url}/v1/lookup/{prefix}` with a bearer token, JSON body

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::Value;

use super::{CircuitBreaker, LookupOutcome, RateController, VendorApi};
use crate::config::{CircuitConfig, VendorApiConfig};
use crate::error::{ApiError, Result};

const USER_AGENT: &str = concat!("kismet-enrich/", env!("CARGO_PKG_VERSION"));

/// MacVendors API client
pub struct MacVendorsClient {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    rate: Arc<RateController>,
    breaker: Arc<CircuitBreaker>,
}

impl MacVendorsClient {
    /// Create a client with its own rate controller and circuit breaker
    pub fn new(api: &VendorApiConfig, circuit: &CircuitConfig) -> Result<Self> {
        let rate = RateController::new(api.min_interval_secs, api.max_interval_secs)
            .with_max_rps(api.max_requests_per_second);
        let breaker = CircuitBreaker::new(
            circuit.failure_threshold,
            std::time::Duration::from_secs(circuit.cooldown_secs),
        );
        Self::with_parts(api, Arc::new(rate), Arc::new(breaker))
    }

    /// Create a client around shared pacing and breaker state
    pub fn with_parts(
        api: &VendorApiConfig,
        rate: Arc<RateController>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(api.timeout())
            .connect_timeout(api.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: api.url.trim_end_matches('/').to_string(),
            api_key: api.api_key.clone().filter(|k| !k.is_empty()),
            rate,
            breaker,
        })
    }

    pub fn rate_controller(&self) -> &RateController {
        &self.rate
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Whether requests use the authenticated JSON variant
    pub fn is_authenticated(&self) -> bool {
        self.api_key.is_some()
    }

    fn url_for(&self, prefix: &str) -> String {
        match self.api_key {
            Some(_) => format!("{}/v1/lookup/{}", self.base_url, prefix),
            None => format!("{}/{}", self.base_url, prefix),
        }
    }

    /// Single HTTP round trip, no feedback applied
    async fn fetch(&self, prefix: &str) -> std::result::Result<LookupOutcome, ApiError> {
        let mut request = self.http.get(self.url_for(prefix));
        if let Some(key) = &self.api_key {
            request = request
                .header("Authorization", format!("Bearer {}", key))
                .header("Accept", "application/json");
        }

        let response = request.send().await.map_err(ApiError::from)?;
        let status = response.status();
        match status {
            StatusCode::OK => {
                let body = response.text().await.map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to read response: {}", e))
                })?;
                Ok(match parse_vendor_body(&body) {
                    Some(name) => LookupOutcome::Found(name),
                    None => LookupOutcome::NotFound,
                })
            }
            StatusCode::NOT_FOUND => Ok(LookupOutcome::NotFound),
            StatusCode::TOO_MANY_REQUESTS => {
                if let Some(retry_after) = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                {
                    debug!("Vendor API asked to retry after {}s", retry_after);
                }
                Ok(LookupOutcome::Throttled)
            }
            status if status.is_server_error() => {
                Err(ApiError::ServerError(format!("HTTP {}", status.as_u16())))
            }
            _ => Err(ApiError::InvalidResponse(format!(
                "Unexpected status code: {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl VendorApi for MacVendorsClient {
    async fn lookup(&self, prefix: &str) -> LookupOutcome {
        if self.breaker.is_open() {
            debug!("Circuit open, skipping lookup for {}", prefix);
            return LookupOutcome::Throttled;
        }

        self.rate.pace().await;

        let outcome = match self.fetch(prefix).await {
            Ok(outcome) => outcome,
            Err(e) => LookupOutcome::TransientError(e.to_string()),
        };

        match &outcome {
            LookupOutcome::Found(_) | LookupOutcome::NotFound => {
                self.rate.decrease();
                self.breaker.record_success();
            }
            LookupOutcome::Throttled => {
                self.rate.increase();
                self.breaker.record_failure();
            }
            LookupOutcome::TransientError(reason) => {
                warn!("Vendor lookup for {} failed: {}", prefix, reason);
                self.breaker.record_failure();
            }
        }
        outcome
    }

    fn circuit_open(&self) -> bool {
        self.breaker.is_open()
    }
}

/// Extract a vendor name from either a JSON or a plain-text body
fn parse_vendor_body(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let name = json
            .pointer("/data/organization_name")
            .or_else(|| json.get("organization_name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        return match (name, &json) {
            (Some(name), _) => Some(name.to_string()),
            // A bare JSON string is still a name
            (None, Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            (None, _) => None,
        };
    }

    Some(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn config(url: &str, api_key: Option<&str>) -> VendorApiConfig {
        VendorApiConfig {
            url: url.to_string(),
            api_key: api_key.map(str::to_string),
            min_interval_secs: 0.0,
            max_interval_secs: 0.2,
            timeout_secs: 5,
            max_requests_per_second: None,
        }
    }

    fn client(url: &str, api_key: Option<&str>, threshold: u32) -> MacVendorsClient {
        let circuit = CircuitConfig {
            failure_threshold: threshold,
            cooldown_secs: 300,
        };
        MacVendorsClient::new(&config(url, api_key), &circuit).unwrap()
    }

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(parse_vendor_body("Cisco Systems, Inc\n").as_deref(), Some("Cisco Systems, Inc"));
        assert!(parse_vendor_body("   ").is_none());
    }

    #[test]
    fn test_parse_json_shapes() {
        let nested = r#"{"data":{"organization_name":"Apple, Inc.","assignment":"MA-L"}}"#;
        assert_eq!(parse_vendor_body(nested).as_deref(), Some("Apple, Inc."));

        let flat = r#"{"organization_name":"Intel Corporate"}"#;
        assert_eq!(parse_vendor_body(flat).as_deref(), Some("Intel Corporate"));

        let missing = r#"{"errors":{"detail":"Not Found"}}"#;
        assert!(parse_vendor_body(missing).is_none());
    }

    #[tokio::test]
    async fn test_free_variant_found() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/00-11-22")
            .with_status(200)
            .with_body("Cimsys Inc")
            .create_async()
            .await;

        let client = client(&server.url(), None, 10);
        assert_eq!(
            client.lookup("00-11-22").await,
            LookupOutcome::Found("Cimsys Inc".to_string())
        );
    }

    #[tokio::test]
    async fn test_authenticated_variant_sends_token() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/v1/lookup/00-11-22")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"organization_name":"Cimsys Inc"}}"#)
            .create_async()
            .await;

        let client = client(&server.url(), Some("secret"), 10);
        assert!(client.is_authenticated());
        assert_eq!(
            client.lookup("00-11-22").await,
            LookupOutcome::Found("Cimsys Inc".to_string())
        );
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_is_a_success() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/FF-FF-FF")
            .with_status(404)
            .with_body(r#"{"errors":{"detail":"Not Found"}}"#)
            .create_async()
            .await;

        let client = client(&server.url(), None, 1);
        assert_eq!(client.lookup("FF-FF-FF").await, LookupOutcome::NotFound);
        assert_eq!(client.breaker().failures(), 0);
    }

    #[tokio::test]
    async fn test_throttle_raises_interval_and_counts_failure() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/00-11-22")
            .with_status(429)
            .create_async()
            .await;

        let client = client(&server.url(), None, 10);
        assert_eq!(client.lookup("00-11-22").await, LookupOutcome::Throttled);
        assert!(client.rate_controller().current_secs() > 0.0);
        assert_eq!(client.breaker().failures(), 1);
    }

    #[tokio::test]
    async fn test_server_error_keeps_interval() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/00-11-22")
            .with_status(503)
            .create_async()
            .await;

        let client = client(&server.url(), None, 10);
        let outcome = client.lookup("00-11-22").await;
        assert!(matches!(outcome, LookupOutcome::TransientError(_)));
        assert_eq!(client.rate_controller().current_secs(), 0.0);
        assert_eq!(client.breaker().failures(), 1);
    }

    #[tokio::test]
    async fn test_network_error_is_transient() {
        // Nothing listens on port 9 (discard) in the test environment
        let client = client("http://127.0.0.1:9", None, 10);
        let outcome = client.lookup("00-11-22").await;
        assert!(matches!(outcome, LookupOutcome::TransientError(_)));
        assert_eq!(client.rate_controller().current_secs(), 0.0);
    }

    #[tokio::test]
    async fn test_open_breaker_suppresses_calls() {
        let mut server = mockito::Server::new_async().await;
        let throttled = server
            .mock("GET", "/00-11-22")
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let client = client(&server.url(), None, 2);
        client.lookup("00-11-22").await;
        client.lookup("00-11-22").await;
        assert!(client.circuit_open());

        // Third call must not reach the server
        assert_eq!(client.lookup("00-11-22").await, LookupOutcome::Throttled);
        throttled.assert_async().await;
        assert!(client.breaker().remaining_cooldown() > Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_breaker_lets_calls_through_after_cooldown() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/00-11-22")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::with_clock(2, Duration::from_secs(60), clock.clone());
        let client = MacVendorsClient::with_parts(
            &config(&server.url(), None),
            Arc::new(RateController::new(0.0, 0.2)),
            Arc::new(breaker),
        )
        .unwrap();

        client.lookup("00-11-22").await;
        client.lookup("00-11-22").await;
        assert!(client.circuit_open());
        assert_eq!(client.lookup("00-11-22").await, LookupOutcome::Throttled);
        failing.assert_async().await;
        failing.remove_async().await;

        let recovered = server
            .mock("GET", "/00-11-22")
            .with_status(200)
            .with_body("Cimsys Inc")
            .expect(1)
            .create_async()
            .await;

        clock.advance(Duration::from_secs(61));
        assert!(!client.circuit_open());
        assert_eq!(
            client.lookup("00-11-22").await,
            LookupOutcome::Found("Cimsys Inc".to_string())
        );
        recovered.assert_async().await;
        assert_eq!(client.breaker().failures(), 0);
    }
}
