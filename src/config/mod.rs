//! Configuration management for kismet-enrich
//!
//! Settings come from an optional YAML file and are then overridden by
//! environment variables. Every field has a default so a missing file is
//! not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Default MacVendors endpoint
pub const DEFAULT_API_URL: &str = "https://api.macvendors.com";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vendor lookup API settings
    pub vendor_api: VendorApiConfig,

    /// Batch enrichment settings
    pub enrichment: EnrichmentConfig,

    /// Circuit breaker settings
    pub circuit: CircuitConfig,

    /// Persistent vendor store settings
    pub store: StoreConfig,

    /// SSID provider matching settings
    pub provider: ProviderConfig,

    /// Capture file reading settings
    pub capture: CaptureConfig,
}

/// Vendor lookup API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorApiConfig {
    /// Base URL of the vendor lookup API
    pub url: String,

    /// Bearer token; selects the authenticated JSON variant when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Floor of the adaptive interval between calls, in seconds
    pub min_interval_secs: f64,

    /// Ceiling of the adaptive interval between calls, in seconds
    pub max_interval_secs: f64,

    /// Connect/read timeout per request, in seconds
    pub timeout_secs: u64,

    /// Optional hard cap on requests per second across all workers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests_per_second: Option<u32>,
}

impl Default for VendorApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            api_key: None,
            min_interval_secs: 3.0,
            max_interval_secs: 60.0,
            timeout_secs: 20,
            max_requests_per_second: None,
        }
    }
}

impl VendorApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Batch enrichment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// MACs per sub-batch
    pub batch_size: usize,

    /// Maximum concurrent lookups within a sub-batch
    pub max_workers: usize,

    /// Wall-clock limit for one sub-batch, in seconds
    pub batch_timeout_secs: u64,

    /// Bounded re-attempts for throttled or transient lookups
    pub max_retries: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            max_workers: 4,
            batch_timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,

    /// Seconds the breaker stays open after the last failure
    pub cooldown_secs: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            cooldown_secs: 300,
        }
    }
}

/// Persistent vendor store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the store database (defaults to the XDG cache dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Days a not-found entry suppresses API calls
    pub not_found_ttl_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            not_found_ttl_days: 180,
        }
    }
}

impl StoreConfig {
    pub fn not_found_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.not_found_ttl_days) * 24 * 60 * 60)
    }
}

/// SSID provider matching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Minimum cosine similarity for the embedding fallback
    pub similarity_threshold: f32,

    /// Sentence-embedding server; the local hashing embedder is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_url: Option<String>,

    /// Provider roster file (YAML); the built-in roster is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster_path: Option<PathBuf>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.75,
            embedding_url: None,
            roster_path: None,
        }
    }
}

/// Capture file reading settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Keep access points reported at 0/0 coordinates
    pub process_without_location: bool,

    /// SSIDs (words or patterns) that are never exported
    pub excluded_ssids: Vec<String>,

    /// Swap latitude and longitude columns when reading captures
    pub flip_coordinates: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            process_without_location: true,
            excluded_ssids: Vec::new(),
            flip_coordinates: false,
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".kismet-enrich").join("config.yaml"))
    }

    /// Load configuration from an explicit path or the default location.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file yields the defaults. Environment overrides are applied last.
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(Path::new(p))?,
            None => {
                let default = Self::default_path()?;
                if default.exists() {
                    Self::load_from(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()).into());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;
        std::fs::write(path, contents)?;

        // The file may carry the API token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Apply environment-style overrides.
    ///
    /// `lookup` abstracts the environment so tests do not mutate process state.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("API_KEY_MACVENDOR").filter(|v| !v.is_empty()) {
            self.vendor_api.api_key = Some(v);
        }
        if let Some(v) = lookup("MACVENDOR_API_URL") {
            self.vendor_api.url = v;
        }
        if let Some(v) = lookup("MACVENDOR_API_INTERVAL") {
            self.vendor_api.min_interval_secs = parse_env("MACVENDOR_API_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("MACVENDOR_API_MAX_INTERVAL") {
            self.vendor_api.max_interval_secs = parse_env("MACVENDOR_API_MAX_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("MACVENDOR_API_TIMEOUT") {
            let secs: f64 = parse_env("MACVENDOR_API_TIMEOUT", &v)?;
            self.vendor_api.timeout_secs = secs.ceil().max(1.0) as u64;
        }
        if let Some(v) = lookup("MACVENDOR_MAX_RPS") {
            self.vendor_api.max_requests_per_second = Some(parse_env("MACVENDOR_MAX_RPS", &v)?);
        }
        if let Some(v) = lookup("MACVENDOR_BATCH_SIZE") {
            self.enrichment.batch_size = parse_env("MACVENDOR_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("NUM_WORKERS") {
            self.enrichment.max_workers = parse_env("NUM_WORKERS", &v)?;
        }
        if let Some(v) = lookup("MACVENDOR_BATCH_TIMEOUT") {
            self.enrichment.batch_timeout_secs = parse_env("MACVENDOR_BATCH_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("MACVENDOR_MAX_RETRIES") {
            self.enrichment.max_retries = parse_env("MACVENDOR_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("MACVENDOR_CIRCUIT_THRESHOLD") {
            self.circuit.failure_threshold = parse_env("MACVENDOR_CIRCUIT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("MACVENDOR_CIRCUIT_COOLDOWN") {
            self.circuit.cooldown_secs = parse_env("MACVENDOR_CIRCUIT_COOLDOWN", &v)?;
        }
        if let Some(v) = lookup("MACVENDOR_NOT_FOUND_TTL_DAYS") {
            self.store.not_found_ttl_days = parse_env("MACVENDOR_NOT_FOUND_TTL_DAYS", &v)?;
        }
        if let Some(v) = lookup("PROVIDER_SIMILARITY_THRESHOLD") {
            self.provider.similarity_threshold = parse_env("PROVIDER_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("EMBEDDING_API_URL").filter(|v| !v.is_empty()) {
            self.provider.embedding_url = Some(v);
        }
        if let Some(v) = lookup("PROCESS_WITHOUT_LOCATION") {
            let flag: u8 = parse_env("PROCESS_WITHOUT_LOCATION", &v)?;
            self.capture.process_without_location = flag != 0;
        }
        Ok(())
    }

    /// Reject settings the enrichment pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let api = &self.vendor_api;
        if api.min_interval_secs < 0.0 || api.max_interval_secs < api.min_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "interval bounds must satisfy 0 <= min ({}) <= max ({})",
                api.min_interval_secs, api.max_interval_secs
            ))
            .into());
        }
        if self.enrichment.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".to_string()).into());
        }
        if self.enrichment.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be > 0".to_string()).into());
        }
        if self.circuit.failure_threshold == 0 {
            return Err(ConfigError::Invalid("failure_threshold must be > 0".to_string()).into());
        }
        if !(0.0..=1.0).contains(&self.provider.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "similarity_threshold must be within [0, 1]".to_string(),
            )
            .into());
        }
        if api.max_requests_per_second == Some(0) {
            return Err(
                ConfigError::Invalid("max_requests_per_second must be > 0".to_string()).into(),
            );
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}: cannot parse '{value}'")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.vendor_api.url, DEFAULT_API_URL);
        assert!(config.vendor_api.api_key.is_none());
        assert_eq!(config.vendor_api.min_interval_secs, 3.0);
        assert_eq!(config.enrichment.max_workers, 4);
        assert_eq!(config.circuit.failure_threshold, 10);
        assert_eq!(config.store.not_found_ttl_days, 180);
        assert_eq!(config.provider.similarity_threshold, 0.75);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env_of(&[
                ("API_KEY_MACVENDOR", "secret"),
                ("MACVENDOR_API_INTERVAL", "0.5"),
                ("MACVENDOR_API_TIMEOUT", "2.5"),
                ("NUM_WORKERS", "8"),
                ("MACVENDOR_CIRCUIT_COOLDOWN", "30"),
                ("PROCESS_WITHOUT_LOCATION", "0"),
            ]))
            .unwrap();

        assert_eq!(config.vendor_api.api_key.as_deref(), Some("secret"));
        assert_eq!(config.vendor_api.min_interval_secs, 0.5);
        assert_eq!(config.vendor_api.timeout_secs, 3);
        assert_eq!(config.enrichment.max_workers, 8);
        assert_eq!(config.circuit.cooldown_secs, 30);
        assert!(!config.capture.process_without_location);
    }

    #[test]
    fn test_empty_api_key_is_ignored() {
        let mut config = Config::default();
        config
            .apply_env(env_of(&[("API_KEY_MACVENDOR", "")]))
            .unwrap();
        assert!(config.vendor_api.api_key.is_none());
    }

    #[test]
    fn test_unparseable_env_value_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(env_of(&[("NUM_WORKERS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("NUM_WORKERS"));
    }

    #[test]
    fn test_validate_rejects_inverted_interval_bounds() {
        let mut config = Config::default();
        config.vendor_api.min_interval_secs = 10.0;
        config.vendor_api.max_interval_secs = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "enrichment:\n  batch_size: 10\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.enrichment.batch_size, 10);
        assert_eq!(config.enrichment.max_workers, 4);
        assert_eq!(config.vendor_api.url, DEFAULT_API_URL);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.provider.similarity_threshold = 0.8;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.provider.similarity_threshold, 0.8);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = Config::load_from(Path::new("/nonexistent/kismet-enrich.yaml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
