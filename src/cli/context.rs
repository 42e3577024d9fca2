//! Command execution context
//!
//! Loads the configuration once and builds the vendor store, API client,
//! enricher and provider matcher that commands share.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::cache::SqliteVendorStore;
use crate::cli::{GlobalOptions, OutputFormat};
use crate::client::{MacVendorsClient, VendorApi};
use crate::config::Config;
use crate::enrich::{EnrichSettings, VendorEnricher};
use crate::error::Result;
use crate::provider::{ProviderMatcher, ProviderRoster};

/// Shared state for one command invocation
pub struct CommandContext {
    /// Loaded, overridden and validated configuration
    pub config: Config,
    pub store: Arc<SqliteVendorStore>,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Load config, apply CLI overrides and open the vendor store.
    ///
    /// A store that cannot be opened is fatal here; with `--no-cache` an
    /// in-memory store is used instead.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let config = load_config(opts)?;

        let store = if opts.no_cache {
            debug!("Using an in-memory vendor store");
            SqliteVendorStore::open_in_memory()?
        } else {
            SqliteVendorStore::open_at(&store_dir(&config)?)?
        };

        Ok(Self {
            config,
            store: Arc::new(store),
            format: opts.format,
        })
    }

    /// Vendor API client configured from the loaded settings
    pub fn vendor_client(&self) -> Result<Arc<MacVendorsClient>> {
        let client = MacVendorsClient::new(&self.config.vendor_api, &self.config.circuit)?;
        Ok(Arc::new(client))
    }

    /// Batch enricher over `api` and this context's store.
    ///
    /// Callers keep `api` so pacing and breaker state survive across batches.
    pub fn enricher(&self, api: Arc<dyn VendorApi>) -> VendorEnricher {
        VendorEnricher::new(api, self.store.clone(), EnrichSettings::from_config(&self.config))
    }

    pub fn matcher(&self) -> Result<ProviderMatcher> {
        ProviderMatcher::from_config(&self.config.provider)
    }

    /// Roster from `explicit`, then the configured file, then the built-in list
    pub fn roster(&self, explicit: Option<&Path>) -> Result<ProviderRoster> {
        ProviderRoster::resolve(explicit, &self.config.provider)
    }
}

/// Load config and apply the `--api-host` override
pub fn load_config(opts: &GlobalOptions) -> Result<Config> {
    let mut config = Config::load_at(opts.config_ref())?;
    if let Some(host) = opts.api_host_ref() {
        config.vendor_api.url = host.to_string();
    }
    Ok(config)
}

/// Directory of the persistent store for `config`
pub fn store_dir(config: &Config) -> Result<PathBuf> {
    match &config.store.path {
        Some(dir) => Ok(dir.clone()),
        None => Ok(SqliteVendorStore::store_dir()?),
    }
}
