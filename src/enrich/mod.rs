//! Batch vendor enrichment
//!
//! Resolves the vendor of many MAC addresses at once. Each unique OUI
//! prefix is looked up once per call: store first, then the vendor API
//! with bounded retries. Sub-batches run on a bounded worker pool under a
//! wall-clock timeout, so a hung lookup only costs its own MACs.
//!
//! Store calls run on the blocking thread pool. SQLite lock waits then
//! never stall the runtime thread that drives the pool and its timeout.

pub mod retry;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use serde::Serialize;

use crate::cache::key::{canonical_mac, vendor_prefix};
use crate::cache::storage::VendorEntry;
use crate::cache::VendorStore;
use crate::error::StoreError;
use crate::client::{LookupOutcome, VendorApi};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use retry::{RetryQueue, backoff_delay};

/// Base delay between bounded retries
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound of a single retry delay
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Tuning knobs for [`VendorEnricher`]
#[derive(Debug, Clone)]
pub struct EnrichSettings {
    pub batch_size: usize,
    pub max_workers: usize,
    pub batch_timeout: Duration,
    pub max_retries: u32,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    pub not_found_ttl: Duration,
}

impl EnrichSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.enrichment.batch_size.max(1),
            max_workers: config.enrichment.max_workers.max(1),
            batch_timeout: Duration::from_secs(config.enrichment.batch_timeout_secs),
            max_retries: config.enrichment.max_retries,
            retry_base: RETRY_BASE_DELAY,
            retry_cap: RETRY_MAX_DELAY,
            not_found_ttl: config.store.not_found_ttl(),
        }
    }
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// How a prefix was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Vendor row in the store
    Cached(String),
    /// Valid not-found row in the store
    CachedNotFound,
    /// Vendor returned by the API
    Found(String),
    /// The API has no vendor for this prefix
    NotFound,
    /// Throttled, failing or skipped by the breaker
    Unresolved,
}

impl Resolution {
    pub fn vendor(&self) -> Option<&str> {
        match self {
            Self::Cached(name) | Self::Found(name) => Some(name),
            _ => None,
        }
    }
}

/// Counters for one enrichment call
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchStats {
    pub requested: usize,
    pub invalid: usize,
    pub unique_prefixes: usize,
    pub cache_hits: usize,
    pub not_found_hits: usize,
    pub api_found: usize,
    pub api_not_found: usize,
    pub unresolved: usize,
    pub timed_out: usize,
    pub recovered_on_retry: usize,
    pub retry_dropped: usize,
}

impl BatchStats {
    fn record(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Cached(_) => self.cache_hits += 1,
            Resolution::CachedNotFound => self.not_found_hits += 1,
            Resolution::Found(_) => self.api_found += 1,
            Resolution::NotFound => self.api_not_found += 1,
            Resolution::Unresolved => self.unresolved += 1,
        }
    }
}

/// Result map plus counters
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Canonical MAC (or the raw input when it is not a full address) to vendor
    pub vendors: HashMap<String, Option<String>>,
    pub stats: BatchStats,
}

/// Outcome of one pool run
struct PoolRun {
    resolved: HashMap<String, Resolution>,
    timed_out: Vec<String>,
}

/// Batch enrichment orchestrator
pub struct VendorEnricher {
    api: Arc<dyn VendorApi>,
    store: Arc<dyn VendorStore>,
    settings: EnrichSettings,
    clock: Arc<dyn Clock>,
    progress: Option<ProgressBar>,
}

impl VendorEnricher {
    pub fn new(api: Arc<dyn VendorApi>, store: Arc<dyn VendorStore>, settings: EnrichSettings) -> Self {
        Self {
            api,
            store,
            settings,
            clock: Arc::new(SystemClock),
            progress: None,
        }
    }

    /// Time source for not-found TTL checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Advance `bar` by one for every prefix resolved
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn settings(&self) -> &EnrichSettings {
        &self.settings
    }

    /// Resolve vendors for `macs`.
    ///
    /// Never fails: anything that cannot be resolved maps to `None`.
    pub async fn enrich_batch(&self, macs: &[String]) -> HashMap<String, Option<String>> {
        self.enrich_batch_report(macs).await.vendors
    }

    /// Like [`enrich_batch`](Self::enrich_batch), with counters
    pub async fn enrich_batch_report(&self, macs: &[String]) -> BatchReport {
        let mut report = BatchReport::default();
        report.stats.requested = macs.len();
        if macs.is_empty() {
            return report;
        }

        // (result key, vendor prefix) for every valid input
        let mut entries: Vec<(String, String)> = Vec::with_capacity(macs.len());
        for (idx, raw) in macs.iter().enumerate() {
            let key = canonical_mac(raw).unwrap_or_else(|| raw.trim().to_string());
            match vendor_prefix(raw) {
                Some(prefix) => entries.push((key, prefix)),
                None => {
                    warn!("#{}: '{}' is not a MAC address, skipping", idx + 1, raw);
                    report.stats.invalid += 1;
                    report.vendors.insert(key, None);
                }
            }
        }

        let unique: HashSet<&str> = entries.iter().map(|(_, p)| p.as_str()).collect();
        report.stats.unique_prefixes = unique.len();
        if let Some(bar) = &self.progress {
            bar.set_length(unique.len() as u64);
        }

        let mut by_prefix: HashMap<String, Resolution> = HashMap::new();
        let mut queue = RetryQueue::default();

        for (n, chunk) in entries.chunks(self.settings.batch_size).enumerate() {
            let mut todo: Vec<String> = Vec::new();
            for (_, prefix) in chunk {
                if !by_prefix.contains_key(prefix) && !todo.contains(prefix) {
                    todo.push(prefix.clone());
                }
            }
            if todo.is_empty() {
                continue;
            }

            debug!(
                "Sub-batch {}: {} MACs, {} new prefixes",
                n + 1,
                chunk.len(),
                todo.len()
            );
            let run = self.run_pool(todo).await;

            for (prefix, resolution) in run.resolved {
                if resolution == Resolution::Unresolved {
                    queue.push(prefix.clone());
                }
                by_prefix.insert(prefix, resolution);
            }
            for prefix in run.timed_out {
                warn!("Vendor lookup for {} did not finish in time", prefix);
                report.stats.timed_out += 1;
                by_prefix.insert(prefix, Resolution::Unresolved);
            }
        }

        report.stats.retry_dropped = queue.dropped();
        if !queue.is_empty() {
            if self.api.circuit_open() {
                info!(
                    "Circuit open, {} prefixes left unresolved",
                    queue.len()
                );
            } else {
                let deferred = queue.drain();
                debug!("Retrying {} unresolved prefixes", deferred.len());
                if let Some(bar) = &self.progress {
                    bar.inc_length(deferred.len() as u64);
                }
                let run = self.run_pool(deferred).await;
                for (prefix, resolution) in run.resolved {
                    if resolution != Resolution::Unresolved {
                        report.stats.recovered_on_retry += 1;
                        by_prefix.insert(prefix, resolution);
                    }
                }
            }
        }

        for resolution in by_prefix.values() {
            report.stats.record(resolution);
        }
        report.stats.unresolved -= report.stats.timed_out.min(report.stats.unresolved);

        for (key, prefix) in entries {
            let vendor = by_prefix
                .get(&prefix)
                .and_then(|r| r.vendor())
                .map(str::to_string);
            report.vendors.insert(key, vendor);
        }

        info!(
            "Enriched {} MACs ({} prefixes): {} cached, {} from API, {} unresolved",
            report.stats.requested,
            report.stats.unique_prefixes,
            report.stats.cache_hits + report.stats.not_found_hits,
            report.stats.api_found + report.stats.api_not_found,
            report.stats.unresolved + report.stats.timed_out
        );
        report
    }

    /// Resolve one prefix: store, then the API with bounded retries
    pub async fn resolve_prefix(&self, prefix: &str) -> Resolution {
        if let Some(hit) = self.cached(prefix).await {
            return hit;
        }

        let max_retries = self.settings.max_retries;
        for attempt in 0..=max_retries {
            if self.api.circuit_open() {
                debug!("Circuit open, not looking up {}", prefix);
                return Resolution::Unresolved;
            }

            match self.api.lookup(prefix).await {
                LookupOutcome::Found(name) => {
                    return Resolution::Found(self.remember_vendor(prefix, name).await);
                }
                LookupOutcome::NotFound => {
                    let key = prefix.to_string();
                    if let Err(e) = self.on_store(move |s| s.put_not_found(&key)).await {
                        warn!("Could not record miss for {}: {}", prefix, e);
                    }
                    return Resolution::NotFound;
                }
                outcome => {
                    if attempt < max_retries {
                        let delay = backoff_delay(attempt, self.settings.retry_base, self.settings.retry_cap);
                        debug!(
                            "Lookup for {} gave {:?}, retry {}/{} in {:?}",
                            prefix,
                            outcome,
                            attempt + 1,
                            max_retries,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Resolution::Unresolved
    }

    /// Run a store call on the blocking pool
    async fn on_store<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn VendorStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| StoreError::Io(format!("vendor store task failed: {}", e)))?
    }

    async fn cached(&self, prefix: &str) -> Option<Resolution> {
        let key = prefix.to_string();
        match self.on_store(move |s| s.get_vendor(&key)).await {
            Ok(Some(VendorEntry {
                vendor_name: Some(name),
                ..
            })) => {
                debug!("Store hit for {}: {}", prefix, name);
                let key = prefix.to_string();
                if let Err(e) = self.on_store(move |s| s.touch_vendor(&key)).await {
                    debug!("Could not refresh {}: {}", prefix, e);
                }
                return Some(Resolution::Cached(name));
            }
            Ok(_) => {}
            Err(e) => warn!("Vendor store read failed for {}: {}", prefix, e),
        }

        let key = prefix.to_string();
        match self.on_store(move |s| s.get_not_found(&key)).await {
            Ok(Some(entry)) if entry.is_valid(self.clock.utc_now(), self.settings.not_found_ttl) => {
                debug!("{} is a known miss", prefix);
                Some(Resolution::CachedNotFound)
            }
            Ok(Some(_)) => {
                debug!("Known miss for {} expired", prefix);
                let key = prefix.to_string();
                if let Err(e) = self.on_store(move |s| s.expire_not_found(&key)).await {
                    warn!("Could not expire miss for {}: {}", prefix, e);
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Vendor store read failed for {}: {}", prefix, e);
                None
            }
        }
    }

    async fn remember_vendor(&self, prefix: &str, name: String) -> String {
        let (key, value) = (prefix.to_string(), name.clone());
        match self.on_store(move |s| s.put_vendor(&key, &value)).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not store vendor for {}: {}", prefix, e);
                name
            }
        }
    }

    async fn resolve_owned(&self, prefix: String) -> (String, Resolution) {
        let resolution = self.resolve_prefix(&prefix).await;
        if let Some(bar) = &self.progress {
            bar.inc(1);
        }
        (prefix, resolution)
    }

    /// Resolve `prefixes` with at most `max_workers` in flight, within the batch timeout
    async fn run_pool(&self, prefixes: Vec<String>) -> PoolRun {
        let mut resolved: HashMap<String, Resolution> = HashMap::new();
        let all = prefixes.clone();

        let drain = {
            let resolved = &mut resolved;
            async move {
                let mut pending = prefixes.into_iter();
                let mut running = FuturesUnordered::new();
                for prefix in pending.by_ref().take(self.settings.max_workers) {
                    running.push(self.resolve_owned(prefix));
                }
                while let Some((prefix, resolution)) = running.next().await {
                    resolved.insert(prefix, resolution);
                    if let Some(next) = pending.next() {
                        running.push(self.resolve_owned(next));
                    }
                }
            }
        };

        if tokio::time::timeout(self.settings.batch_timeout, drain)
            .await
            .is_err()
        {
            warn!(
                "Sub-batch hit its {:?} timeout, cancelling unfinished lookups",
                self.settings.batch_timeout
            );
        }

        let timed_out = all
            .into_iter()
            .filter(|p| !resolved.contains_key(p))
            .collect();
        PoolRun { resolved, timed_out }
    }
}
