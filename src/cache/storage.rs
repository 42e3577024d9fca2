//! SQLite-backed vendor store
//!
//! Three durable tables keyed by normalised MAC fragments:
//! - `mac_vendors`: resolved vendor names per 3-octet prefix
//! - `mac_not_found`: authoritative API misses, valid for a TTL
//! - `mac_providers`: provider learned for a BSSID (5 octets)
//!
//! All writes run in immediate transactions and are retried with jittered
//! exponential backoff while SQLite reports lock contention.

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

/// Attempts made while the database reports BUSY/LOCKED
const LOCK_RETRY_ATTEMPTS: u32 = 5;

/// First backoff step for lock retries
const LOCK_RETRY_BASE: Duration = Duration::from_millis(25);

/// How long SQLite itself waits on a lock before reporting BUSY
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(250);

type Result<T> = std::result::Result<T, StoreError>;

/// A resolved vendor row
#[derive(Debug, Clone, PartialEq)]
pub struct VendorEntry {
    pub key: String,
    /// `None` while a lookup is pending
    pub vendor_name: Option<String>,
    pub last_consulted: DateTime<Utc>,
}

/// An authoritative miss
#[derive(Debug, Clone, PartialEq)]
pub struct NotFoundEntry {
    pub key: String,
    pub last_consulted: DateTime<Utc>,
}

impl NotFoundEntry {
    /// Whether the miss still suppresses API calls at `now`
    pub fn is_valid(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.last_consulted);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age < ttl,
            Err(_) => true,
        }
    }
}

/// Storage collaborator used by the enrichment pipeline.
///
/// Implementations must tolerate concurrent writers targeting the same key:
/// duplicate inserts resolve to the existing row instead of failing.
pub trait VendorStore: Send + Sync {
    fn get_vendor(&self, key: &str) -> Result<Option<VendorEntry>>;

    fn get_not_found(&self, key: &str) -> Result<Option<NotFoundEntry>>;

    /// Record a vendor and return the authoritative name (first writer wins).
    ///
    /// Removes any not-found row for the same key.
    fn put_vendor(&self, key: &str, vendor_name: &str) -> Result<String>;

    /// Record a miss. Returns `false` when a vendor row already exists.
    fn put_not_found(&self, key: &str) -> Result<bool>;

    /// Drop a not-found row. Returns whether a row was removed.
    fn expire_not_found(&self, key: &str) -> Result<bool>;

    /// Refresh `last_consulted` of a vendor row after a cache hit
    fn touch_vendor(&self, key: &str) -> Result<()>;

    /// Provider remembered for a BSSID, falling back to its sub-prefix
    fn get_provider(&self, mac_id: &str, sub_prefix: &str) -> Result<Option<String>>;

    /// Remember a provider for a BSSID (existing rows are kept)
    fn put_provider(&self, mac_id: &str, sub_prefix: &str, provider: &str) -> Result<()>;
}

/// SQLite implementation of [`VendorStore`]
pub struct SqliteVendorStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    location: Option<PathBuf>,
}

impl SqliteVendorStore {
    /// Open or create the store at the default XDG cache location
    pub fn open() -> Result<Self> {
        let dir = Self::store_dir()?;
        Self::open_at(&dir)
    }

    /// Get the store directory path (~/.cache/kismet-enrich on Linux)
    pub fn store_dir() -> Result<PathBuf> {
        let cache_base = dirs::cache_dir().ok_or(StoreError::NoHome)?;
        Ok(cache_base.join("kismet-enrich"))
    }

    /// Open the store inside a specific directory
    pub fn open_at(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| StoreError::Io(format!("Failed to create store dir: {}", e)))?;

        let db_path = dir.join("vendors.db");
        let conn = Connection::open(&db_path)?;

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Vendor store schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            std::fs::remove_file(&db_path)
                .map_err(|e| StoreError::Io(format!("Failed to remove vendor store: {}", e)))?;
            return Self::open_at(dir);
        }

        // WAL keeps readers from blocking on a writer
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get::<_, String>(0))?;

        let store = Self::init(conn, Some(db_path))?;
        Ok(store)
    }

    /// Open a throw-away store that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, location: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS mac_vendors (
                mac_prefix TEXT PRIMARY KEY NOT NULL,
                vendor_name TEXT,
                last_consulted INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS mac_not_found (
                mac_prefix TEXT PRIMARY KEY NOT NULL,
                last_consulted INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS mac_providers (
                mac_id TEXT PRIMARY KEY NOT NULL,
                mac_sub_prefix TEXT NOT NULL,
                provider_name TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_mac_sub_prefix ON mac_providers(mac_sub_prefix);
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
            location,
        })
    }

    /// Replace the time source (tests use a manual clock)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Change how long SQLite waits on a lock before reporting BUSY
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        let conn = self.lock()?;
        conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Database file, `None` for in-memory stores
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Record a miss with an explicit timestamp.
    ///
    /// `put_not_found` delegates here with the current time; tests backdate.
    pub fn put_not_found_at(&self, key: &str, at: DateTime<Utc>) -> Result<bool> {
        let ts = at.timestamp();
        self.with_retry(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let has_vendor: bool = tx
                .query_row(
                    "SELECT 1 FROM mac_vendors WHERE mac_prefix = ?1 AND vendor_name IS NOT NULL",
                    [key],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);

            if has_vendor {
                tx.commit()?;
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO mac_not_found (mac_prefix, last_consulted) VALUES (?1, ?2)
                 ON CONFLICT(mac_prefix) DO UPDATE SET last_consulted = excluded.last_consulted",
                params![key, ts],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Delete every not-found row older than `ttl`
    pub fn purge_expired_not_found(&self, ttl: Duration) -> Result<usize> {
        let cutoff = self.cutoff(ttl);
        self.with_retry(|conn| {
            conn.execute(
                "DELETE FROM mac_not_found WHERE last_consulted <= ?1",
                [cutoff],
            )
        })
    }

    /// Clear all tables
    pub fn clear_all(&self) -> Result<ClearStats> {
        self.with_retry(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let vendors = tx.execute("DELETE FROM mac_vendors", [])?;
            let not_found = tx.execute("DELETE FROM mac_not_found", [])?;
            let providers = tx.execute("DELETE FROM mac_providers", [])?;
            tx.commit()?;
            Ok(ClearStats {
                entries_removed: vendors + not_found + providers,
            })
        })
    }

    /// Get store statistics, classifying not-found rows against `ttl`
    pub fn stats(&self, ttl: Duration) -> Result<StoreStats> {
        let cutoff = self.cutoff(ttl);
        let conn = self.lock()?;

        let vendors: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mac_vendors WHERE vendor_name IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let not_found_total: i64 =
            conn.query_row("SELECT COUNT(*) FROM mac_not_found", [], |r| r.get(0))?;
        let not_found_expired: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mac_not_found WHERE last_consulted <= ?1",
            [cutoff],
            |r| r.get(0),
        )?;
        let providers: i64 =
            conn.query_row("SELECT COUNT(*) FROM mac_providers", [], |r| r.get(0))?;
        let newest: Option<i64> = conn
            .query_row("SELECT MAX(last_consulted) FROM mac_vendors", [], |r| {
                r.get(0)
            })
            .optional()?
            .flatten();

        Ok(StoreStats {
            vendors: vendors as usize,
            not_found_valid: (not_found_total - not_found_expired) as usize,
            not_found_expired: not_found_expired as usize,
            providers: providers as usize,
            newest_vendor: newest,
        })
    }

    fn cutoff(&self, ttl: Duration) -> i64 {
        self.clock.utc_now().timestamp() - ttl.as_secs() as i64
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Io("vendor store mutex poisoned".to_string()))
    }

    /// Run `op`, retrying with jittered exponential backoff on lock contention
    fn with_retry<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(&mut Connection) -> rusqlite::Result<T>,
    {
        for attempt in 0..LOCK_RETRY_ATTEMPTS {
            let outcome = {
                let mut conn = self.lock()?;
                op(&mut conn)
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if is_lock_contention(&err) => {
                    let ceiling = LOCK_RETRY_BASE * 2u32.pow(attempt);
                    let delay = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
                    log::debug!(
                        "Vendor store locked (attempt {}/{}), retrying in {:?}",
                        attempt + 1,
                        LOCK_RETRY_ATTEMPTS,
                        delay
                    );
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::Busy {
            attempts: LOCK_RETRY_ATTEMPTS,
        })
    }
}

impl VendorStore for SqliteVendorStore {
    fn get_vendor(&self, key: &str) -> Result<Option<VendorEntry>> {
        let conn = self.lock()?;
        let row: Option<(Option<String>, i64)> = conn
            .query_row(
                "SELECT vendor_name, last_consulted FROM mac_vendors WHERE mac_prefix = ?1",
                [key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(vendor_name, ts)| VendorEntry {
            key: key.to_string(),
            vendor_name,
            last_consulted: from_timestamp(ts),
        }))
    }

    fn get_not_found(&self, key: &str) -> Result<Option<NotFoundEntry>> {
        let conn = self.lock()?;
        let ts: Option<i64> = conn
            .query_row(
                "SELECT last_consulted FROM mac_not_found WHERE mac_prefix = ?1",
                [key],
                |r| r.get(0),
            )
            .optional()?;

        Ok(ts.map(|ts| NotFoundEntry {
            key: key.to_string(),
            last_consulted: from_timestamp(ts),
        }))
    }

    fn put_vendor(&self, key: &str, vendor_name: &str) -> Result<String> {
        let ts = self.clock.utc_now().timestamp();
        self.with_retry(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO mac_vendors (mac_prefix, vendor_name, last_consulted)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(mac_prefix) DO UPDATE
                 SET vendor_name = excluded.vendor_name, last_consulted = excluded.last_consulted
                 WHERE mac_vendors.vendor_name IS NULL",
                params![key, vendor_name, ts],
            )?;
            tx.execute("DELETE FROM mac_not_found WHERE mac_prefix = ?1", [key])?;
            let stored: Option<String> = tx.query_row(
                "SELECT vendor_name FROM mac_vendors WHERE mac_prefix = ?1",
                [key],
                |r| r.get(0),
            )?;
            tx.commit()?;
            Ok(stored.unwrap_or_else(|| vendor_name.to_string()))
        })
    }

    fn put_not_found(&self, key: &str) -> Result<bool> {
        self.put_not_found_at(key, self.clock.utc_now())
    }

    fn expire_not_found(&self, key: &str) -> Result<bool> {
        let deleted = self.with_retry(|conn| {
            conn.execute("DELETE FROM mac_not_found WHERE mac_prefix = ?1", [key])
        })?;
        Ok(deleted > 0)
    }

    fn touch_vendor(&self, key: &str) -> Result<()> {
        let ts = self.clock.utc_now().timestamp();
        self.with_retry(|conn| {
            conn.execute(
                "UPDATE mac_vendors SET last_consulted = ?2 WHERE mac_prefix = ?1",
                params![key, ts],
            )
        })?;
        Ok(())
    }

    fn get_provider(&self, mac_id: &str, sub_prefix: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let exact: Option<String> = conn
            .query_row(
                "SELECT provider_name FROM mac_providers WHERE mac_id = ?1",
                [mac_id],
                |r| r.get(0),
            )
            .optional()?;
        if exact.is_some() {
            return Ok(exact);
        }

        let by_prefix = conn
            .query_row(
                "SELECT provider_name FROM mac_providers WHERE mac_sub_prefix = ?1
                 ORDER BY mac_id LIMIT 1",
                [sub_prefix],
                |r| r.get(0),
            )
            .optional()?;
        Ok(by_prefix)
    }

    fn put_provider(&self, mac_id: &str, sub_prefix: &str, provider: &str) -> Result<()> {
        self.with_retry(|conn| {
            conn.execute(
                "INSERT INTO mac_providers (mac_id, mac_sub_prefix, provider_name)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(mac_id) DO NOTHING",
                params![mac_id, sub_prefix, provider],
            )
        })?;
        Ok(())
    }
}

fn from_timestamp(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

fn is_lock_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Statistics about a clear operation
#[derive(Debug)]
pub struct ClearStats {
    pub entries_removed: usize,
}

/// Statistics about store contents
#[derive(Debug)]
pub struct StoreStats {
    pub vendors: usize,
    pub not_found_valid: usize,
    pub not_found_expired: usize,
    pub providers: usize,
    pub newest_vendor: Option<i64>,
}
