//! Persistent vendor store
//!
//! SQLite-backed memory of vendor lookups so repeated captures never hit the
//! API twice for the same OUI. Misses are kept for a TTL
//! (see [`crate::config::StoreConfig::not_found_ttl`]).

pub mod key;
pub mod storage;

pub use storage::{SqliteVendorStore, VendorStore};
