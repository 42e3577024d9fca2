//! Vendor store management commands

use crate::cache::SqliteVendorStore;
use crate::cli::context::{load_config, store_dir};
use crate::cli::{GlobalOptions, OutputFormat};
use crate::error::Result;
use crate::output::formatters::format_datetime;

fn open_store(opts: &GlobalOptions) -> Result<(SqliteVendorStore, crate::config::Config)> {
    let config = load_config(opts)?;
    let store = SqliteVendorStore::open_at(&store_dir(&config)?)?;
    Ok((store, config))
}

/// Show store statistics
pub fn status(opts: &GlobalOptions) -> Result<()> {
    let (store, config) = open_store(opts)?;
    let ttl = config.store.not_found_ttl();
    let stats = store.stats(ttl)?;
    let location = store
        .location()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "memory".to_string());
    let newest = stats
        .newest_vendor
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0));

    match opts.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "vendors": stats.vendors,
                "not_found_valid": stats.not_found_valid,
                "not_found_expired": stats.not_found_expired,
                "providers": stats.providers,
                "newest_vendor_timestamp": stats.newest_vendor,
                "not_found_ttl_days": config.store.not_found_ttl_days,
                "path": location,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            println!("Vendor Store Status");
            println!("────────────────────────────────────────");
            println!("Location:        {}", location);
            println!("Vendors:         {}", stats.vendors);
            println!(
                "Not found:       {} ({} past the {}-day TTL)",
                stats.not_found_valid + stats.not_found_expired,
                stats.not_found_expired,
                config.store.not_found_ttl_days
            );
            println!("Providers:       {}", stats.providers);
            println!("Last consulted:  {}", format_datetime(newest));
        }
    }

    Ok(())
}

/// Remove every row from the store
pub fn clear(opts: &GlobalOptions) -> Result<()> {
    let (store, _) = open_store(opts)?;
    let stats = store.clear_all()?;

    match opts.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "entries_removed": stats.entries_removed,
                "success": true,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            if stats.entries_removed > 0 {
                println!("Cleared {} store entries", stats.entries_removed);
            } else {
                println!("Store was already empty");
            }
        }
    }

    Ok(())
}

/// Delete not-found rows older than the configured TTL
pub fn purge_expired(opts: &GlobalOptions) -> Result<()> {
    let (store, config) = open_store(opts)?;
    let removed = store.purge_expired_not_found(config.store.not_found_ttl())?;

    match opts.format {
        OutputFormat::Json => {
            let json = serde_json::json!({ "entries_removed": removed });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => println!("Purged {} expired not-found entries", removed),
    }

    Ok(())
}

/// Print the store directory
pub fn path(opts: &GlobalOptions) -> Result<()> {
    let config = load_config(opts)?;
    println!("{}", store_dir(&config)?.display());
    Ok(())
}
