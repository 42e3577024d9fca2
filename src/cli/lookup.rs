//! Ad-hoc vendor lookup

use colored::Colorize;
use log::debug;
use serde::Serialize;

use crate::cache::key::canonical_mac;
use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::enrich::BatchStats;
use crate::error::Result;
use crate::models::VendorDisplay;
use crate::output::Formattable;
use crate::output::formatters::format_duration;
use crate::output::json::format_json;

#[derive(Serialize)]
struct LookupResult<'a> {
    results: &'a [VendorDisplay],
    stats: &'a BatchStats,
}

/// Resolve the vendor of every MAC in `macs`, in input order
pub async fn run(opts: &GlobalOptions, macs: &[String]) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let client = ctx.vendor_client()?;
    let enricher = ctx.enricher(client.clone());

    debug!("Looking up {} MAC addresses", macs.len());
    let report = enricher.enrich_batch_report(macs).await;

    let rows: Vec<VendorDisplay> = macs
        .iter()
        .map(|raw| {
            let key = canonical_mac(raw).unwrap_or_else(|| raw.trim().to_string());
            let vendor = report.vendors.get(&key).cloned().flatten();
            VendorDisplay::from((key, vendor))
        })
        .collect();

    match ctx.format {
        OutputFormat::Json => {
            let output = LookupResult {
                results: &rows,
                stats: &report.stats,
            };
            println!("{}", format_json(&output)?);
        }
        OutputFormat::Table => rows.print(OutputFormat::Table)?,
        OutputFormat::Pretty => {
            rows.print(OutputFormat::Pretty)?;
            let stats = &report.stats;
            let resolved = stats.cache_hits + stats.api_found;
            println!(
                "{} {} prefixes resolved, {} from the store, {} not registered, {} unresolved",
                "✓".green(),
                resolved,
                stats.cache_hits,
                stats.not_found_hits + stats.api_not_found,
                stats.unresolved + stats.timed_out
            );
            if stats.invalid > 0 {
                println!("{} {} invalid MAC addresses skipped", "⚠".yellow(), stats.invalid);
            }
            if let Some(wait) = client.breaker().remaining_cooldown() {
                println!(
                    "{} Vendor API circuit open after {} failures, retry in {}",
                    "✗".red(),
                    client.breaker().failures(),
                    format_duration(wait)
                );
            } else if client.rate_controller().current_secs() > client.rate_controller().min_secs() {
                println!(
                    "{} API slowed to one call every {:.1}s{}",
                    "○".dimmed(),
                    client.rate_controller().current_secs(),
                    if client.is_authenticated() { "" } else { " (anonymous endpoint)" }
                );
            }
        }
    }

    Ok(())
}
