//! Provider roster and SSID matching commands

use std::path::Path;

use colored::Colorize;

use crate::cli::context::load_config;
use crate::cli::{GlobalOptions, OutputFormat};
use crate::error::Result;
use crate::models::{ProviderDisplay, ProviderMatchDisplay};
use crate::output::Formattable;
use crate::provider::{ProviderMatcher, ProviderRoster};

/// Match each SSID against the roster
pub async fn match_ssids(
    opts: &GlobalOptions,
    ssids: &[String],
    roster_file: Option<&Path>,
) -> Result<()> {
    let config = load_config(opts)?;
    let roster = ProviderRoster::resolve(roster_file, &config.provider)?;
    let matcher = ProviderMatcher::from_config(&config.provider)?;

    let mut rows = Vec::with_capacity(ssids.len());
    for ssid in ssids {
        let found = matcher.match_provider(ssid, &roster).await;
        rows.push(ProviderMatchDisplay::from((ssid.as_str(), found)));
    }

    rows.print(opts.format)?;

    if opts.format == OutputFormat::Pretty {
        println!(
            "{}",
            format!(
                "Embedding backend: {} (threshold {:.2})",
                matcher.embedder_name(),
                matcher.threshold()
            )
            .dimmed()
        );
    }
    Ok(())
}

/// Print the roster in use
pub fn list(opts: &GlobalOptions, roster_file: Option<&Path>) -> Result<()> {
    let config = load_config(opts)?;
    let roster = ProviderRoster::resolve(roster_file, &config.provider)?;

    let rows: Vec<ProviderDisplay> = roster.providers().iter().map(ProviderDisplay::from).collect();
    rows.print(opts.format)?;

    if opts.format == OutputFormat::Pretty {
        let source = match roster_file.or(config.provider.roster_path.as_deref()) {
            Some(path) => path.display().to_string(),
            None => "built-in".to_string(),
        };
        println!("{}", format!("Roster: {}", source).dimmed());
    }
    Ok(())
}
