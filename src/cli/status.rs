//! Status command implementation

use colored::Colorize;

use crate::cli::context::{load_config, store_dir};
use crate::cli::{GlobalOptions, OutputFormat};
use crate::config::{Config, DEFAULT_API_URL};
use crate::error::Result;
use crate::output::formatters::format_duration;

/// Display the effective configuration
pub fn run(opts: &GlobalOptions) -> Result<()> {
    let config = load_config(opts)?;
    let config_path = match opts.config_ref() {
        Some(p) => std::path::PathBuf::from(p),
        None => Config::default_path()?,
    };
    let store = store_dir(&config)?;

    if opts.format == OutputFormat::Json {
        let mut redacted = config.clone();
        redacted.vendor_api.api_key = redacted.vendor_api.api_key.map(|_| "***".to_string());
        let json = serde_json::json!({
            "config_file": config_path.display().to_string(),
            "config_file_exists": config_path.exists(),
            "store_dir": store.display().to_string(),
            "config": redacted,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("{}\n", "kismet-enrich Configuration Status".bold());

    if config_path.exists() {
        println!("Config file: {}", config_path.display().to_string().cyan());
    } else {
        println!(
            "Config file: {} {}",
            config_path.display().to_string().cyan(),
            "(not found, using defaults)".dimmed()
        );
    }
    println!();

    let api = &config.vendor_api;
    if api.url == DEFAULT_API_URL {
        println!("{} Vendor API: {}", "✓".green(), api.url);
    } else {
        println!("{} Custom vendor API: {}", "○".dimmed(), api.url.cyan());
    }
    if api.api_key.is_some() {
        println!("{} API key configured (authenticated endpoint)", "✓".green());
    } else {
        println!("{} No API key (anonymous endpoint)", "○".dimmed());
    }
    println!(
        "{} Pacing: {:.1}s-{:.1}s between calls, {} workers, batches of {}",
        "○".dimmed(),
        api.min_interval_secs,
        api.max_interval_secs,
        config.enrichment.max_workers,
        config.enrichment.batch_size
    );
    if let Some(rps) = api.max_requests_per_second {
        println!("{} Hard cap: {} requests/s", "○".dimmed(), rps);
    }
    println!(
        "{} Circuit breaker: opens after {} failures, cooldown {}",
        "○".dimmed(),
        config.circuit.failure_threshold,
        format_duration(std::time::Duration::from_secs(config.circuit.cooldown_secs))
    );

    println!();
    println!("Vendor store: {}", store.display().to_string().cyan());
    println!(
        "{} Not-found entries expire after {} days",
        "○".dimmed(),
        config.store.not_found_ttl_days
    );

    println!();
    match &config.provider.embedding_url {
        Some(url) => println!("{} Embedding server: {}", "✓".green(), url.cyan()),
        None => println!("{} Local hashing embedder", "○".dimmed()),
    }
    println!(
        "{} Similarity threshold: {:.2}",
        "○".dimmed(),
        config.provider.similarity_threshold
    );
    match &config.provider.roster_path {
        Some(path) => println!("{} Provider roster: {}", "○".dimmed(), path.display()),
        None => println!("{} Built-in provider roster", "○".dimmed()),
    }
    println!();

    Ok(())
}
