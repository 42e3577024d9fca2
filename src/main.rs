//! kismet-enrich - vendor and provider enrichment for Kismet Wi-Fi captures

use clap::Parser;
use log::LevelFilter;

mod cache;
mod cli;
mod client;
mod clock;
mod config;
mod enrich;
mod error;
mod kismet;
mod models;
mod output;
mod provider;

use cli::{CacheCommands, Cli, Commands, GlobalOptions, ProviderCommands};
use error::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

/// `RUST_LOG` decides, defaulting to warnings; `--debug` forces debug for this crate
fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if debug {
        builder.filter_module(module_path!(), LevelFilter::Debug);
    }
    builder.init();
}

async fn run(cli: Cli) -> Result<()> {
    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Process(args) => cli::process::run(&opts, &args).await,
        Commands::Lookup { macs } => cli::lookup::run(&opts, &macs).await,
        Commands::Provider(cmd) => match cmd {
            ProviderCommands::Match { ssids, providers } => {
                cli::provider::match_ssids(&opts, &ssids, providers.as_deref()).await
            }
            ProviderCommands::List { providers } => cli::provider::list(&opts, providers.as_deref()),
        },
        Commands::Cache(cmd) => match cmd {
            CacheCommands::Status => cli::cache::status(&opts),
            CacheCommands::Clear => cli::cache::clear(&opts),
            CacheCommands::Path => cli::cache::path(&opts),
            CacheCommands::PurgeExpired => cli::cache::purge_expired(&opts),
        },
        Commands::Status => cli::status::run(&opts),
        Commands::Version => {
            println!("kismet-enrich version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Completion { shell } => {
            cli::completions::run(shell);
            Ok(())
        }
    }
}
