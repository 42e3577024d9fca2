//! CLI command definitions and handlers

use std::path::PathBuf;

use clap::{Parser, Subcommand};
pub use clap_complete::Shell;

pub mod args;
pub mod cache;
pub mod completions;
pub mod context;
pub mod lookup;
pub mod process;
pub mod provider;
pub mod status;

pub use args::{GlobalOptions, OutputFormat};
pub use context::CommandContext;

/// kismet-enrich - vendor and provider enrichment for Kismet captures
#[derive(Parser, Debug)]
#[command(name = "kismet-enrich")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "KISMET_ENRICH_FORMAT",
        default_value = "pretty",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "KISMET_ENRICH_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "KISMET_ENRICH_DEBUG", hide_env = true)]
    pub debug: bool,

    /// Skip the persistent vendor store (results are not remembered)
    #[arg(long, global = true, env = "KISMET_ENRICH_NO_CACHE", hide_env = true)]
    pub no_cache: bool,

    /// Override the vendor API base URL
    #[arg(long, global = true, hide = true)]
    pub api_host: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enrich Kismet capture files and export them as CSV
    #[command(after_help = "EXAMPLES:\n  \
        kismet-enrich process walk.kismet --out ./export\n  \
        kismet-enrich process *.kismet --ssid guest --encryption WPA2")]
    Process(ProcessArgs),

    /// Look up the vendor of MAC addresses
    Lookup {
        /// MAC addresses or OUI prefixes (e.g. 00:1A:2B:3C:4D:5E, 001A2B)
        #[arg(required = true)]
        macs: Vec<String>,
    },

    /// Match SSIDs to network providers
    #[command(subcommand)]
    Provider(ProviderCommands),

    /// Manage the persistent vendor store
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Show the effective configuration
    Status,

    /// Display version information
    Version,

    /// Generate shell completions
    #[command(after_help = "\
  bash:   kismet-enrich completion bash > /etc/bash_completion.d/kismet-enrich
  zsh:    kismet-enrich completion zsh > \"${fpath[1]}/_kismet-enrich\"
  fish:   kismet-enrich completion fish > ~/.config/fish/completions/kismet-enrich.fish")]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments of `process`
#[derive(clap::Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Kismet capture files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Directory the CSV and diagnostic logs are written to
    #[arg(long, short = 'o', default_value = ".")]
    pub out: PathBuf,

    /// Provider roster (YAML list of {name, aliases})
    #[arg(long)]
    pub providers: Option<PathBuf>,

    /// Keep only SSIDs containing this text
    #[arg(long)]
    pub ssid: Option<String>,

    /// Keep only encryption modes containing this text
    #[arg(long)]
    pub encryption: Option<String>,
}

/// Provider matching subcommands
#[derive(Subcommand, Debug)]
pub enum ProviderCommands {
    /// Match SSIDs against the provider roster
    Match {
        #[arg(required = true)]
        ssids: Vec<String>,

        /// Provider roster (YAML list of {name, aliases})
        #[arg(long)]
        providers: Option<PathBuf>,
    },

    /// Show the provider roster in use
    List {
        /// Provider roster (YAML list of {name, aliases})
        #[arg(long)]
        providers: Option<PathBuf>,
    },
}

/// Vendor store subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show store statistics
    Status,

    /// Remove every vendor, not-found and provider row
    Clear,

    /// Print the store location
    Path,

    /// Delete not-found rows older than the TTL
    PurgeExpired,
}
