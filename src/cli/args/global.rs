//! Global CLI options shared across all commands

use crate::cli::{Cli, OutputFormat};

/// Global flags, captured once after parsing.
///
/// Precedence for settings is: CLI flag > environment variable > config
/// file > default. This struct holds the CLI/env layer; the rest is resolved
/// in `CommandContext`.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Output format (pretty, table, json)
    pub format: OutputFormat,

    /// Custom config file path (defaults to ~/.kismet-enrich/config.yaml)
    pub config: Option<String>,

    /// Use a throw-away in-memory store instead of the persistent one
    pub no_cache: bool,

    /// Vendor API base URL override
    pub api_host: Option<String>,
}

impl GlobalOptions {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            format: cli.format,
            config: cli.config.clone(),
            no_cache: cli.no_cache,
            api_host: cli.api_host.clone(),
        }
    }

    pub fn config_ref(&self) -> Option<&str> {
        self.config.as_deref()
    }

    pub fn api_host_ref(&self) -> Option<&str> {
        self.api_host.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_cli_copies_globals() {
        let cli = Cli::try_parse_from([
            "kismet-enrich",
            "--format",
            "json",
            "--no-cache",
            "--api-host",
            "http://localhost:9000",
            "status",
        ])
        .unwrap();

        let opts = GlobalOptions::from_cli(&cli);
        assert_eq!(opts.format, OutputFormat::Json);
        assert!(opts.no_cache);
        assert_eq!(opts.api_host_ref(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["kismet-enrich", "version"]).unwrap();
        let opts = GlobalOptions::from_cli(&cli);
        assert_eq!(opts.format, OutputFormat::Pretty);
        assert_eq!(opts.config_ref(), None);
        assert!(!opts.no_cache);
    }
}
