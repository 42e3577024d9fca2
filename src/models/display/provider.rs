//! Provider roster and match display models

use serde::Serialize;
use tabled::Tabled;

use super::common::{or_missing, truncate_string};
use crate::provider::{Provider, ProviderMatch};

/// Roster entry
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct ProviderDisplay {
    #[tabled(rename = "PROVIDER")]
    pub name: String,

    #[tabled(rename = "ALIASES")]
    pub aliases: String,
}

impl From<&Provider> for ProviderDisplay {
    fn from(provider: &Provider) -> Self {
        Self {
            name: provider.name.clone(),
            aliases: provider.aliases.join(", "),
        }
    }
}

/// Outcome of matching one SSID
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct ProviderMatchDisplay {
    #[tabled(rename = "SSID")]
    pub ssid: String,

    #[tabled(rename = "PROVIDER")]
    pub provider: String,

    /// Cosine similarity, or 1.00 for alias hits
    #[tabled(rename = "SCORE")]
    pub score: String,

    #[tabled(rename = "METHOD")]
    pub method: String,
}

impl From<(&str, ProviderMatch)> for ProviderMatchDisplay {
    fn from((ssid, found): (&str, ProviderMatch)) -> Self {
        Self {
            ssid: truncate_string(ssid, 32),
            provider: or_missing(found.provider.as_deref()),
            score: format!("{:.2}", found.score),
            method: or_missing(found.method.map(|m| m.to_string()).as_deref()),
        }
    }
}
