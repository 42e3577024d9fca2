//! Processed capture display model

use serde::Serialize;
use tabled::Tabled;

use crate::enrich::BatchStats;
use crate::output::report::ExportSummary;

/// One processed capture file
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct CaptureDisplay {
    #[tabled(rename = "FILE")]
    pub file: String,

    #[tabled(rename = "DEVICES")]
    pub devices: usize,

    /// Devices with a vendor
    #[tabled(rename = "VENDORS")]
    pub vendors: usize,

    /// Devices with a provider
    #[tabled(rename = "PROVIDERS")]
    pub providers: usize,

    /// Vendor API calls that answered
    #[tabled(rename = "API")]
    pub api_lookups: usize,

    #[tabled(rename = "CSV")]
    pub csv: String,
}

impl CaptureDisplay {
    pub fn new(file: &str, export: &ExportSummary, stats: &BatchStats) -> Self {
        Self {
            file: file.to_string(),
            devices: export.rows,
            vendors: export.rows - export.missing_vendor,
            providers: export.rows - export.missing_provider,
            api_lookups: stats.api_found + stats.api_not_found,
            csv: export.csv_path.display().to_string(),
        }
    }
}
