//! CSV export of enriched access points
//!
//! Writes `<stem>.csv` plus two diagnostic lists: `<stem>_NOT_VENDOR.log`
//! (short MAC id of every device without a vendor) and
//! `<stem>_NOT_PROVIDER.log` (`<short id>, <ssid>` for every device without
//! a provider). All three files are replaced on each run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::cache::key::format_mac_id;
use crate::error::{Error, Result};
use crate::kismet::EnrichedDevice;
use crate::output::formatters::format_unix_seconds;

/// Field separator of the exported CSV
pub const DELIMITER: char = ';';

const HEADER: [&str; 18] = [
    "MAC_1",
    "MAC_2",
    "MAC_3",
    "Provider",
    "SSID",
    "AuthMode",
    "FirstSeen",
    "Channel",
    "RSSI",
    "CurrentLatitude",
    "CurrentLongitude",
    "AltitudeMeters",
    "AccuracyMeters",
    "Type",
    "MAC_ID_1",
    "MAC_ID_2",
    "Device",
    "Vendor",
];

/// Where an export went and what it contained
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub csv_path: PathBuf,
    pub not_vendor_path: PathBuf,
    pub not_provider_path: PathBuf,
    pub rows: usize,
    pub missing_vendor: usize,
    pub missing_provider: usize,
}

/// Write the CSV and diagnostic logs for `devices` into `out_dir`.
///
/// `out_dir` must already exist.
pub fn write_csv(devices: &[EnrichedDevice], out_dir: &Path, stem: &str) -> Result<ExportSummary> {
    if !out_dir.is_dir() {
        return Err(Error::Other(format!(
            "output directory '{}' does not exist",
            out_dir.display()
        )));
    }

    let csv_path = out_dir.join(format!("{}.csv", stem));
    let not_vendor_path = out_dir.join(format!("{}_NOT_VENDOR.log", stem));
    let not_provider_path = out_dir.join(format!("{}_NOT_PROVIDER.log", stem));

    let mut csv = BufWriter::new(File::create(&csv_path)?);
    let mut not_vendor = BufWriter::new(File::create(&not_vendor_path)?);
    let mut not_provider = BufWriter::new(File::create(&not_provider_path)?);

    write_record(&mut csv, HEADER.iter().map(|h| h.to_string()))?;

    let mut missing_vendor = 0;
    let mut missing_provider = 0;
    for device in devices {
        let short_id = format_mac_id(&device.mac, Some(3), ":").unwrap_or_default();
        write_record(&mut csv, device_row(device, &short_id))?;

        if device.vendor.as_deref().is_none_or(str::is_empty) {
            writeln!(not_vendor, "{}", short_id)?;
            missing_vendor += 1;
        }
        if device.provider.as_deref().is_none_or(str::is_empty) {
            writeln!(not_provider, "{}, {}", short_id, device.ssid)?;
            missing_provider += 1;
        }
    }

    csv.flush()?;
    not_vendor.flush()?;
    not_provider.flush()?;

    info!("Exported {} devices to {}", devices.len(), csv_path.display());
    Ok(ExportSummary {
        csv_path,
        not_vendor_path,
        not_provider_path,
        rows: devices.len(),
        missing_vendor,
        missing_provider,
    })
}

fn device_row(device: &EnrichedDevice, short_id: &str) -> Vec<String> {
    let mac = device.mac.as_str();
    vec![
        mac.to_string(),
        format_mac_id(mac, None, "").unwrap_or_default(),
        format_mac_id(mac, Some(4), "").unwrap_or_default(),
        device.provider.clone().unwrap_or_default(),
        device.ssid.clone(),
        device.encryption.clone(),
        format_unix_seconds(device.first_seen),
        device.channel.clone(),
        device.rssi.to_string(),
        device.location.lat.to_string(),
        device.location.lon.to_string(),
        device.location.alt.to_string(),
        device.accuracy_m.to_string(),
        device.device_type.clone(),
        short_id.to_string(),
        format_mac_id(mac, Some(3), "").unwrap_or_default(),
        device.manufacturer.clone(),
        device.vendor.clone().unwrap_or_default(),
    ]
}

fn write_record<W: Write>(out: &mut W, fields: impl IntoIterator<Item = String>) -> Result<()> {
    let line = fields
        .into_iter()
        .map(|f| quote_field(&f))
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string());
    // CSV records end in CRLF
    write!(out, "{}\r\n", line)?;
    Ok(())
}

/// Quote only when the field holds the delimiter, a quote or a line break
fn quote_field(field: &str) -> String {
    if field.contains([DELIMITER, '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
