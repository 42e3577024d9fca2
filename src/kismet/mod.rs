//! Kismet capture reader
//!
//! Reads access points from a `.kismet` SQLite log. One row per BSSID is
//! kept (the one with the strongest signal), and the JSON device record is
//! parsed for SSID, channel, encryption and location.

use std::path::Path;

use log::{debug, warn};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use serde_json::Value;

use crate::cache::key::canonical_mac;
use crate::config::CaptureConfig;
use crate::error::{Error, Result};

const ACCESS_POINT_QUERY: &str = r#"
    SELECT first_time, last_time, devmac, strongest_signal, avg_lat, avg_lon, type, device
    FROM (
        SELECT *, ROW_NUMBER() OVER (
            PARTITION BY devmac ORDER BY strongest_signal DESC
        ) AS rn
        FROM devices
        WHERE type = 'Wi-Fi AP'
    )
    WHERE rn = 1 AND strongest_signal <> 0
    ORDER BY devmac
"#;

/// Which access points to keep
#[derive(Debug, Clone, Default)]
pub struct CaptureFilter {
    /// Keep only SSIDs containing this text
    pub ssid: Option<String>,
    /// Keep only encryption strings containing this text
    pub encryption: Option<String>,
    /// Drop SSIDs containing any of these words
    pub excluded_ssids: Vec<String>,
    pub process_without_location: bool,
    pub flip_coordinates: bool,
}

impl CaptureFilter {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            ssid: None,
            encryption: None,
            excluded_ssids: config.excluded_ssids.clone(),
            process_without_location: config.process_without_location,
            flip_coordinates: config.flip_coordinates,
        }
    }

    fn accepts(&self, device: &EnrichedDevice) -> bool {
        let ssid = device.ssid.to_lowercase();
        if let Some(wanted) = &self.ssid
            && !ssid.contains(&wanted.to_lowercase())
        {
            return false;
        }
        if self
            .excluded_ssids
            .iter()
            .map(|w| w.trim().to_lowercase())
            .any(|w| !w.is_empty() && ssid.contains(&w))
        {
            return false;
        }
        if let Some(wanted) = &self.encryption
            && !device
                .encryption
                .to_lowercase()
                .contains(&wanted.to_lowercase())
        {
            return false;
        }
        self.process_without_location || device.location.is_known()
    }
}

/// GPS fix of a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl Location {
    /// Kismet reports 0/0 when it had no fix
    pub fn is_known(&self) -> bool {
        self.lat != 0.0 || self.lon != 0.0
    }
}

/// An access point read from a capture, plus what enrichment adds
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedDevice {
    /// Canonical `AA:BB:CC:DD:EE:FF`
    pub mac: String,
    pub ssid: String,
    pub encryption: String,
    /// Unix seconds
    pub first_seen: i64,
    pub last_seen: i64,
    pub channel: String,
    pub rssi: i64,
    pub location: Location,
    pub accuracy_m: f64,
    pub device_type: String,
    pub manufacturer: String,
    pub vendor: Option<String>,
    pub provider: Option<String>,
}

/// Read the strongest sighting of every access point in `path`
pub fn read_access_points(path: &Path, filter: &CaptureFilter) -> Result<Vec<EnrichedDevice>> {
    if !path.exists() {
        return Err(Error::Kismet(format!("{} does not exist", path.display())));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| Error::Kismet(format!("{}: {}", path.display(), e)))?;

    let mut stmt = conn
        .prepare(ACCESS_POINT_QUERY)
        .map_err(|e| Error::Kismet(format!("{} is not a Kismet log: {}", path.display(), e)))?;

    let mut rows = stmt
        .query([])
        .map_err(|e| Error::Kismet(format!("{}: {}", path.display(), e)))?;

    let mut devices = Vec::new();
    let mut skipped = 0usize;
    while let Some(row) = rows
        .next()
        .map_err(|e| Error::Kismet(format!("{}: {}", path.display(), e)))?
    {
        let devmac: String = row.get(2).unwrap_or_default();
        let raw = RawRow {
            first_time: row.get(0).unwrap_or(0),
            last_time: row.get(1).unwrap_or(0),
            devmac: devmac.clone(),
            strongest_signal: row.get(3).unwrap_or(0),
            avg_lat: row.get(4).unwrap_or(0.0),
            avg_lon: row.get(5).unwrap_or(0.0),
            device_type: row.get(6).unwrap_or_default(),
        };

        let json = match row.get_ref(7) {
            Ok(ValueRef::Blob(bytes)) | Ok(ValueRef::Text(bytes)) => serde_json::from_slice::<Value>(bytes).ok(),
            _ => None,
        };
        let Some(json) = json else {
            warn!("Skipping {}: unreadable device record", devmac);
            skipped += 1;
            continue;
        };

        match parse_device(&raw, &json, filter.flip_coordinates) {
            Some(device) if filter.accepts(&device) => devices.push(device),
            Some(_) => skipped += 1,
            None => {
                debug!("Skipping {}: not a valid MAC address", devmac);
                skipped += 1;
            }
        }
    }

    debug!(
        "Read {} access points from {} ({} skipped)",
        devices.len(),
        path.display(),
        skipped
    );
    Ok(devices)
}

struct RawRow {
    first_time: i64,
    last_time: i64,
    devmac: String,
    strongest_signal: i64,
    avg_lat: f64,
    avg_lon: f64,
    device_type: String,
}

fn parse_device(raw: &RawRow, dev: &Value, flip: bool) -> Option<EnrichedDevice> {
    let mac_text = str_at(dev, &["kismet.device.base.macaddr"]).unwrap_or(raw.devmac.as_str());
    let mac = canonical_mac(mac_text)?;

    let ssid = str_at(
        dev,
        &[
            "dot11.device",
            "dot11.device.last_beaconed_ssid_record",
            "dot11.advertisedssid.ssid",
        ],
    )
    .or_else(|| str_at(dev, &["kismet.device.base.commonname"]))
    .or_else(|| str_at(dev, &["kismet.device.base.name"]))
    .unwrap_or_default()
    .to_string();

    let encryption = str_at(
        dev,
        &[
            "dot11.device",
            "dot11.device.last_beaconed_ssid_record",
            "dot11.advertisedssid.crypt_string",
        ],
    )
    .or_else(|| str_at(dev, &["kismet.device.base.crypt"]))
    .unwrap_or_default()
    .to_string();

    let channel = match dev.get("kismet.device.base.channel") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    let mut location = json_location(dev).unwrap_or(Location {
        lat: raw.avg_lat,
        lon: raw.avg_lon,
        alt: 0.0,
    });
    if flip {
        std::mem::swap(&mut location.lat, &mut location.lon);
    }

    Some(EnrichedDevice {
        mac,
        ssid,
        encryption,
        first_seen: raw.first_time,
        last_seen: raw.last_time,
        channel,
        rssi: raw.strongest_signal,
        location,
        accuracy_m: 0.0,
        device_type: str_at(dev, &["kismet.device.base.type"])
            .unwrap_or(raw.device_type.as_str())
            .to_string(),
        manufacturer: str_at(dev, &["kismet.device.base.manuf"])
            .unwrap_or_default()
            .to_string(),
        vendor: None,
        provider: None,
    })
}

/// Average fix from the device record; geopoints are `[lon, lat]`
fn json_location(dev: &Value) -> Option<Location> {
    let loc = dev
        .get("kismet.device.base.location")?
        .get("kismet.common.location.avg_loc")?;
    let point = loc.get("kismet.common.location.geopoint")?.as_array()?;
    let lon = point.first()?.as_f64()?;
    let lat = point.get(1)?.as_f64()?;
    let alt = loc
        .get("kismet.common.location.alt")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    Some(Location { lat, lon, alt })
}

fn str_at<'a>(dev: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(dev, |node, key| node.get(*key))?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
