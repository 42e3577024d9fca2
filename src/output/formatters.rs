//! Reusable formatting helpers for timestamps and durations

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Format Unix seconds as `MM/DD/YYYY HH:MM` in UTC.
///
/// Returns an empty string for zero or out-of-range values.
pub fn format_unix_seconds(secs: i64) -> String {
    if secs == 0 {
        return String::new();
    }
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.format("%m/%d/%Y %H:%M").to_string())
        .unwrap_or_default()
}

/// Format an optional instant for status output, "never" when absent
pub fn format_datetime(at: Option<DateTime<Utc>>) -> String {
    at.map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// Format a duration as `1h 2m 3s`, `2m 5s` or `45s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
