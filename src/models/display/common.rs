//! Common display helpers

/// Placeholder shown for missing values
pub const MISSING: &str = "--";

/// Value or the placeholder
pub fn or_missing(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => MISSING.to_string(),
    }
}

/// Truncate to `max_chars` characters with an ellipsis
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_missing() {
        assert_eq!(or_missing(Some("KPN")), "KPN");
        assert_eq!(or_missing(Some("")), "--");
        assert_eq!(or_missing(None), "--");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate_string("Café Wi-Fi", 20), "Café Wi-Fi");
        assert_eq!(truncate_string("Ünïcödé SSID name", 8), "Ünïcö...");
    }
}
