//! MAC address normalisation and store key derivation
//!
//! Accepts `00:11:22:33:44:55`, `00-11-22-33-44-55`, `0011.2233.4455`,
//! `001122334455` and partial addresses (at least one octet).

/// Octets that identify the vendor (OUI)
pub const VENDOR_OCTETS: usize = 3;

/// Octets of the BSSID-level provider id
pub const PROVIDER_ID_OCTETS: usize = 5;

/// Octets of the provider sub-prefix used as a fallback
pub const PROVIDER_SUB_PREFIX_OCTETS: usize = 4;

/// Split a MAC address into upper-case hex octets.
///
/// Returns `None` unless the address holds 1-6 whole octets of hex digits.
pub fn mac_octets(raw: &str) -> Option<Vec<String>> {
    let normalized: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if normalized.is_empty()
        || normalized.len() > 12
        || normalized.len() % 2 != 0
        || !normalized.chars().all(|c| c.is_ascii_hexdigit())
    {
        return None;
    }

    Some(
        normalized
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect(),
    )
}

/// Join the first `take` octets (all when `None`) with `separator`.
pub fn format_mac_id(raw: &str, take: Option<usize>, separator: &str) -> Option<String> {
    let octets = mac_octets(raw)?;
    let end = take.unwrap_or(octets.len()).min(octets.len());
    Some(octets[..end].join(separator))
}

/// Canonical colon-separated form used as the result map key
pub fn canonical_mac(raw: &str) -> Option<String> {
    let octets = mac_octets(raw)?;
    if octets.len() != 6 {
        return None;
    }
    Some(octets.join(":"))
}

/// Vendor store key and API path segment, e.g. `00-11-22`
pub fn vendor_prefix(raw: &str) -> Option<String> {
    let octets = mac_octets(raw)?;
    if octets.len() < VENDOR_OCTETS {
        return None;
    }
    Some(octets[..VENDOR_OCTETS].join("-"))
}

/// BSSID-level provider id and its sub-prefix, e.g. `("0011223344", "00112233")`
pub fn provider_ids(raw: &str) -> Option<(String, String)> {
    let octets = mac_octets(raw)?;
    if octets.len() < PROVIDER_ID_OCTETS {
        return None;
    }
    Some((
        octets[..PROVIDER_ID_OCTETS].concat(),
        octets[..PROVIDER_SUB_PREFIX_OCTETS].concat(),
    ))
}

/// True when `text` is a full six-octet address written with `:` or `-`.
///
/// Access points that broadcast their own BSSID as SSID look like this.
pub fn is_mac_shaped(text: &str) -> bool {
    let text = text.trim();
    let separator = match text.chars().nth(2) {
        Some(c @ (':' | '-')) => c,
        _ => return false,
    };
    let parts: Vec<&str> = text.split(separator).collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}
