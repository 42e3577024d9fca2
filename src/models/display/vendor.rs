//! Vendor lookup display model

use serde::Serialize;
use tabled::Tabled;

use super::common::or_missing;
use crate::cache::key::vendor_prefix;

/// One looked-up MAC address
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct VendorDisplay {
    #[tabled(rename = "MAC")]
    pub mac: String,

    /// OUI prefix, e.g. `00-1A-2B`
    #[tabled(rename = "PREFIX")]
    pub prefix: String,

    #[tabled(rename = "VENDOR")]
    pub vendor: String,
}

impl From<(String, Option<String>)> for VendorDisplay {
    fn from((mac, vendor): (String, Option<String>)) -> Self {
        let prefix = vendor_prefix(&mac).unwrap_or_default();
        Self {
            mac,
            prefix,
            vendor: or_missing(vendor.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::table::format_table;

    #[test]
    fn test_missing_vendor_renders_placeholder() {
        let rows = vec![
            VendorDisplay::from(("00:1A:2B:3C:4D:5E".to_string(), Some("Ayecom".to_string()))),
            VendorDisplay::from(("not-a-mac".to_string(), None)),
        ];
        assert_eq!(rows[0].prefix, "00-1A-2B");
        assert_eq!(rows[1].prefix, "");

        let table = format_table(&rows);
        assert!(table.contains("Ayecom"));
        assert!(table.contains("--"));
    }
}
