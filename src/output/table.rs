//! Table output formatting

use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Rows},
};

/// Format rows as a rounded table with a centered header
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    if data.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new(data);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Tabled)]
    struct VendorRow {
        #[tabled(rename = "PREFIX")]
        prefix: String,
        #[tabled(rename = "VENDOR")]
        vendor: String,
    }

    fn row(prefix: &str, vendor: &str) -> VendorRow {
        VendorRow {
            prefix: prefix.to_string(),
            vendor: vendor.to_string(),
        }
    }

    #[test]
    fn test_empty_table() {
        let rows: Vec<VendorRow> = vec![];
        assert_eq!(format_table(&rows), "No results found.");
    }

    #[test]
    fn test_rows_and_headers() {
        let result = format_table(&[row("00-1A-2B", "Ayecom"), row("3C-5A-B4", "Google")]);

        assert!(result.contains("PREFIX"));
        assert!(result.contains("VENDOR"));
        assert!(result.contains("Ayecom"));
        assert!(result.contains("Google"));
        assert!(result.contains("╭"));
        assert!(result.contains("╰"));
    }
}
