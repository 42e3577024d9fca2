//! Display model implementations for table and JSON output
//!
//! Display models turn enrichment results into rows with upper-case column
//! names for tables and plain field names for JSON.

mod capture;
mod common;
mod provider;
mod vendor;

pub use capture::CaptureDisplay;
pub use provider::{ProviderDisplay, ProviderMatchDisplay};
pub use vendor::VendorDisplay;
