//! Capture processing: read, enrich, match providers, export

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::Serialize;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat, ProcessArgs};
use crate::client::VendorApi;
use crate::enrich::BatchStats;
use crate::error::{Error, Result};
use crate::kismet::{CaptureFilter, read_access_points};
use crate::models::CaptureDisplay;
use crate::output::Formattable;
use crate::output::json::format_json;
use crate::output::report::{ExportSummary, write_csv};
use crate::provider::{ProviderMatcher, ProviderRoster};

/// Result of one capture file
#[derive(Debug, Serialize)]
struct ProcessedCapture {
    file: String,
    export: ExportSummary,
    stats: BatchStats,
    elapsed_secs: f64,
}

/// Everything a capture file needs, shared across files
struct Pipeline<'a> {
    ctx: &'a CommandContext,
    api: Arc<dyn VendorApi>,
    matcher: ProviderMatcher,
    roster: ProviderRoster,
    filter: CaptureFilter,
    show_progress: bool,
}

/// Process every capture in `args.files`.
///
/// A file that fails is reported and skipped; the command fails afterwards
/// if any file did.
pub async fn run(opts: &GlobalOptions, args: &ProcessArgs) -> Result<()> {
    if !args.out.is_dir() {
        return Err(Error::Other(format!(
            "output directory '{}' does not exist",
            args.out.display()
        )));
    }

    let ctx = CommandContext::new(opts)?;

    let mut filter = CaptureFilter::from_config(&ctx.config.capture);
    filter.ssid = args.ssid.clone();
    filter.encryption = args.encryption.clone();

    let pipeline = Pipeline {
        api: ctx.vendor_client()?,
        matcher: ctx.matcher()?,
        roster: ctx.roster(args.providers.as_deref())?,
        filter,
        show_progress: ctx.format != OutputFormat::Json,
        ctx: &ctx,
    };

    let mut processed = Vec::with_capacity(args.files.len());
    let mut failed = 0usize;
    for file in &args.files {
        match pipeline.process_file(file, &args.out).await {
            Ok(capture) => processed.push(capture),
            Err(e) => {
                failed += 1;
                warn!("Skipping {}: {}", file.display(), e);
                if ctx.format != OutputFormat::Json {
                    eprintln!("{} {}: {}", "✗".red(), file.display(), e);
                }
            }
        }
    }

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json(&processed)?),
        format => {
            let rows: Vec<CaptureDisplay> = processed
                .iter()
                .map(|p| CaptureDisplay::new(&p.file, &p.export, &p.stats))
                .collect();
            rows.print(format)?;
        }
    }

    if failed > 0 {
        return Err(Error::Other(format!(
            "{} of {} capture files failed",
            failed,
            args.files.len()
        )));
    }
    Ok(())
}

impl Pipeline<'_> {
    async fn process_file(&self, path: &Path, out_dir: &Path) -> Result<ProcessedCapture> {
        let started = Instant::now();
        let mut devices = read_access_points(path, &self.filter)?;
        info!("{}: {} access points", path.display(), devices.len());

        let bar = self.progress_bar(path);
        let enricher = self.ctx.enricher(self.api.clone()).with_progress(bar.clone());

        let macs: Vec<String> = devices.iter().map(|d| d.mac.clone()).collect();
        let report = enricher.enrich_batch_report(&macs).await;
        bar.finish_and_clear();

        for device in devices.iter_mut() {
            device.vendor = report.vendors.get(&device.mac).cloned().flatten();
            let found = self
                .matcher
                .match_with_memory(&device.ssid, &device.mac, &self.roster, self.ctx.store.as_ref())
                .await;
            device.provider = found.provider;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture".to_string());
        let export = write_csv(&devices, out_dir, &stem)?;

        let elapsed = started.elapsed();
        info!(
            "Processed {} devices from {} in {:.2} seconds",
            export.rows,
            path.display(),
            elapsed.as_secs_f64()
        );

        Ok(ProcessedCapture {
            file: path.display().to_string(),
            export,
            stats: report.stats,
            elapsed_secs: elapsed.as_secs_f64(),
        })
    }

    fn progress_bar(&self, path: &Path) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len} prefixes ({elapsed})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        bar
    }
}
