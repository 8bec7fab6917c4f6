//! Sync pipeline: bring one catalog item's pending files through
//! fetch -> transform -> record, one file at a time.
//!
//! The ordering inside the per-file loop is the crash-safety contract. A name
//! is appended to the progress record only after its transform succeeded,
//! and the record is saved before the next file is touched. Killing the
//! process at any point therefore loses at most the file in flight; every
//! recorded name really is done.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::catalog::{self, Catalog, FileEntry};
use crate::fetch::FetchError;
use crate::paths;
use crate::state::ProgressStore;
use crate::transform::{Transform, TransformJob};

/// Subset of application config consumed by the pipeline.
/// Decoupled from CLI parsing so the pipeline can be tested independently.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub identifier: String,
    /// Tag value; falls back to the catalog title, then the identifier.
    pub series: Option<String>,
    pub suffix: String,
    pub staging_dir: PathBuf,
    pub output_dir: PathBuf,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

/// Outcome counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pending: usize,
    pub processed: usize,
    pub fetch_failed: usize,
    pub transform_failed: usize,
    /// Shutdown stopped the run before every pending file was attempted.
    pub interrupted: bool,
}

impl SyncReport {
    pub fn skipped(&self) -> usize {
        self.fetch_failed + self.transform_failed
    }
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar`
/// or stdout is not a TTY.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// Run the pipeline once for `options.identifier`.
///
/// Returns `Err` only when the run cannot proceed at all: the progress record
/// is unreadable or unwritable, or the catalog cannot be resolved. Files that
/// fail to fetch or transform are counted in the report and left for the
/// next run.
pub async fn run_sync(
    catalog: &Catalog,
    store: &dyn ProgressStore,
    transform: &dyn Transform,
    options: &SyncOptions,
    shutdown: CancellationToken,
) -> Result<SyncReport> {
    let span = tracing::info_span!("sync", id = %options.identifier);
    sync_item(catalog, store, transform, options, shutdown)
        .instrument(span)
        .await
}

async fn sync_item(
    catalog: &Catalog,
    store: &dyn ProgressStore,
    transform: &dyn Transform,
    options: &SyncOptions,
    shutdown: CancellationToken,
) -> Result<SyncReport> {
    let started = Instant::now();
    let id = options.identifier.as_str();

    if !options.dry_run {
        for dir in [&options.staging_dir, &options.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
    }

    // Nothing is saved until a file completes, so an unknown entry stays
    // absent from the durable record until then.
    let mut record = store.load().await?;

    let listing = match catalog.resolve_listing(id).await {
        Ok(listing) => listing,
        Err(e) => {
            tracing::error!("Could not resolve catalog, aborting: {}", e);
            return Err(e.into());
        }
    };

    let series = options
        .series
        .clone()
        .or_else(|| listing.title.clone())
        .unwrap_or_else(|| id.to_string());
    tracing::info!("Series: {}", series);

    let pending = catalog::compute_pending(id, &record, &listing, &options.suffix);
    let mut report = SyncReport {
        pending: pending.len(),
        ..SyncReport::default()
    };
    if pending.is_empty() {
        tracing::info!("No new files to process");
        return Ok(report);
    }

    if options.dry_run {
        for name in &pending {
            let size = listing
                .files
                .iter()
                .find(|f| &f.name == name)
                .and_then(FileEntry::size);
            match size {
                Some(bytes) => tracing::info!("[DRY RUN] Would fetch {} ({} bytes)", name, bytes),
                None => tracing::info!("[DRY RUN] Would fetch {}", name),
            }
        }
        return Ok(report);
    }

    let pb = create_progress_bar(options.no_progress_bar, pending.len() as u64);

    for name in &pending {
        if shutdown.is_cancelled() {
            pb.suspend(|| tracing::info!("Shutdown requested, stopping before {}", name));
            report.interrupted = true;
            break;
        }
        pb.set_message(name.clone());

        let staged = paths::staging_path(&options.staging_dir, name);
        match catalog.fetch_file(id, name, &staged).await {
            Ok(bytes) => {
                pb.suspend(|| tracing::info!(bytes, "Downloaded {}", staged.display()));
            }
            Err(FetchError::Cancelled { .. }) => {
                pb.suspend(|| tracing::info!("Shutdown requested, abandoning {}", name));
                report.interrupted = true;
                break;
            }
            Err(e) => {
                pb.suspend(|| tracing::error!("Failed to download {}: {}", name, e));
                report.fetch_failed += 1;
                pb.inc(1);
                continue;
            }
        }

        let job = TransformJob {
            filename: name,
            staged: &staged,
            series: &series,
        };
        if let Err(e) = transform.apply(&job).await {
            pb.suspend(|| tracing::error!("Skipping {}: {}", name, e));
            report.transform_failed += 1;
            pb.inc(1);
            continue;
        }

        record.append(id, name);
        store
            .save(&record)
            .await
            .with_context(|| format!("Failed to record completion of {}", name))?;
        report.processed += 1;
        pb.inc(1);
    }

    pb.finish_and_clear();

    tracing::info!("── Summary ──");
    tracing::info!(
        "  {} processed, {} skipped, {} pending",
        report.processed,
        report.skipped(),
        report.pending
    );
    if report.interrupted {
        tracing::info!("  interrupted by shutdown; remaining files stay pending");
    }
    tracing::info!("  elapsed: {}", format_duration(started.elapsed()));

    Ok(report)
}

pub(crate) fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
