//! Upload sweeper: periodically push finished artifacts from a local
//! directory to a remote store, deleting each one only after the remote side
//! accepted it.
//!
//! Runs independently of the sync pipeline; the only contract between the
//! two is the directory. Outputs land there under their final name via a
//! rename, so a scan never picks up a half-written file.

pub mod relay;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use relay::{DropboxRelay, Relay};

use crate::paths;
use crate::systemd::SystemdNotifier;

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub source_dir: PathBuf,
    pub suffix: String,
    pub interval: Duration,
    /// Stop after this many passes; `None` runs until shutdown.
    pub max_passes: Option<u64>,
}

/// Outcome of one scan-and-relay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub relayed: usize,
    pub failed: usize,
    /// Relayed, but the local copy could not be removed; it will be relayed
    /// again next pass.
    pub delete_failed: usize,
}

/// Regular files directly inside `dir` whose names end in `suffix` (ASCII
/// case-insensitive), sorted by name.
pub async fn scan_artifacts(dir: &Path, suffix: &str) -> Result<Vec<(PathBuf, String)>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;
    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
    {
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!("Skipping non-UTF-8 name {:?}", entry.file_name());
            continue;
        };
        if !paths::has_suffix_ignore_case(&name, suffix) {
            continue;
        }
        match entry.file_type().await {
            Ok(ft) if ft.is_file() => found.push((entry.path(), name)),
            Ok(_) => {}
            Err(e) => tracing::debug!("Skipping {}: {}", name, e),
        }
    }
    found.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(found)
}

/// One pass: relay every matching artifact, deleting each only after a
/// successful relay. Failures are logged and left for the next pass.
pub async fn sweep_once(relay: &dyn Relay, options: &SweepOptions) -> Result<PassReport> {
    let artifacts = scan_artifacts(&options.source_dir, &options.suffix).await?;
    let mut report = PassReport::default();
    if artifacts.is_empty() {
        tracing::debug!("Nothing to upload");
        return Ok(report);
    }
    tracing::info!("{} file(s) to upload", artifacts.len());

    for (path, name) in &artifacts {
        if let Err(e) = relay.relay(path, name).await {
            tracing::error!("Upload failed for {}: {}", name, e);
            report.failed += 1;
            continue;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => report.relayed += 1,
            Err(e) => {
                tracing::warn!("Uploaded {} but could not delete it: {}", name, e);
                report.delete_failed += 1;
            }
        }
    }
    tracing::info!(
        relayed = report.relayed,
        failed = report.failed,
        delete_failed = report.delete_failed,
        "Pass complete"
    );
    Ok(report)
}

/// Run passes until `shutdown` is cancelled or `max_passes` is reached,
/// sleeping `interval` between them. Returns the number of passes run.
///
/// A pass that cannot even scan the directory is logged and retried on the
/// next tick; the loop itself never fails.
pub(crate) async fn run_sweeper(
    relay: &dyn Relay,
    options: &SweepOptions,
    shutdown: CancellationToken,
    notifier: &SystemdNotifier,
) -> u64 {
    let span = tracing::info_span!("sweep", dir = %options.source_dir.display());
    sweep_loop(relay, options, shutdown, notifier)
        .instrument(span)
        .await
}

async fn sweep_loop(
    relay: &dyn Relay,
    options: &SweepOptions,
    shutdown: CancellationToken,
    notifier: &SystemdNotifier,
) -> u64 {
    notifier.notify_ready();
    let mut passes = 0u64;

    loop {
        if shutdown.is_cancelled() {
            tracing::info!("Shutdown requested, exiting...");
            break;
        }

        notifier.notify_watchdog();
        match sweep_once(relay, options).await {
            Ok(report) => notifier.notify_status(&format!(
                "Pass {}: {} uploaded, {} failed",
                passes + 1,
                report.relayed,
                report.failed
            )),
            Err(e) => {
                tracing::error!("Pass failed: {:#}", e);
                notifier.notify_status("Last pass failed");
            }
        }
        passes += 1;

        if options.max_passes.is_some_and(|max| passes >= max) {
            break;
        }

        tracing::info!("Waiting {} seconds...", options.interval.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(options.interval) => {}
            _ = shutdown.cancelled() => {
                tracing::info!("Shutdown during wait, exiting...");
                break;
            }
        }
    }

    notifier.notify_stopping();
    passes
}

#[cfg(test)]
mod tests {
    use super::relay::RelayError;
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory relay that records every delivery and rejects named files.
    #[derive(Default)]
    struct Recorder {
        delivered: Mutex<Vec<(String, Vec<u8>)>>,
        reject: HashSet<&'static str>,
    }

    #[async_trait]
    impl Relay for Recorder {
        async fn relay(&self, path: &Path, name: &str) -> Result<(), RelayError> {
            if self.reject.contains(name) {
                return Err(RelayError::Header {
                    name: name.to_string(),
                    message: "rejected".into(),
                });
            }
            let bytes = std::fs::read(path).unwrap();
            self.delivered.lock().unwrap().push((name.to_string(), bytes));
            Ok(())
        }
    }

    impl Recorder {
        fn names(&self) -> Vec<String> {
            self.delivered
                .lock()
                .unwrap()
                .iter()
                .map(|(n, _)| n.clone())
                .collect()
        }
    }

    fn options(dir: &Path) -> SweepOptions {
        SweepOptions {
            source_dir: dir.to_path_buf(),
            suffix: ".pdf".to_string(),
            interval: Duration::from_millis(10),
            max_passes: Some(1),
        }
    }

    #[tokio::test]
    async fn test_scan_matches_suffix_and_skips_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"b").unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"a").unwrap();
        std::fs::write(dir.path().join("c.pdf.part"), b"c").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"n").unwrap();
        std::fs::create_dir(dir.path().join("sub.pdf")).unwrap();
        std::fs::write(dir.path().join("sub.pdf/inner.pdf"), b"i").unwrap();

        let found = scan_artifacts(dir.path(), ".pdf").await.unwrap();
        let names: Vec<_> = found.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(names, ["a.PDF", "b.pdf"]);
    }

    #[tokio::test]
    async fn test_pass_relays_then_deletes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"AAA").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"k").unwrap();
        let relay = Recorder::default();

        let report = sweep_once(&relay, &options(dir.path())).await.unwrap();

        assert_eq!(report.relayed, 1);
        assert_eq!(
            *relay.delivered.lock().unwrap(),
            [("a.pdf".to_string(), b"AAA".to_vec())]
        );
        assert!(!dir.path().join("a.pdf").exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_failed_relay_keeps_file_for_next_pass() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"A").unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"B").unwrap();
        let relay = Recorder {
            reject: HashSet::from(["a.pdf"]),
            ..Recorder::default()
        };

        let report = sweep_once(&relay, &options(dir.path())).await.unwrap();

        assert_eq!(report, PassReport { relayed: 1, failed: 1, delete_failed: 0 });
        assert!(dir.path().join("a.pdf").exists());
        assert!(!dir.path().join("b.pdf").exists());
        assert_eq!(relay.names(), ["b.pdf"]);
    }

    #[tokio::test]
    async fn test_empty_directory_is_a_quiet_pass() {
        let dir = TempDir::new().unwrap();
        let relay = Recorder::default();
        let report = sweep_once(&relay, &options(dir.path())).await.unwrap();
        assert_eq!(report, PassReport::default());
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let relay = Recorder::default();
        let result = sweep_once(&relay, &options(&dir.path().join("nope"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_loop_picks_up_files_added_between_passes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("first.pdf"), b"1").unwrap();
        let relay = Recorder::default();
        let mut opts = options(dir.path());
        opts.max_passes = Some(1);
        let notifier = SystemdNotifier::new(false);

        let passes = run_sweeper(&relay, &opts, CancellationToken::new(), &notifier).await;
        assert_eq!(passes, 1);

        std::fs::write(dir.path().join("second.pdf"), b"2").unwrap();
        run_sweeper(&relay, &opts, CancellationToken::new(), &notifier).await;
        assert_eq!(relay.names(), ["first.pdf", "second.pdf"]);
    }

    #[tokio::test]
    async fn test_loop_stops_at_max_passes() {
        let dir = TempDir::new().unwrap();
        let relay = Recorder::default();
        let mut opts = options(dir.path());
        opts.max_passes = Some(3);

        let passes = run_sweeper(
            &relay,
            &opts,
            CancellationToken::new(),
            &SystemdNotifier::new(false),
        )
        .await;
        assert_eq!(passes, 3);
    }

    #[tokio::test]
    async fn test_loop_exits_on_shutdown_during_wait() {
        let dir = TempDir::new().unwrap();
        let relay = Recorder::default();
        let mut opts = options(dir.path());
        opts.max_passes = None;
        opts.interval = Duration::from_secs(3600);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let passes = tokio::time::timeout(
            Duration::from_secs(5),
            run_sweeper(&relay, &opts, token, &SystemdNotifier::new(false)),
        )
        .await
        .unwrap();
        assert_eq!(passes, 1);
    }

    #[tokio::test]
    async fn test_loop_survives_unreadable_directory() {
        let dir = TempDir::new().unwrap();
        let relay = Recorder::default();
        let mut opts = options(&dir.path().join("missing"));
        opts.max_passes = Some(2);

        let passes = run_sweeper(
            &relay,
            &opts,
            CancellationToken::new(),
            &SystemdNotifier::new(false),
        )
        .await;
        assert_eq!(passes, 2);
    }
}
