use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::cli::{NetworkArgs, SweepArgs, SyncArgs};
use crate::retry::RetryConfig;
use crate::sweep::SweepOptions;
use crate::sync::SyncOptions;
use crate::transform::IssuePattern;

/// Validated configuration for one `sync` run.
#[derive(Debug)]
pub struct SyncConfig {
    pub identifier: String,
    pub series: Option<String>,
    pub pattern: Option<IssuePattern>,
    pub separator: String,
    pub suffix: String,
    pub download_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub history_file: PathBuf,
    pub archive_root: String,
    pub retry: RetryConfig,
    pub timeout: Duration,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

/// Validated configuration for the `sweep` loop. The token itself is
/// resolved separately so it never sits in a `Debug`-able struct.
#[derive(Debug)]
pub struct SweepConfig {
    pub source_dir: PathBuf,
    pub destination: String,
    pub suffix: String,
    pub upload_url: String,
    pub interval: Duration,
    pub max_passes: Option<u64>,
    pub retry: RetryConfig,
    pub timeout: Duration,
    pub notify_systemd: bool,
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Accept either a bare identifier or an archive URL.
///
/// `https://archive.org/details/<id>/...` (also `download`, `metadata`)
/// yields `<id>`; any other URL yields its last non-empty path segment.
pub(crate) fn extract_identifier(input: &str) -> anyhow::Result<String> {
    let input = input.trim();
    let Ok(url) = url::Url::parse(input) else {
        anyhow::ensure!(!input.is_empty(), "Item identifier must not be empty");
        return Ok(input.to_string());
    };

    let segments: Vec<String> = url
        .path_segments()
        .map(|s| {
            s.filter(|seg| !seg.is_empty())
                .map(|seg| {
                    urlencoding::decode(seg)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| seg.to_string())
                })
                .collect()
        })
        .unwrap_or_default();

    let id = match segments.as_slice() {
        [kind, id, ..] if matches!(kind.as_str(), "details" | "download" | "metadata") => id,
        [.., last] => last,
        [] => anyhow::bail!("No item identifier found in URL {}", input),
    };
    Ok(id.clone())
}

fn validate_network(args: &NetworkArgs) -> anyhow::Result<(RetryConfig, Duration)> {
    anyhow::ensure!(args.retries >= 1, "--retries must be at least 1");
    anyhow::ensure!(args.timeout > 0, "--timeout must be greater than 0");
    Ok((
        RetryConfig {
            attempts: args.retries,
            base_delay: Duration::from_secs(args.retry_delay),
        },
        Duration::from_secs(args.timeout),
    ))
}

impl SyncConfig {
    pub fn from_args(args: SyncArgs) -> anyhow::Result<Self> {
        let identifier = extract_identifier(&args.id)?;
        anyhow::ensure!(!args.suffix.is_empty(), "--suffix must not be empty");
        let pattern = args
            .pattern
            .as_deref()
            .map(IssuePattern::new)
            .transpose()
            .context("Invalid --pattern")?;
        let (retry, timeout) = validate_network(&args.network)?;
        let series = args
            .series
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            identifier,
            series,
            pattern,
            separator: args.separator,
            suffix: args.suffix,
            download_dir: expand_tilde(&args.download_dir),
            upload_dir: expand_tilde(&args.upload_dir),
            history_file: expand_tilde(&args.history_file),
            archive_root: args.archive_root,
            retry,
            timeout,
            dry_run: args.dry_run,
            no_progress_bar: args.no_progress_bar,
        })
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            identifier: self.identifier.clone(),
            series: self.series.clone(),
            suffix: self.suffix.clone(),
            staging_dir: self.download_dir.clone(),
            output_dir: self.upload_dir.clone(),
            dry_run: self.dry_run,
            no_progress_bar: self.no_progress_bar,
        }
    }
}

impl SweepConfig {
    pub fn from_args(args: &SweepArgs) -> anyhow::Result<Self> {
        anyhow::ensure!(!args.suffix.is_empty(), "--suffix must not be empty");
        anyhow::ensure!(args.interval > 0, "--interval must be greater than 0");
        anyhow::ensure!(
            !args.destination.trim().is_empty(),
            "--destination must not be empty"
        );
        let (retry, timeout) = validate_network(&args.network)?;

        Ok(Self {
            source_dir: expand_tilde(&args.dir),
            destination: args.destination.trim().to_string(),
            suffix: args.suffix.clone(),
            upload_url: args.upload_url.clone(),
            interval: Duration::from_secs(args.interval),
            max_passes: args.max_passes,
            retry,
            timeout,
            notify_systemd: args.notify_systemd,
        })
    }

    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions {
            source_dir: self.source_dir.clone(),
            suffix: self.suffix.clone(),
            interval: self.interval,
            max_passes: self.max_passes,
        }
    }
}
