//! archive-relay: mirror the documents of an archive.org item into a local
//! folder, tag each one with series/issue metadata, and relay finished files
//! to cloud storage.
//!
//! `sync` is a one-shot pipeline run that is safe to re-run: a persisted
//! progress record means each file is fetched and tagged at most once across
//! runs. `sweep` is an independent long-running loop that uploads whatever
//! lands in the output directory and deletes it after a confirmed upload.

#![warn(clippy::all)]

mod catalog;
mod cli;
mod config;
mod fetch;
mod paths;
pub mod retry;
mod shutdown;
mod state;
mod sweep;
mod sync;
mod systemd;
mod transform;
mod types;

use std::io::Write;

use anyhow::Context;
use chrono::{DateTime, Local};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::{SweepConfig, SyncConfig};
use state::{JsonProgressStore, ProgressStore};
use transform::{PdfTagger, Relocator, Transform};

/// Run the sync command.
async fn run_sync(args: cli::SyncArgs) -> anyhow::Result<()> {
    let config = SyncConfig::from_args(args)?;
    tracing::debug!(?config, "Resolved configuration");

    let shutdown_token = shutdown::install_signal_handler()?;
    let store = JsonProgressStore::new(&config.history_file);

    // Dry runs write nothing, not even the lock file.
    let _lock = if config.dry_run {
        None
    } else {
        let lock = store.lock().await?;
        tracing::debug!("Holding {}", lock.path().display());
        Some(lock)
    };

    let fetcher = fetch::Fetcher::new(config.retry, config.timeout, shutdown_token.clone())?;
    let catalog = catalog::Catalog::new(fetcher, &config.archive_root);

    let transform: Box<dyn Transform> = match &config.pattern {
        Some(pattern) => {
            tracing::info!("Tagging files matching {}", pattern.as_str());
            Box::new(PdfTagger::new(
                pattern.clone(),
                config.separator.clone(),
                config.upload_dir.clone(),
                config.suffix.clone(),
            ))
        }
        None => Box::new(Relocator::new(config.upload_dir.clone())),
    };

    let report = sync::run_sync(
        &catalog,
        &store,
        transform.as_ref(),
        &config.sync_options(),
        shutdown_token,
    )
    .await?;

    if report.skipped() > 0 {
        tracing::warn!(
            "{} file(s) skipped; they stay pending for the next run",
            report.skipped()
        );
    }
    Ok(())
}

/// Run the sweep command.
async fn run_sweep(args: cli::SweepArgs) -> anyhow::Result<()> {
    let config = SweepConfig::from_args(&args)?;
    tracing::debug!(?config, "Resolved configuration");
    anyhow::ensure!(
        config.source_dir.is_dir(),
        "Directory does not exist: {}",
        config.source_dir.display()
    );

    let token = match args.token {
        Some(token) => token,
        None => tokio::task::spawn_blocking(|| rpassword::prompt_password("Access token: "))
            .await?
            .context("Failed to read access token")?,
    };
    let token = token.trim().to_string();
    anyhow::ensure!(!token.is_empty(), "An access token is required");

    let shutdown_token = shutdown::install_signal_handler()?;
    let fetcher = fetch::Fetcher::new(config.retry, config.timeout, shutdown_token.clone())?;
    let relay = sweep::DropboxRelay::new(
        fetcher,
        config.upload_url.clone(),
        &config.destination,
        token,
    );
    let notifier = systemd::SystemdNotifier::new(config.notify_systemd);

    let passes =
        sweep::run_sweeper(&relay, &config.sweep_options(), shutdown_token, &notifier).await;
    tracing::info!(passes, "Sweeper stopped");
    Ok(())
}

/// Run the status command.
async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let path = config::expand_tilde(&args.history_file);
    if !path.exists() {
        println!("No progress record found at {}", path.display());
        return Ok(());
    }

    let record = JsonProgressStore::new(&path).load().await?;
    let modified = std::fs::metadata(&path)
        .and_then(|m| m.modified())
        .map(DateTime::<Local>::from)
        .ok();

    println!("Progress record: {}", path.display());
    if let Some(modified) = modified {
        println!("Last updated:    {}", modified.format("%Y-%m-%d %H:%M:%S"));
    }
    println!();

    match args.id {
        Some(id) => {
            let id = config::extract_identifier(&id)?;
            let done = record.completed(&id);
            println!("{}: {} completed", id, done.len());
            for name in done {
                println!("  {}", name);
            }
        }
        None => {
            if record.is_empty() {
                println!("No items recorded.");
            }
            for (id, names) in record.entries() {
                println!("  {:<40} {:>6} completed", id, names.len());
            }
            println!();
            println!("Total: {} file(s)", record.total_completed());
        }
    }

    Ok(())
}

/// Run the reset command.
async fn run_reset(args: cli::ResetArgs) -> anyhow::Result<()> {
    let path = config::expand_tilde(&args.history_file);
    if !path.exists() {
        println!("No progress record found at {}", path.display());
        return Ok(());
    }

    let store = JsonProgressStore::new(&path);
    let _lock = store.lock().await?;
    let mut record = store.load().await?;

    let id = args.id.as_deref().map(config::extract_identifier).transpose()?;
    let target = match &id {
        Some(id) => {
            let count = record.completed(id).len();
            if count == 0 {
                println!("Nothing recorded for {}", id);
                return Ok(());
            }
            format!("{} recorded file(s) for {}", count, id)
        }
        None => format!(
            "all {} recorded file(s) across {} item(s)",
            record.total_completed(),
            record.entries().count()
        ),
    };

    if !args.yes {
        println!("This will forget {} in:", target);
        println!("  {}", store.path().display());
        println!();
        print!("Are you sure? [y/N] ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    match &id {
        Some(id) => {
            record.remove_entry(id);
        }
        None => record = state::ProgressRecord::new(),
    }
    store.save(&record).await?;
    println!("Forgot {}.", target);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.command {
        Command::Sync(args) => run_sync(args).await,
        Command::Sweep(args) => run_sweep(args).await,
        Command::Status(args) => run_status(args).await,
        Command::Reset(args) => run_reset(args).await,
    }
}
