use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "archive-relay",
    version,
    about = "Mirror an archive item's documents locally, tag them, and relay them to cloud storage"
)]
pub struct Cli {
    /// Log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch, tag and record every file of an item not yet processed
    Sync(SyncArgs),
    /// Periodically upload finished files and delete them locally
    Sweep(SweepArgs),
    /// Show what the progress record holds
    Status(StatusArgs),
    /// Forget recorded progress so files are processed again
    Reset(ResetArgs),
}

/// Retry and timeout knobs shared by every network-facing command.
#[derive(Args, Debug, Clone)]
pub struct NetworkArgs {
    /// Total attempts per request (at least 1)
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Base delay in seconds between attempts, doubled after each failure
    #[arg(long, default_value_t = 1)]
    pub retry_delay: u64,

    /// Per-attempt request timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Archive item identifier, or any URL of the item
    #[arg(long = "id")]
    pub id: String,

    /// Series name written into each document (default: the item's title)
    #[arg(long)]
    pub series: Option<String>,

    /// Regex whose capture groups form the issue label, e.g. 'Byte_(\d{4})_(\d{2})'.
    /// Without it, files are moved to the upload directory unchanged.
    #[arg(long)]
    pub pattern: Option<String>,

    /// Joins the pattern's capture groups
    #[arg(long, default_value = "-")]
    pub separator: String,

    /// Only files ending in this suffix are processed (case-insensitive)
    #[arg(long, default_value = ".pdf")]
    pub suffix: String,

    /// Where raw downloads are staged
    #[arg(long, default_value = "Downloads")]
    pub download_dir: String,

    /// Where finished files are written
    #[arg(long, default_value = "Uploads")]
    pub upload_dir: String,

    /// Progress record file
    #[arg(long, default_value = "history.json")]
    pub history_file: String,

    /// Archive base URL
    #[arg(long, default_value = crate::catalog::DEFAULT_ROOT)]
    pub archive_root: String,

    /// List pending files without downloading or writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,

    #[command(flatten)]
    pub network: NetworkArgs,
}

#[derive(Args)]
pub struct SweepArgs {
    /// Directory to upload from
    #[arg(long)]
    pub dir: String,

    /// Remote folder, e.g. /Magazines
    #[arg(long)]
    pub destination: String,

    /// Only files ending in this suffix are uploaded (case-insensitive)
    #[arg(long, default_value = ".pdf")]
    pub suffix: String,

    /// Access token (if not provided, will prompt).
    /// WARNING: passing via --token is visible in process listings.
    /// Prefer the DROPBOX_ACCESS_TOKEN environment variable instead.
    #[arg(long, env = "DROPBOX_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Seconds between passes
    #[arg(long, default_value_t = 3600)]
    pub interval: u64,

    /// Stop after this many passes
    #[arg(long)]
    pub max_passes: Option<u64>,

    /// Upload endpoint
    #[arg(long, default_value = crate::sweep::relay::DEFAULT_UPLOAD_URL)]
    pub upload_url: String,

    /// Send readiness/status/watchdog notifications to systemd
    #[arg(long)]
    pub notify_systemd: bool,

    #[command(flatten)]
    pub network: NetworkArgs,
}

impl std::fmt::Debug for SweepArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepArgs")
            .field("dir", &self.dir)
            .field("destination", &self.destination)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Progress record file
    #[arg(long, default_value = "history.json")]
    pub history_file: String,

    /// Show only this item, listing its completed files
    #[arg(long = "id")]
    pub id: Option<String>,
}

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Progress record file
    #[arg(long, default_value = "history.json")]
    pub history_file: String,

    /// Forget only this item (default: everything)
    #[arg(long = "id")]
    pub id: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}
