//! Error types for the progress store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, saving or locking the progress record.
#[derive(Error, Debug)]
pub enum StateError {
    /// The record exists but could not be read.
    #[error("Failed to read progress record at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The record is not a JSON object of string lists. Never overwritten.
    #[error("Progress record at {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Writing or renaming the record failed.
    #[error("Failed to write progress record at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode progress record: {0}")]
    Encode(#[from] serde_json::Error),

    /// Another run holds the lock for this record.
    #[error("Another archive-relay run is using {path} (lock: {lock})")]
    Locked { path: PathBuf, lock: PathBuf },

    /// Failed to spawn a blocking task.
    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),
}
