use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Pattern {pattern:?} did not match filename {filename:?}")]
    PatternMismatch { pattern: String, filename: String },

    #[error("PDF error processing {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("Output {path} already exists")]
    OutputExists { path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Transform task failed: {0}")]
    Spawn(#[from] tokio::task::JoinError),
}

impl TransformError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
