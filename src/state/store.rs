//! Progress store trait and JSON file implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::error::StateError;
use super::types::ProgressRecord;

/// Load/save interface the pipeline depends on.
///
/// Object-safe so the pipeline can take `&dyn ProgressStore`.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Read the record. A store that has never been saved yields an empty
    /// record, not an error.
    async fn load(&self) -> Result<ProgressRecord, StateError>;

    /// Replace the durable record with `record`.
    async fn save(&self, record: &ProgressRecord) -> Result<(), StateError>;
}

/// Progress record kept as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonProgressStore {
    path: PathBuf,
}

impl JsonProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(extension);
        self.path.with_file_name(name)
    }

    /// Take the exclusive advisory lock that keeps two runs from writing the
    /// same record. Held until the returned guard is dropped.
    pub async fn lock(&self) -> Result<ProgressLock, StateError> {
        let path = self.path.clone();
        let lock_path = self.sibling(".lock");
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| StateError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let file = std::fs::File::create(&lock_path).map_err(|source| StateError::Write {
                path: lock_path.clone(),
                source,
            })?;
            file.try_lock_exclusive().map_err(|_| StateError::Locked {
                path,
                lock: lock_path.clone(),
            })?;
            Ok(ProgressLock {
                _file: file,
                path: lock_path,
            })
        })
        .await?
    }
}

#[async_trait]
impl ProgressStore for JsonProgressStore {
    async fn load(&self) -> Result<ProgressRecord, StateError> {
        let contents = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No progress record at {}, starting empty", self.path.display());
                return Ok(ProgressRecord::new());
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        tracing::debug!("Loading progress record from {}", self.path.display());
        serde_json::from_slice(&contents).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Write to a sibling temp file, sync it, then rename over the record so
    /// readers see either the old or the new contents, never a torn write.
    async fn save(&self, record: &ProgressRecord) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(record)?;
        let tmp = self.sibling(".tmp");
        let write_err = |source| StateError::Write {
            path: tmp.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut file = fs::File::create(&tmp).await.map_err(write_err)?;
        file.write_all(&json).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| StateError::Write {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!("Saved progress record to {}", self.path.display());
        Ok(())
    }
}

/// Guard for the record's advisory lock; released on drop.
#[derive(Debug)]
pub struct ProgressLock {
    _file: std::fs::File,
    path: PathBuf,
}

impl ProgressLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}
