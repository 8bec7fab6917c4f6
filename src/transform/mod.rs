//! Post-download step: turn a staged download into an output artifact.
//!
//! Success means the artifact exists in the output directory; only then may
//! the pipeline record the file as done. On failure the staged download is
//! left where it is.

pub mod error;
pub mod pattern;
pub mod pdf;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

pub use error::TransformError;
pub use pattern::IssuePattern;
pub use pdf::PdfTagger;

use crate::paths;

/// One staged download handed to a transform.
#[derive(Debug, Clone, Copy)]
pub struct TransformJob<'a> {
    /// Name as listed by the catalog.
    pub filename: &'a str,
    /// Where the download was staged.
    pub staged: &'a Path,
    /// Tag value (series name) for the run.
    pub series: &'a str,
}

#[async_trait]
pub trait Transform: Send + Sync {
    /// Produce the output artifact for `job`, returning its path.
    async fn apply(&self, job: &TransformJob<'_>) -> Result<PathBuf, TransformError>;
}

/// Moves the staged download into the output directory unchanged.
#[derive(Debug, Clone)]
pub struct Relocator {
    output_dir: PathBuf,
}

impl Relocator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl Transform for Relocator {
    async fn apply(&self, job: &TransformJob<'_>) -> Result<PathBuf, TransformError> {
        let dest = self.output_dir.join(paths::clean_filename(job.filename));
        ensure_vacant(&dest).await?;
        move_file(job.staged, &dest).await?;
        tracing::info!("Saved {}", dest.display());
        Ok(dest)
    }
}

/// Refuse to write over an existing output. Distinct catalog names can
/// clean to the same output name (`a:b.pdf`, `ab.pdf`); the later one fails
/// and stays pending instead of replacing the earlier one's artifact.
pub(crate) async fn ensure_vacant(dest: &Path) -> Result<(), TransformError> {
    match fs::try_exists(dest).await {
        Ok(false) => Ok(()),
        Ok(true) => Err(TransformError::OutputExists {
            path: dest.to_path_buf(),
        }),
        Err(e) => Err(TransformError::io(dest, e)),
    }
}

/// Rename `src` to `dest`, falling back to copy-and-delete across
/// filesystems. The copy goes through a `.part` name first so a sweeper
/// watching `dest`'s directory never sees a half-written file.
pub(crate) async fn move_file(src: &Path, dest: &Path) -> Result<(), TransformError> {
    if fs::rename(src, dest).await.is_ok() {
        return Ok(());
    }
    let part = paths::part_path(dest);
    fs::copy(src, &part)
        .await
        .map_err(|e| TransformError::io(src, e))?;
    fs::rename(&part, dest)
        .await
        .map_err(|e| TransformError::io(dest, e))?;
    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!("Could not remove staged file {}: {}", src.display(), e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_relocator_moves_file_unchanged() {
        let stage = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let staged = stage.path().join("a.PDF");
        std::fs::write(&staged, b"raw bytes").unwrap();

        let relocator = Relocator::new(out.path());
        let dest = relocator
            .apply(&TransformJob {
                filename: "a.PDF",
                staged: &staged,
                series: "ignored",
            })
            .await
            .unwrap();

        assert_eq!(dest, out.path().join("a.PDF"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"raw bytes");
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_relocator_refuses_to_overwrite_colliding_name() {
        let stage = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(out.path().join("ab.pdf"), b"first").unwrap();
        let staged = stage.path().join("ab.pdf");
        std::fs::write(&staged, b"second").unwrap();

        let result = Relocator::new(out.path())
            .apply(&TransformJob {
                filename: "a:b.pdf",
                staged: &staged,
                series: "s",
            })
            .await;

        assert!(matches!(result, Err(TransformError::OutputExists { .. })));
        assert_eq!(std::fs::read(out.path().join("ab.pdf")).unwrap(), b"first");
        assert!(staged.exists());
    }

    #[tokio::test]
    async fn test_relocator_missing_source_fails() {
        let stage = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let staged = stage.path().join("gone.pdf");

        let result = Relocator::new(out.path())
            .apply(&TransformJob {
                filename: "gone.pdf",
                staged: &staged,
                series: "s",
            })
            .await;
        assert!(matches!(result, Err(TransformError::Io { .. })));
        assert!(!out.path().join("gone.pdf").exists());
    }
}
