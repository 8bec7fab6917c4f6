//! Catalog resolution: what an archive item holds and what is left to fetch.

pub mod types;

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

pub use types::{CatalogListing, FileEntry, ItemMetadata};

use crate::fetch::{FetchError, Fetcher};
use crate::paths;
use crate::state::ProgressRecord;

pub const DEFAULT_ROOT: &str = "https://archive.org";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Could not fetch metadata for {identifier}: {source}")]
    Fetch {
        identifier: String,
        source: FetchError,
    },

    #[error("Metadata for {identifier} is not a valid listing: {source}")]
    Parse {
        identifier: String,
        source: serde_json::Error,
    },
}

/// Remote archive reached through the retrying fetcher.
#[derive(Debug, Clone)]
pub struct Catalog {
    fetcher: Fetcher,
    root: String,
}

impl Catalog {
    pub fn new(fetcher: Fetcher, root: &str) -> Self {
        Self {
            fetcher,
            root: root.trim_end_matches('/').to_string(),
        }
    }

    /// `{root}/metadata/{identifier}`
    pub fn metadata_url(&self, identifier: &str) -> String {
        format!("{}/metadata/{}", self.root, identifier)
    }

    /// `{root}/download/{identifier}/{percent-encoded name}`
    ///
    /// Every byte outside the unreserved set is escaped, `/` included.
    pub fn download_url(&self, identifier: &str, filename: &str) -> String {
        format!(
            "{}/download/{}/{}",
            self.root,
            identifier,
            urlencoding::encode(filename)
        )
    }

    /// Fetch and parse the item's file listing.
    pub async fn resolve_listing(&self, identifier: &str) -> Result<CatalogListing, CatalogError> {
        tracing::info!("Fetching metadata for {}", identifier);
        let body = self
            .fetcher
            .get_bytes(&self.metadata_url(identifier))
            .await
            .map_err(|source| CatalogError::Fetch {
                identifier: identifier.to_string(),
                source,
            })?;
        let metadata: ItemMetadata =
            serde_json::from_slice(&body).map_err(|source| CatalogError::Parse {
                identifier: identifier.to_string(),
                source,
            })?;
        if metadata.files.is_empty() {
            tracing::warn!("Catalog lists no files for {} (unknown identifier?)", identifier);
        }
        Ok(CatalogListing::from_metadata(metadata))
    }

    /// Download one file of the item to `dest`, whole or not at all.
    pub async fn fetch_file(
        &self,
        identifier: &str,
        filename: &str,
        dest: &Path,
    ) -> Result<u64, FetchError> {
        self.fetcher
            .download_to(&self.download_url(identifier, filename), dest)
            .await
    }
}

/// Names in `listing` ending in `suffix` (ASCII case-insensitive) that are
/// not yet recorded as completed for `entry`.
///
/// Listing order is preserved; a name listed twice is returned once.
pub fn compute_pending(
    entry: &str,
    record: &ProgressRecord,
    listing: &CatalogListing,
    suffix: &str,
) -> Vec<String> {
    let done = record.completed_set(entry);
    let mut seen = HashSet::new();
    let pending: Vec<String> = listing
        .names()
        .filter(|name| paths::has_suffix_ignore_case(name, suffix))
        .filter(|name| !done.contains(name))
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect();
    tracing::info!(
        "{} pending, {} already done for {}",
        pending.len(),
        done.len(),
        entry
    );
    pending
}
