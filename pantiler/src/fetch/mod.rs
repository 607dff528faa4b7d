//! Fetch stage: resolve every declared input to a local cache file.
//!
//! Each input of a source is fetched concurrently:
//!
//! - cache file present → reported as cached and reused as-is
//! - `path` declared → symlinked into the cache from its canonical location
//! - `url` declared → streamed into the cache by [`HttpDownloader`]
//!
//! Inputs naming neither location are rejected before anything touches the
//! network or the filesystem.

mod http;

pub use http::HttpDownloader;

use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use tracing::{debug, info, instrument};

use crate::cache::{label, CacheStatus, CacheStore};
use crate::error::{PantilerError, Result};
use crate::progress::{ProgressEvent, ProgressReporter, CACHED, DONE, IN_PROGRESS};
use crate::spec::{AssetInput, Location};

/// Extension used when an input gives no hint of its format.
pub const UNKNOWN_EXTENSION: &str = "bin";

/// A declared input resolved to a file in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedInput {
    /// Name of the input within its source.
    pub name: String,
    /// Cache file holding the input.
    pub path: PathBuf,
    /// Extension the input was stored under.
    pub extension: String,
    pub status: CacheStatus,
}

/// Resolves inputs into the cache.
pub struct FetchStage<'a> {
    cache: &'a CacheStore,
    http: &'a HttpDownloader,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> FetchStage<'a> {
    pub fn new(
        cache: &'a CacheStore,
        http: &'a HttpDownloader,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            cache,
            http,
            reporter,
        }
    }

    /// Fetch all `inputs` of `source` concurrently.
    ///
    /// Results are returned in declaration order.
    #[instrument(skip_all, fields(source = source))]
    pub async fn run(&self, source: &str, inputs: &[AssetInput]) -> Result<Vec<FetchedInput>> {
        let located = inputs
            .iter()
            .map(|input| {
                input
                    .location()
                    .map(|location| (input, location))
                    .ok_or_else(|| PantilerError::MissingLocation {
                        source_name: source.to_string(),
                        input: input.name.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let siblings = inputs.len();
        try_join_all(
            located
                .into_iter()
                .map(|(input, location)| self.fetch_one(source, input, location, siblings)),
        )
        .await
    }

    async fn fetch_one(
        &self,
        source: &str,
        input: &AssetInput,
        location: Location<'_>,
        siblings: usize,
    ) -> Result<FetchedInput> {
        let extension = input
            .extension()
            .unwrap_or_else(|| UNKNOWN_EXTENSION.to_string());
        let path = self.cache.entry(source, &input.name, siblings, &extension);
        let event = ProgressEvent::process("fetching")
            .with_input(format!("{}/{}", source, input.name))
            .with_output(label(&path));

        let status = if self.cache.exists(&path).await {
            debug!(input = %input.name, path = %path.display(), "Cache hit");
            self.reporter.report(event.with_message(CACHED));
            CacheStatus::Hit
        } else {
            self.reporter.report(event.clone().with_message(IN_PROGRESS));
            match location {
                Location::Path(local) => link(local, &path).await?,
                Location::Url(url) => {
                    let bytes = self.http.download(url, &path).await?;
                    info!(input = %input.name, url, bytes, "Downloaded input");
                }
            }
            self.reporter.report(event.with_message(DONE));
            CacheStatus::Produced
        };

        Ok(FetchedInput {
            name: input.name.clone(),
            path,
            extension,
            status,
        })
    }
}

/// Read an asset (font or sprite image) fully into memory.
///
/// Assets are not cached; they are read from `path` or downloaded from
/// `url` on every run. `group` names the declaring list in errors.
pub async fn load_asset(http: &HttpDownloader, group: &str, input: &AssetInput) -> Result<Vec<u8>> {
    match input.location() {
        Some(Location::Path(path)) => {
            tokio::fs::read(path)
                .await
                .map_err(|e| PantilerError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                })
        }
        Some(Location::Url(url)) => http.fetch_bytes(url).await,
        None => Err(PantilerError::MissingLocation {
            source_name: group.to_string(),
            input: input.name.clone(),
        }),
    }
}

/// Symlink a local input into the cache, pointing at its canonical path.
async fn link(local: &Path, dest: &Path) -> Result<()> {
    let target = tokio::fs::canonicalize(local)
        .await
        .map_err(|e| PantilerError::ReadFailed {
            path: local.to_path_buf(),
            source: e,
        })?;
    symlink(&target, dest)
        .await
        .map_err(|e| PantilerError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;
    debug!(target = %target.display(), link = %dest.display(), "Linked local input");
    Ok(())
}

#[cfg(unix)]
async fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_file(target, link).await
}
