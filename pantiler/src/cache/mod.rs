//! File-existence cache for fetched, extracted and converted artifacts.
//!
//! Every artifact lives at a deterministic path inside the cache directory:
//!
//! ```text
//! {cache}/{source}[-{sibling}].{ext}
//! ```
//!
//! The path itself is the cache key and the presence of a file at that path
//! is the only validity signal. Nothing is hashed and nothing is ever
//! invalidated automatically; the whole directory is either kept or removed.
//!
//! The `-{sibling}` suffix is only appended when the sibling list (inputs,
//! archive entries, outputs) has more than one entry. Each stage applies the
//! rule independently, so a source with several inputs and several outputs
//! yields a cross-product of cache files.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{PantilerError, Result};

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".pantiler-cache";

/// Suffix for files that are still being written.
const PARTIAL_SUFFIX: &str = "part";

/// Render the `-{name}` suffix used to disambiguate siblings.
///
/// # Examples
///
/// ```
/// use pantiler::cache::specifier;
///
/// assert_eq!(specifier("north", 1), "");
/// assert_eq!(specifier("north", 3), "-north");
/// ```
pub fn specifier(name: &str, siblings: usize) -> String {
    if siblings > 1 {
        format!("-{}", name)
    } else {
        String::new()
    }
}

/// Whether a stage reused an artifact or produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Produced,
}

impl CacheStatus {
    pub fn is_hit(self) -> bool {
        self == CacheStatus::Hit
    }
}

/// Hit/produced counts for one stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheTally {
    pub hits: usize,
    pub produced: usize,
}

impl CacheTally {
    pub fn record(&mut self, status: CacheStatus) {
        match status {
            CacheStatus::Hit => self.hits += 1,
            CacheStatus::Produced => self.produced += 1,
        }
    }

    pub fn add(&mut self, other: CacheTally) {
        self.hits += other.hits;
        self.produced += other.produced;
    }

    pub fn total(&self) -> usize {
        self.hits + self.produced
    }
}

impl FromIterator<CacheStatus> for CacheTally {
    fn from_iter<I: IntoIterator<Item = CacheStatus>>(iter: I) -> Self {
        let mut tally = Self::default();
        for status in iter {
            tally.record(status);
        }
        tally
    }
}

/// Maps (stage, source, variant) keys onto cache file paths.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for `{source}[-{variant}].{ext}`.
    pub fn path(&self, source: &str, variant: Option<&str>, ext: &str) -> PathBuf {
        let variant = variant.map(|v| format!("-{}", v)).unwrap_or_default();
        self.root.join(format!("{}{}.{}", source, variant, ext))
    }

    /// Path for one of `siblings` entries named `name`, applying the
    /// single/multiple disambiguation rule.
    pub fn entry(&self, source: &str, name: &str, siblings: usize, ext: &str) -> PathBuf {
        let suffix = specifier(name, siblings);
        self.root.join(format!("{}{}.{}", source, suffix, ext))
    }

    /// Whether a cache entry is present.
    ///
    /// A symlink counts as present even when its target has gone away.
    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::symlink_metadata(path).await.is_ok()
    }

    /// Create the cache directory if it doesn't exist yet.
    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PantilerError::CreateDirFailed {
                path: self.root.clone(),
                source: e,
            })
    }

    /// Remove the whole cache directory.
    pub async fn clear(&self) -> Result<()> {
        info!(path = %self.root.display(), "Removing cache directory");
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PantilerError::WriteFailed {
                path: self.root.clone(),
                source: e,
            }),
        }
    }
}

/// File name of a cache entry, for progress messages.
pub fn label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Sibling path a cache entry is written to before it becomes visible.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Move a fully written partial file onto its cache path.
pub async fn commit(partial: &Path, path: &Path) -> Result<()> {
    tokio::fs::rename(partial, path)
        .await
        .map_err(|e| PantilerError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!(path = %path.display(), "Cache entry committed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_without_variant() {
        let store = CacheStore::new("/c");
        assert_eq!(
            store.path("rivers", None, "zip"),
            PathBuf::from("/c/rivers.zip")
        );
        assert_eq!(
            store.path("rivers", Some("north"), "geo.json"),
            PathBuf::from("/c/rivers-north.geo.json")
        );
    }

    #[test]
    fn test_entry_applies_disambiguation_rule() {
        let store = CacheStore::new("/c");
        assert_eq!(
            store.entry("rivers", "north", 1, "zip"),
            PathBuf::from("/c/rivers.zip")
        );
        assert_eq!(
            store.entry("rivers", "north", 2, "zip"),
            PathBuf::from("/c/rivers-north.zip")
        );
    }

    #[test]
    fn test_entries_are_distinct_for_unique_names() {
        let store = CacheStore::new("/c");
        let a = store.entry("s", "a", 2, "shp");
        let b = store.entry("s", "b", 2, "shp");
        assert_ne!(a, b);
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/c/rivers.zip")),
            PathBuf::from("/c/rivers.zip.part")
        );
    }

    #[test]
    fn test_tally_counts_statuses() {
        let mut tally: CacheTally = [CacheStatus::Hit, CacheStatus::Produced, CacheStatus::Hit]
            .into_iter()
            .collect();
        assert_eq!(tally, CacheTally { hits: 2, produced: 1 });

        tally.add(CacheTally { hits: 0, produced: 4 });
        assert_eq!(tally.total(), 7);
    }

    #[test]
    fn test_label_is_file_name() {
        assert_eq!(label(Path::new("/c/rivers-north.zip")), "rivers-north.zip");
    }

    #[tokio::test]
    async fn test_exists_and_clear() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("cache"));
        store.ensure().await.unwrap();
        store.ensure().await.unwrap();

        let file = store.path("a", None, "txt");
        assert!(!store.exists(&file).await);
        std::fs::write(&file, b"x").unwrap();
        assert!(store.exists(&file).await);

        store.clear().await.unwrap();
        assert!(!store.root().exists());
        // Clearing a missing cache is not an error
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_moves_partial_into_place() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let file = store.path("a", None, "json");
        let partial = partial_path(&file);
        std::fs::write(&partial, b"{}").unwrap();

        commit(&partial, &file).await.unwrap();

        assert!(file.exists());
        assert!(!partial.exists());
    }
}
