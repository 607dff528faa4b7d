//! Extract stage: expand archive inputs into the file conversion reads.
//!
//! Non-archive inputs pass through unchanged. A zip archive is opened for
//! random access and every entry that is neither a directory nor
//! documentation is extracted, concurrently, to
//! `{cache}/{source}[-{input}].{entry extension}`. Entries whose cache file
//! already exists are not extracted again. Entries sharing an extension share
//! that file, so only the last of them in the archive is kept.
//!
//! An archive usually holds several files belonging to one dataset (a
//! shapefile's `.shp`, `.shx`, `.dbf`, `.prj`). The file handed on to
//! conversion is chosen by [`select_main_file`]: the only file if there is
//! just one, otherwise the shapefile. Anything else is ambiguous and fails.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use tracing::{debug, info, instrument};
use zip::ZipArchive;

use crate::cache::{commit, label, partial_path, CacheStatus, CacheStore, CacheTally};
use crate::error::{PantilerError, Result};
use crate::fetch::{FetchedInput, UNKNOWN_EXTENSION};
use crate::progress::{ProgressEvent, ProgressReporter, CACHED, DONE, IN_PROGRESS};

/// Extension identifying an archive input.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Archive entries with these extensions are never extracted.
pub const IGNORED_EXTENSIONS: &[&str] = &["pdf", "txt"];

/// Extension preferred when an archive yields several files.
pub const PRIMARY_EXTENSION: &str = "shp";

/// An input ready for conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub name: String,
    pub path: PathBuf,
    pub extension: String,
}

impl From<FetchedInput> for ResolvedInput {
    fn from(fetched: FetchedInput) -> Self {
        Self {
            name: fetched.name,
            path: fetched.path,
            extension: fetched.extension,
        }
    }
}

/// Pick the file conversion should read out of an archive's extracted files.
///
/// The choice does not depend on the order of `files`.
pub fn select_main_file(files: &[ResolvedInput]) -> Option<&ResolvedInput> {
    match files {
        [only] => Some(only),
        _ => files
            .iter()
            .find(|f| f.extension.eq_ignore_ascii_case(PRIMARY_EXTENSION)),
    }
}

fn is_archive(extension: &str) -> bool {
    extension.eq_ignore_ascii_case(ARCHIVE_EXTENSION)
}

fn is_ignored(extension: &str) -> bool {
    IGNORED_EXTENSIONS
        .iter()
        .any(|ignored| extension.eq_ignore_ascii_case(ignored))
}

/// A file entry inside an archive.
#[derive(Debug, Clone)]
struct ArchiveEntry {
    index: usize,
    name: String,
    extension: String,
}

/// Keep one entry per extension, the last in archive order.
fn distinct_targets(entries: Vec<ArchiveEntry>) -> Vec<ArchiveEntry> {
    let mut kept: Vec<ArchiveEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match kept.iter_mut().find(|k| k.extension == entry.extension) {
            Some(previous) => {
                debug!(skipped = %previous.name, kept = %entry.name, "Archive entries share a cache file");
                *previous = entry;
            }
            None => kept.push(entry),
        }
    }
    kept
}

/// Expands archives among a source's fetched inputs.
pub struct ExtractStage<'a> {
    cache: &'a CacheStore,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> ExtractStage<'a> {
    pub fn new(cache: &'a CacheStore, reporter: &'a dyn ProgressReporter) -> Self {
        Self { cache, reporter }
    }

    /// Resolve every fetched input of `source` to the file conversion reads.
    ///
    /// Returns the resolved inputs in declaration order, plus cache counts
    /// for the archive entries.
    #[instrument(skip_all, fields(source = source))]
    pub async fn run(
        &self,
        source: &str,
        fetched: Vec<FetchedInput>,
    ) -> Result<(Vec<ResolvedInput>, CacheTally)> {
        let siblings = fetched.len();
        let results = try_join_all(
            fetched
                .into_iter()
                .map(|input| self.resolve(source, input, siblings)),
        )
        .await?;

        let mut tally = CacheTally::default();
        let mut resolved = Vec::with_capacity(results.len());
        for (input, entries) in results {
            tally.add(entries);
            resolved.push(input);
        }
        Ok((resolved, tally))
    }

    async fn resolve(
        &self,
        source: &str,
        input: FetchedInput,
        siblings: usize,
    ) -> Result<(ResolvedInput, CacheTally)> {
        if !is_archive(&input.extension) {
            return Ok((input.into(), CacheTally::default()));
        }

        let archive = input.path.clone();
        let entries = distinct_targets(list_entries(archive.clone()).await?);
        debug!(archive = %archive.display(), entries = entries.len(), "Listed archive");

        let extracted = try_join_all(
            entries
                .into_iter()
                .map(|entry| self.extract_entry(source, &input.name, siblings, &archive, entry)),
        )
        .await?;

        let tally: CacheTally = extracted.iter().map(|(_, status)| *status).collect();
        let files: Vec<ResolvedInput> = extracted.into_iter().map(|(file, _)| file).collect();

        let main = select_main_file(&files)
            .cloned()
            .ok_or_else(|| PantilerError::AmbiguousArchive {
                source_name: source.to_string(),
                archive: input.name.clone(),
            })?;
        info!(input = %input.name, main = %main.path.display(), "Selected main file");
        Ok((main, tally))
    }

    async fn extract_entry(
        &self,
        source: &str,
        input: &str,
        siblings: usize,
        archive: &Path,
        entry: ArchiveEntry,
    ) -> Result<(ResolvedInput, CacheStatus)> {
        let path = self.cache.entry(source, input, siblings, &entry.extension);
        let event = ProgressEvent::process("extracting")
            .with_input(format!("{}/{}", source, input))
            .with_output(label(&path));

        let status = if self.cache.exists(&path).await {
            self.reporter.report(event.with_message(CACHED));
            CacheStatus::Hit
        } else {
            self.reporter.report(event.clone().with_message(IN_PROGRESS));
            let partial = partial_path(&path);
            let from = archive.to_path_buf();
            let to = partial.clone();
            let index = entry.index;
            tokio::task::spawn_blocking(move || unpack(&from, index, &to)).await??;
            commit(&partial, &path).await?;
            self.reporter.report(event.with_message(DONE));
            CacheStatus::Produced
        };

        Ok((
            ResolvedInput {
                name: input.to_string(),
                path,
                extension: entry.extension,
            },
            status,
        ))
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).map_err(|e| PantilerError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    ZipArchive::new(file).map_err(|e| PantilerError::ExtractionFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// List the extractable file entries of an archive.
async fn list_entries(archive: PathBuf) -> Result<Vec<ArchiveEntry>> {
    tokio::task::spawn_blocking(move || {
        let mut zip = open_archive(&archive)?;
        let mut entries = Vec::new();
        for index in 0..zip.len() {
            let file = zip
                .by_index(index)
                .map_err(|e| PantilerError::ExtractionFailed {
                    path: archive.clone(),
                    reason: e.to_string(),
                })?;
            if file.is_dir() {
                continue;
            }
            let extension = Path::new(file.name())
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or(UNKNOWN_EXTENSION)
                .to_string();
            if is_ignored(&extension) {
                debug!(entry = file.name(), "Skipping ignorable entry");
                continue;
            }
            entries.push(ArchiveEntry {
                index,
                name: file.name().to_string(),
                extension,
            });
        }
        Ok(entries)
    })
    .await?
}

/// Copy one archive entry into `dest`, synced to disk.
fn unpack(archive: &Path, index: usize, dest: &Path) -> Result<()> {
    let mut zip = open_archive(archive)?;
    let mut entry = zip
        .by_index(index)
        .map_err(|e| PantilerError::ExtractionFailed {
            path: archive.to_path_buf(),
            reason: e.to_string(),
        })?;

    let write_failed = |e| PantilerError::WriteFailed {
        path: dest.to_path_buf(),
        source: e,
    };
    let mut out = File::create(dest).map_err(write_failed)?;
    io::copy(&mut entry, &mut out).map_err(|e| PantilerError::ExtractionFailed {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })?;
    out.sync_all().map_err(write_failed)?;
    Ok(())
}
