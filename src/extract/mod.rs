//! # Extraction Module
//!
//! Reading side of the archive engine: listing the index, restoring a tree,
//! and verifying every stored block.
//!
//! Extraction runs in two phases. Phase one walks the index in stored order
//! and creates every directory (and any missing parent of a file) one at a
//! time. Phase two writes file bodies in parallel; by then every directory
//! a file can land in already exists.

mod writer_pool;

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use crate::archive::{read_archive, read_index, ArchivePath, Entry, EntryKind};
use crate::error::{ArchiverError, Result};
use crate::fsx::{FileSystem, LocalFs};
use crate::hash::Fingerprint;
use crate::workers::build_pool;
use writer_pool::{flush_files, WriteJob};

/// Holds all configuration options for an extract operation.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Worker threads for writing files. 0 = one per CPU core.
    pub threads: usize,
}

/// What an extract run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub directories: usize,
    pub files: usize,
    pub bytes_written: u64,
}

/// Returns the archive's entries in stored order without touching any block.
pub fn list_archive(archive_path: &Path) -> Result<Vec<Entry>> {
    read_index(archive_path)
}

/// Flat, serializable view of an entry for `list --json`.
#[derive(Debug, Clone, Serialize)]
pub struct ListedEntry {
    pub path: ArchivePath,
    pub kind: &'static str,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

impl From<&Entry> for ListedEntry {
    fn from(entry: &Entry) -> Self {
        ListedEntry {
            path: entry.path.clone(),
            kind: if entry.is_dir() { "directory" } else { "file" },
            size: entry.size(),
            fingerprint: entry.content_ref(),
        }
    }
}

/// Restores the archive under `output_dir` on the local disk, creating it if absent.
pub fn extract_archive(archive_path: &Path, output_dir: &Path, options: &ExtractOptions) -> Result<ExtractSummary> {
    extract_archive_with(&LocalFs, archive_path, output_dir, options)
}

/// [`extract_archive`] over an arbitrary [`FileSystem`] for the destination side.
///
/// Existing files at colliding paths are overwritten. A file whose path is an
/// existing directory fails with `DestinationWrite`.
pub fn extract_archive_with<F: FileSystem>(
    fs: &F,
    archive_path: &Path,
    output_dir: &Path,
    options: &ExtractOptions,
) -> Result<ExtractSummary> {
    let archive = read_archive(archive_path)?;
    fs.create_dir_all(output_dir).map_err(|e| ArchiverError::write(output_dir, e))?;

    let mut summary = ExtractSummary::default();
    let mut created: HashSet<ArchivePath> = HashSet::new();
    let mut jobs = Vec::new();

    for entry in archive.entries() {
        let target = entry.path.to_native(output_dir)?;
        match entry.kind {
            EntryKind::Directory => {
                fs.create_dir_all(&target).map_err(|e| ArchiverError::write(&target, e))?;
                created.insert(entry.path.clone());
                summary.directories += 1;
                tracing::debug!("created directory {}", entry.path);
            }
            EntryKind::File { content, .. } => {
                if let Some(parent) = entry.path.parent() {
                    if !created.contains(&parent) {
                        let dir = parent.to_native(output_dir)?;
                        fs.create_dir_all(&dir).map_err(|e| ArchiverError::write(&dir, e))?;
                        created.insert(parent);
                    }
                }
                jobs.push(WriteJob { target, content });
            }
        }
    }

    let pool = build_pool(options.threads)?;
    summary.bytes_written = pool.install(|| flush_files(fs, archive.store(), &jobs))?;
    summary.files = jobs.len();

    tracing::info!(
        "extracted {} into {}: {} files, {} dirs, {} bytes",
        archive_path.display(),
        output_dir.display(),
        summary.files,
        summary.directories,
        summary.bytes_written
    );
    Ok(summary)
}

/// Outcome of [`verify_archive`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub entries: usize,
    pub blocks: usize,
    pub original_bytes: u64,
}

/// Parses the whole archive, decodes every block and re-hashes it.
///
/// Any block whose bytes do not hash to its recorded fingerprint, or whose
/// size disagrees with an entry pointing at it, is `MalformedContainer`.
pub fn verify_archive(archive_path: &Path) -> Result<VerifyReport> {
    let archive = read_archive(archive_path)?;
    let store = archive.store();
    let mut report = VerifyReport { entries: archive.entries().len(), ..VerifyReport::default() };

    for fingerprint in store.fingerprints() {
        let bytes = store.resolve(&fingerprint)?;
        let actual = Fingerprint::of(&bytes);
        if actual != fingerprint {
            return Err(ArchiverError::malformed(format!(
                "block {} decodes to content with fingerprint {}",
                fingerprint, actual
            )));
        }
        report.blocks += 1;
        report.original_bytes += bytes.len() as u64;
    }

    tracing::info!("verified {}: {} entries, {} blocks", archive_path.display(), report.entries, report.blocks);
    Ok(report)
}
