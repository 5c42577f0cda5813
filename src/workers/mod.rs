//! Archive creation pipeline.
//!
//! Walk the source tree in order, then read, fingerprint and intern every file
//! body on a `rayon` pool. Entries are collected back in walk order, so the
//! resulting index (and the archive bytes) do not depend on the thread count.
//! The finished container is written to a temporary file beside the
//! destination and renamed into place only once it is complete.

use std::io::BufWriter;
use std::path::Path;

use rayon::prelude::*;

use crate::archive::{write_container, Entry};
use crate::compress::{Codec, DEFAULT_LEVEL};
use crate::error::{ArchiverError, Result};
use crate::fsx::{FileSystem, LocalFs};
use crate::store::ContentStore;
use crate::walk::{TreeEntry, TreeEntryKind, TreeWalker};

/// Holds all configuration options for a create operation.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Zstandard level (1-22).
    pub level: i32,
    /// Worker threads for reading and compressing. 0 = one per CPU core.
    pub threads: usize,
}

impl Default for CreateOptions {
    fn default() -> Self {
        CreateOptions { level: DEFAULT_LEVEL, threads: 0 }
    }
}

/// What a create run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSummary {
    pub entries: usize,
    pub files: usize,
    pub directories: usize,
    pub unique_blocks: usize,
    /// Files whose content was already in the store.
    pub dedup_hits: usize,
    /// Sum of all file sizes, duplicates included.
    pub logical_bytes: u64,
    /// Sum of stored block payloads.
    pub stored_bytes: u64,
    /// Size of the finished archive file.
    pub archive_bytes: u64,
}

pub(crate) fn build_pool(threads: usize) -> Result<rayon::ThreadPool> {
    let threads = if threads == 0 { num_cpus::get() } else { threads };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| ArchiverError::io("<thread pool>", std::io::Error::new(std::io::ErrorKind::Other, e)))
}

/// Archives `source` (a directory or a single file) into `archive_path` on the local disk.
pub fn create_archive(archive_path: &Path, source: &Path, options: &CreateOptions) -> Result<CreateSummary> {
    create_archive_with(&LocalFs, archive_path, source, options)
}

/// [`create_archive`] over an arbitrary [`FileSystem`] for the source side.
pub fn create_archive_with<F: FileSystem>(
    fs: &F,
    archive_path: &Path,
    source: &Path,
    options: &CreateOptions,
) -> Result<CreateSummary> {
    let walker = TreeWalker::new(fs, source)?;
    let walked: Vec<TreeEntry> = walker.walk().collect::<Result<_>>()?;
    tracing::debug!("walked {} entries under {}", walked.len(), source.display());

    let store = ContentStore::new(Codec::new(options.level));
    let pool = build_pool(options.threads)?;
    let interned: Vec<(Entry, bool)> = pool.install(|| {
        walked
            .par_iter()
            .map(|node| match node.kind {
                TreeEntryKind::Directory => Ok((Entry::directory(node.path.clone()), false)),
                TreeEntryKind::File => {
                    let bytes = walker.read(node)?;
                    let outcome = store.intern(&bytes);
                    tracing::debug!(
                        "{} {} ({} bytes)",
                        if outcome.dedup_hit { "dedup" } else { "store" },
                        node.path,
                        bytes.len()
                    );
                    Ok((Entry::file(node.path.clone(), bytes.len() as u64, outcome.fingerprint), outcome.dedup_hit))
                }
            })
            .collect::<Result<_>>()
    })?;

    let mut summary = CreateSummary { entries: interned.len(), ..CreateSummary::default() };
    let mut entries = Vec::with_capacity(interned.len());
    for (entry, dedup_hit) in interned {
        if entry.is_dir() {
            summary.directories += 1;
        } else {
            summary.files += 1;
            summary.logical_bytes += entry.size();
        }
        // Concurrent interns may report the first copy as the hit; only the total matters.
        summary.dedup_hits += usize::from(dedup_hit);
        entries.push(entry);
    }
    summary.unique_blocks = store.len();
    summary.stored_bytes = store.stored_bytes();

    summary.archive_bytes = persist_container(archive_path, &entries, &store)?;
    tracing::info!(
        "created {}: {} files, {} dirs, {} unique blocks ({} dedup hits), {} -> {} bytes",
        archive_path.display(),
        summary.files,
        summary.directories,
        summary.unique_blocks,
        summary.dedup_hits,
        summary.logical_bytes,
        summary.archive_bytes
    );
    Ok(summary)
}

/// Writes the container into a temp file in the destination directory, then renames it over `archive_path`.
fn persist_container(archive_path: &Path, entries: &[Entry], store: &ContentStore) -> Result<u64> {
    let parent = match archive_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".mtar-")
        .suffix(".partial")
        .tempfile_in(parent)
        .map_err(|e| ArchiverError::write(archive_path, e))?;

    let stats = write_container(BufWriter::new(temp.as_file()), entries, store, archive_path)?;
    temp.as_file().sync_all().map_err(|e| ArchiverError::write(archive_path, e))?;
    temp.persist(archive_path).map_err(|e| ArchiverError::write(archive_path, e.error))?;
    Ok(stats.bytes_written)
}
