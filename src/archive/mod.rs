//! # Container Format
//!
//! This module defines the in-memory archive model and the `.mtar` container
//! layout. All integers are little-endian.
//!
//! ```text
//! header   MAGIC (8) | version u16 | flags u16
//! -- one zstd frame, content checksum on, from here to the end --
//! index    entry_count u64 | entries...
//!          entry = path_len u32 | path bytes | kind u8
//!                  [file only: size u64 | fingerprint 16]
//!          index_crc u32  (CRC-32 over entry_count and entries)
//! blocks   block_count u64 | blocks...
//!          block = fingerprint 16 | encoding u8 | original_len u64
//!                  | stored_len u64 | payload
//! trailer  MAGIC (8)
//! ```
//!
//! The index comes first so `list` can stop decoding before any block.
//! Compressing the sections together lets per-entry overhead (paths,
//! fingerprints that appear in both index and block records) shrink with the
//! rest of the archive.

mod reader;
mod writer;

pub use reader::{read_archive, read_index, ContainerReader};
pub use writer::{write_container, ContainerStats};

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ArchiverError, Result};
use crate::hash::Fingerprint;
use crate::store::ContentStore;

pub const MAGIC_BYTES: &[u8; 8] = b"MTARv1\r\n";
pub const FORMAT_VERSION: u16 = 1;
/// Bytes before the compressed frame starts.
pub const HEADER_LEN: usize = MAGIC_BYTES.len() + 4;

pub(crate) const KIND_DIRECTORY: u8 = 0;
pub(crate) const KIND_FILE: u8 = 1;

/// A validated, `/`-separated path relative to the archive root.
///
/// Stored as raw bytes so that any filename the platform hands us, UTF-8 or
/// not, is reproduced exactly on extraction.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchivePath(Vec<u8>);

impl ArchivePath {
    /// Validates raw bytes read from an index.
    ///
    /// Rejects empty and absolute paths, empty / `.` / `..` components and NUL
    /// bytes, which keeps extraction inside the destination directory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let shown = String::from_utf8_lossy(&bytes).into_owned();
        if bytes.is_empty() {
            return Err(ArchiverError::malformed("empty entry path"));
        }
        if bytes.contains(&0) {
            return Err(ArchiverError::malformed(format!("entry path '{}' contains NUL", shown)));
        }
        for component in bytes.split(|&b| b == b'/') {
            if component.is_empty() || component == b"." || component == b".." {
                return Err(ArchiverError::malformed(format!("unsafe entry path '{}'", shown)));
            }
            #[cfg(windows)]
            if component.contains(&b'\\') || component.contains(&b':') {
                return Err(ArchiverError::malformed(format!("unsafe entry path '{}'", shown)));
            }
        }
        Ok(ArchivePath(bytes))
    }

    /// Builds an archive path from a path relative to the walk root.
    pub fn from_relative(relative: &Path) -> Result<Self> {
        let mut bytes = Vec::new();
        for component in relative.components() {
            let part = match component {
                std::path::Component::Normal(part) => part,
                _ => {
                    return Err(ArchiverError::malformed(format!(
                        "'{}' is not a plain relative path",
                        relative.display()
                    )))
                }
            };
            if !bytes.is_empty() {
                bytes.push(b'/');
            }
            bytes.extend_from_slice(os_bytes(part)?);
        }
        ArchivePath::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The enclosing archive path, `None` at the top level.
    pub fn parent(&self) -> Option<ArchivePath> {
        let cut = self.0.iter().rposition(|&b| b == b'/')?;
        Some(ArchivePath(self.0[..cut].to_vec()))
    }

    /// Joins this path onto `root` using the platform's separator.
    pub fn to_native(&self, root: &Path) -> Result<PathBuf> {
        let mut out = root.to_path_buf();
        for component in self.0.split(|&b| b == b'/') {
            out.push(os_str(component)?);
        }
        Ok(out)
    }
}

#[cfg(unix)]
fn os_bytes(part: &std::ffi::OsStr) -> Result<&[u8]> {
    use std::os::unix::ffi::OsStrExt;
    Ok(part.as_bytes())
}

#[cfg(not(unix))]
fn os_bytes(part: &std::ffi::OsStr) -> Result<&[u8]> {
    part.to_str()
        .map(str::as_bytes)
        .ok_or_else(|| ArchiverError::malformed(format!("file name {:?} is not valid UTF-8", part)))
}

#[cfg(unix)]
fn os_str(bytes: &[u8]) -> Result<&std::ffi::OsStr> {
    use std::os::unix::ffi::OsStrExt;
    Ok(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn os_str(bytes: &[u8]) -> Result<&std::ffi::OsStr> {
    std::str::from_utf8(bytes)
        .map(std::ffi::OsStr::new)
        .map_err(|_| ArchiverError::malformed("entry path is not valid UTF-8 on this platform"))
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for ArchivePath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// File or directory, with the fields that only make sense for files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File { size: u64, content: Fingerprint },
}

/// One node of the archived tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: ArchivePath,
    pub kind: EntryKind,
}

impl Entry {
    pub fn directory(path: ArchivePath) -> Self {
        Entry { path, kind: EntryKind::Directory }
    }

    pub fn file(path: ArchivePath, size: u64, content: Fingerprint) -> Self {
        Entry { path, kind: EntryKind::File { size, content } }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// Original byte length; 0 for directories.
    pub fn size(&self) -> u64 {
        match self.kind {
            EntryKind::File { size, .. } => size,
            EntryKind::Directory => 0,
        }
    }

    pub fn content_ref(&self) -> Option<Fingerprint> {
        match self.kind {
            EntryKind::File { content, .. } => Some(content),
            EntryKind::Directory => None,
        }
    }
}

/// Rejects an index in which two entries resolve to the same path.
pub(crate) fn ensure_unique_paths(entries: &[Entry]) -> Result<()> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(&entry.path) {
            return Err(ArchiverError::malformed(format!("duplicate entry path '{}'", entry.path)));
        }
    }
    Ok(())
}

/// An ordered entry index plus the blocks it references.
#[derive(Debug)]
pub struct Archive {
    entries: Vec<Entry>,
    store: ContentStore,
}

impl Archive {
    /// Pairs entries with a store, checking that every file resolves to a
    /// block of the recorded size and no block is orphaned.
    pub fn new(entries: Vec<Entry>, store: ContentStore) -> Result<Self> {
        ensure_unique_paths(&entries)?;
        for entry in &entries {
            if let EntryKind::File { size, content } = entry.kind {
                let block = store.block(&content).ok_or_else(|| ArchiverError::DanglingReference {
                    path: entry.path.to_string(),
                    fingerprint: content,
                })?;
                if block.original_len() != size {
                    return Err(ArchiverError::malformed(format!(
                        "entry '{}' claims {} bytes but its block holds {}",
                        entry.path,
                        size,
                        block.original_len()
                    )));
                }
            }
        }
        if let Some(orphan) = store.orphans().first() {
            return Err(ArchiverError::malformed(format!("content block {} is not referenced by any entry", orphan)));
        }
        Ok(Archive { entries, store })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// The original bytes of a file entry; `None` for directories.
    pub fn read(&self, entry: &Entry) -> Result<Option<Vec<u8>>> {
        entry.content_ref().map(|fp| self.store.resolve(&fp)).transpose()
    }
}
