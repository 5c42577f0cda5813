use std::collections::HashSet;
use std::io::{self, Write};
use std::path::Path;

use super::{ensure_unique_paths, Entry, EntryKind, FORMAT_VERSION, KIND_DIRECTORY, KIND_FILE, MAGIC_BYTES};
use crate::error::{ArchiverError, Result};
use crate::store::{ContentBlock, ContentStore};

/// What [`write_container`] put on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerStats {
    pub entries: usize,
    pub blocks: usize,
    pub bytes_written: u64,
}

/// Counts the bytes that reach the underlying writer.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Low-level section writer. The header goes out plain; everything after it
/// is one checksummed zstd frame. Callers must emit index, blocks and trailer
/// in that order; [`write_container`] does so.
pub struct ContainerWriter<W: Write> {
    body: zstd::stream::write::Encoder<'static, CountingWriter<W>>,
}

impl<W: Write> ContainerWriter<W> {
    /// Writes the header and opens the compressed body at `level`.
    pub fn new(writer: W, level: i32) -> io::Result<Self> {
        let mut out = CountingWriter { inner: writer, count: 0 };
        out.write_all(MAGIC_BYTES)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes())?;
        out.write_all(&0u16.to_le_bytes())?;
        let mut body = zstd::stream::write::Encoder::new(out, level)?;
        body.include_checksum(true)?;
        Ok(ContainerWriter { body })
    }

    /// Writes the entry table followed by its CRC-32.
    pub fn write_index(&mut self, entries: &[Entry]) -> io::Result<()> {
        let mut index = Vec::with_capacity(8 + entries.len() * 48);
        index.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        for entry in entries {
            let path = entry.path.as_bytes();
            index.extend_from_slice(&(path.len() as u32).to_le_bytes());
            index.extend_from_slice(path);
            match entry.kind {
                EntryKind::Directory => index.push(KIND_DIRECTORY),
                EntryKind::File { size, content } => {
                    index.push(KIND_FILE);
                    index.extend_from_slice(&size.to_le_bytes());
                    index.extend_from_slice(content.as_bytes());
                }
            }
        }
        let crc = crc32fast::hash(&index);
        self.body.write_all(&index)?;
        self.body.write_all(&crc.to_le_bytes())
    }

    pub fn write_block_count(&mut self, count: usize) -> io::Result<()> {
        self.body.write_all(&(count as u64).to_le_bytes())
    }

    pub fn write_block(&mut self, block: &ContentBlock) -> io::Result<()> {
        self.body.write_all(block.fingerprint.as_bytes())?;
        self.body.write_all(&[block.data.algo.tag()])?;
        self.body.write_all(&block.original_len().to_le_bytes())?;
        self.body.write_all(&block.stored_len().to_le_bytes())?;
        self.body.write_all(&block.data.payload)
    }

    /// Writes the trailing magic, closes the frame and flushes. Returns the
    /// inner writer and the total number of bytes it received.
    pub fn finalize(mut self) -> io::Result<(W, u64)> {
        self.body.write_all(MAGIC_BYTES)?;
        let mut out = self.body.finish()?;
        out.flush()?;
        Ok((out.inner, out.count))
    }
}

/// Serializes `entries` and the blocks they reference into `out`.
///
/// Blocks are written in order of first reference, so the output depends only
/// on the entry sequence. The body is compressed at the store's codec level.
/// `dest` labels I/O errors.
pub fn write_container<W: Write>(out: W, entries: &[Entry], store: &ContentStore, dest: &Path) -> Result<ContainerStats> {
    ensure_unique_paths(entries)?;

    let mut seen = HashSet::new();
    let mut blocks = Vec::new();
    for entry in entries {
        if let Some(fingerprint) = entry.content_ref() {
            if !seen.insert(fingerprint) {
                continue;
            }
            let block = store
                .block(&fingerprint)
                .ok_or_else(|| ArchiverError::DanglingReference { path: entry.path.to_string(), fingerprint })?;
            blocks.push(block);
        }
    }

    let fail = |e| ArchiverError::write(dest, e);
    let mut writer = ContainerWriter::new(out, store.codec().level()).map_err(fail)?;
    writer.write_index(entries).map_err(fail)?;
    writer.write_block_count(blocks.len()).map_err(fail)?;
    for block in &blocks {
        writer.write_block(block).map_err(fail)?;
    }
    let (_, bytes_written) = writer.finalize().map_err(fail)?;

    tracing::debug!("wrote container: {} entries, {} blocks, {} bytes", entries.len(), blocks.len(), bytes_written);
    Ok(ContainerStats { entries: entries.len(), blocks: blocks.len(), bytes_written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchivePath, HEADER_LEN};
    use crate::hash::Fingerprint;

    fn path(s: &str) -> ArchivePath {
        ArchivePath::from_bytes(s.as_bytes().to_vec()).unwrap()
    }

    fn body(out: &[u8]) -> Vec<u8> {
        zstd::decode_all(&out[HEADER_LEN..]).unwrap()
    }

    #[test]
    fn empty_archive_layout() -> Result<(), Box<dyn std::error::Error>> {
        let mut out = Vec::new();
        let stats = write_container(&mut out, &[], &ContentStore::default(), Path::new("mem"))?;

        assert_eq!(stats.bytes_written, out.len() as u64);
        assert_eq!(&out[..8], MAGIC_BYTES);
        assert_eq!(u16::from_le_bytes([out[8], out[9]]), FORMAT_VERSION);

        // entry count 8 + crc 4 + block count 8 + trailer 8
        let plain = body(&out);
        assert_eq!(plain.len(), 28);
        assert_eq!(&plain[plain.len() - 8..], MAGIC_BYTES);
        Ok(())
    }

    #[test]
    fn shared_content_is_written_once() -> Result<(), Box<dyn std::error::Error>> {
        let store = ContentStore::default();
        let payload = b"duplicated body".to_vec();
        let a = store.intern(&payload).fingerprint;
        let b = store.intern(&payload).fingerprint;
        let entries = vec![
            Entry::directory(path("d")),
            Entry::file(path("d/one"), payload.len() as u64, a),
            Entry::file(path("d/two"), payload.len() as u64, b),
        ];

        let mut out = Vec::new();
        let stats = write_container(&mut out, &entries, &store, Path::new("mem"))?;
        assert_eq!(stats.blocks, 1);
        let plain = body(&out);
        assert_eq!(plain.windows(payload.len()).filter(|w| *w == payload.as_slice()).count(), 1);
        Ok(())
    }

    #[test]
    fn per_entry_metadata_compresses_together() -> Result<(), Box<dyn std::error::Error>> {
        let store = ContentStore::default();
        let mut entries = Vec::new();
        let mut logical = 0u64;
        for i in 0..500 {
            let content = format!("File {:03}\n", i).into_bytes();
            logical += content.len() as u64;
            let fp = store.intern(&content).fingerprint;
            entries.push(Entry::file(path(&format!("tiny_{:04}.txt", i)), content.len() as u64, fp));
        }

        let stats = write_container(Vec::new(), &entries, &store, Path::new("mem"))?;
        assert!(stats.bytes_written < 3 * logical, "{} bytes for {} of content", stats.bytes_written, logical);
        Ok(())
    }

    #[test]
    fn dangling_reference_is_refused() {
        let entries = vec![Entry::file(path("ghost"), 1, Fingerprint::of(b"?"))];
        let err = write_container(Vec::new(), &entries, &ContentStore::default(), Path::new("mem")).unwrap_err();
        assert!(matches!(err, ArchiverError::DanglingReference { .. }));
    }
}
