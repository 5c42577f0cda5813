use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use super::{ensure_unique_paths, Archive, ArchivePath, Entry, FORMAT_VERSION, KIND_DIRECTORY, KIND_FILE, MAGIC_BYTES};
use crate::compress::{Codec, CompressedBlock, CompressionAlgo};
use crate::error::{ArchiverError, Result};
use crate::hash::{Fingerprint, FINGERPRINT_LEN};
use crate::store::{ContentBlock, ContentStore};

/// A reader for `.mtar` containers, one section at a time.
///
/// Running out of bytes anywhere, or a compressed body that fails to decode,
/// is reported as `MalformedContainer`. Other I/O failures keep their cause.
pub struct ContainerReader<R: Read> {
    reader: R,
    path: PathBuf,
    crc: Option<crc32fast::Hasher>,
}

impl<R: Read> ContainerReader<R> {
    /// `path` is only used to label errors.
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        ContainerReader { reader, path: path.into(), crc: None }
    }

    fn fail(&self, what: &str, e: io::Error) -> ArchiverError {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => ArchiverError::malformed(format!("truncated while reading {}", what)),
            // zstd reports bad frames and checksum mismatches this way
            io::ErrorKind::Other | io::ErrorKind::InvalidData => {
                ArchiverError::malformed(format!("corrupt compressed data while reading {}: {}", what, e))
            }
            _ => ArchiverError::io(&self.path, e),
        }
    }

    fn fill(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        if let Err(e) = self.reader.read_exact(buf) {
            return Err(self.fail(what, e));
        }
        if let Some(crc) = self.crc.as_mut() {
            crc.update(buf);
        }
        Ok(())
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill(&mut buf, what)?;
        Ok(buf)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.array::<1>(what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        self.array(what).map(u16::from_le_bytes)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        self.array(what).map(u32::from_le_bytes)
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        self.array(what).map(u64::from_le_bytes)
    }

    /// Reads exactly `len` bytes without trusting `len` for the allocation.
    fn bytes(&mut self, len: u64, what: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Err(e) = (&mut self.reader).take(len).read_to_end(&mut buf) {
            return Err(self.fail(what, e));
        }
        if (buf.len() as u64) != len {
            return Err(ArchiverError::malformed(format!("truncated while reading {}", what)));
        }
        if let Some(crc) = self.crc.as_mut() {
            crc.update(&buf);
        }
        Ok(buf)
    }

    /// Checks the magic, version and flags.
    pub fn read_header(&mut self) -> Result<()> {
        let magic: [u8; 8] = self.array("header")?;
        if &magic != MAGIC_BYTES {
            return Err(ArchiverError::malformed("not an mtar archive (magic bytes mismatch)"));
        }
        let version = self.u16("header")?;
        if version != FORMAT_VERSION {
            return Err(ArchiverError::malformed(format!("unsupported format version {}", version)));
        }
        let flags = self.u16("header")?;
        if flags != 0 {
            return Err(ArchiverError::malformed(format!("unknown header flags {:#06x}", flags)));
        }
        Ok(())
    }

    /// Reads the entry table and verifies its checksum.
    pub fn read_index(&mut self) -> Result<Vec<Entry>> {
        self.crc = Some(crc32fast::Hasher::new());
        let count = self.u64("entry count")?;
        let mut entries = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            let path_len = self.u32("entry path length")?;
            let path = ArchivePath::from_bytes(self.bytes(u64::from(path_len), "entry path")?)?;
            let entry = match self.u8("entry kind")? {
                KIND_DIRECTORY => Entry::directory(path),
                KIND_FILE => {
                    let size = self.u64("entry size")?;
                    let content = Fingerprint::from_bytes(self.array::<FINGERPRINT_LEN>("entry fingerprint")?);
                    Entry::file(path, size, content)
                }
                other => {
                    return Err(ArchiverError::malformed(format!("unknown kind tag {} for entry '{}'", other, path)))
                }
            };
            entries.push(entry);
        }
        let computed = self.crc.take().map(|crc| crc.finalize()).unwrap_or_default();
        let stored = self.u32("index checksum")?;
        if computed != stored {
            return Err(ArchiverError::malformed(format!(
                "index checksum mismatch (stored {:08x}, computed {:08x})",
                stored, computed
            )));
        }
        ensure_unique_paths(&entries)?;
        Ok(entries)
    }

    /// Reads every block record into `store`. Returns how many were read.
    pub fn read_blocks(&mut self, store: &ContentStore) -> Result<u64> {
        let count = self.u64("block count")?;
        for _ in 0..count {
            let fingerprint = Fingerprint::from_bytes(self.array::<FINGERPRINT_LEN>("block fingerprint")?);
            let algo = CompressionAlgo::from_tag(self.u8("block encoding")?)?;
            let original_len = self.u64("block length")?;
            let stored_len = self.u64("block length")?;
            if algo == CompressionAlgo::Store && stored_len != original_len {
                return Err(ArchiverError::malformed(format!(
                    "raw block {} has stored length {} but original length {}",
                    fingerprint, stored_len, original_len
                )));
            }
            let payload = self.bytes(stored_len, "block payload")?;
            store.insert_block(ContentBlock { fingerprint, data: CompressedBlock { algo, original_len, payload } })?;
        }
        Ok(count)
    }

    /// Expects the closing magic and nothing after it.
    pub fn read_trailer(&mut self) -> Result<()> {
        let magic: [u8; 8] = self.array("trailer")?;
        if &magic != MAGIC_BYTES {
            return Err(ArchiverError::malformed("trailer magic mismatch"));
        }
        let mut extra = [0u8; 1];
        match self.reader.read(&mut extra) {
            Ok(0) => Ok(()),
            Ok(_) => Err(ArchiverError::malformed("unexpected data after trailer")),
            Err(e) => Err(self.fail("trailer", e)),
        }
    }
}

impl<R: BufRead> ContainerReader<R> {
    /// Switches to the compressed body that follows the header.
    pub fn into_body(self) -> Result<ContainerReader<zstd::stream::read::Decoder<'static, R>>> {
        let decoder =
            zstd::stream::read::Decoder::with_buffer(self.reader).map_err(|e| ArchiverError::io(&self.path, e))?;
        Ok(ContainerReader::new(decoder, self.path))
    }
}

type BodyReader = ContainerReader<zstd::stream::read::Decoder<'static, BufReader<File>>>;

/// Opens `path`, checks its header and positions a reader on the body.
fn open(path: &Path) -> Result<BodyReader> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ArchiverError::ArchiveNotFound { path: path.to_path_buf() },
        _ => ArchiverError::io(path, e),
    })?;
    let mut reader = ContainerReader::new(BufReader::new(file), path);
    reader.read_header()?;
    reader.into_body()
}

/// Parses header and index only. Decoding stops before the first block.
pub fn read_index(path: &Path) -> Result<Vec<Entry>> {
    open(path)?.read_index()
}

/// Parses the whole container and checks that every reference resolves.
pub fn read_archive(path: &Path) -> Result<Archive> {
    let mut reader = open(path)?;
    let entries = reader.read_index()?;
    let store = ContentStore::new(Codec::default());
    let blocks = reader.read_blocks(&store)?;
    reader.read_trailer()?;

    for entry in &entries {
        if let Some(fingerprint) = entry.content_ref() {
            if !store.contains(&fingerprint) {
                return Err(ArchiverError::DanglingReference { path: entry.path.to_string(), fingerprint });
            }
            store.add_reference(&fingerprint)?;
        }
    }
    tracing::debug!("read {}: {} entries, {} blocks", path.display(), entries.len(), blocks);
    Archive::new(entries, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{write_container, HEADER_LEN};

    fn path(s: &str) -> ArchivePath {
        ArchivePath::from_bytes(s.as_bytes().to_vec()).unwrap()
    }

    fn sample() -> (Vec<Entry>, Vec<u8>) {
        let store = ContentStore::default();
        let body = b"hello hello hello hello hello hello".to_vec();
        let a = store.intern(&body).fingerprint;
        let b = store.intern(b"").fingerprint;
        let entries = vec![
            Entry::directory(path("docs")),
            Entry::file(path("docs/a.txt"), body.len() as u64, a),
            Entry::file(path("docs/empty"), 0, b),
            Entry::directory(path("docs/nothing")),
        ];
        let mut out = Vec::new();
        write_container(&mut out, &entries, &store, Path::new("mem")).unwrap();
        (entries, out)
    }

    fn parse(bytes: &[u8]) -> Result<(Vec<Entry>, ContentStore)> {
        let mut reader = ContainerReader::new(bytes, "mem");
        reader.read_header()?;
        let mut reader = reader.into_body()?;
        let entries = reader.read_index()?;
        let store = ContentStore::default();
        reader.read_blocks(&store)?;
        reader.read_trailer()?;
        Ok((entries, store))
    }

    #[test]
    fn sections_parse_back() -> Result<(), Box<dyn std::error::Error>> {
        let (entries, bytes) = sample();
        let (parsed, store) = parse(&bytes)?;
        assert_eq!(parsed, entries);
        assert_eq!(store.len(), 2);
        let fp = parsed[1].content_ref().unwrap();
        assert_eq!(store.resolve(&fp)?, b"hello hello hello hello hello hello");
        Ok(())
    }

    #[test]
    fn foreign_file_is_malformed() {
        let err = parse(b"PK\x03\x04 definitely a zip file").unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn every_truncation_is_malformed() {
        let (_, bytes) = sample();
        for cut in 0..bytes.len() {
            let err = parse(&bytes[..cut]).unwrap_err();
            assert!(err.is_corruption(), "cut at {} gave {}", cut, err);
        }
    }

    /// Applies `edit` to the decoded body and compresses it again.
    fn reencode(bytes: &[u8], edit: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
        let mut plain = zstd::decode_all(&bytes[HEADER_LEN..]).unwrap();
        edit(&mut plain);
        let mut out = bytes[..HEADER_LEN].to_vec();
        out.extend(zstd::encode_all(&plain[..], 3).unwrap());
        out
    }

    #[test]
    fn flipped_index_byte_fails_checksum() {
        let (_, bytes) = sample();
        // First byte of the first path ("docs").
        let bytes = reencode(&bytes, |plain| plain[8 + 4] = b'x');
        let err = parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("checksum"), "{}", err);
    }

    #[test]
    fn damaged_frame_is_malformed() {
        let (_, mut bytes) = sample();
        let last = bytes.len() - 1;
        // The frame ends with its content checksum.
        bytes[last] ^= 0xFF;
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, ArchiverError::MalformedContainer { .. }), "{}", err);
    }

    #[test]
    fn newer_version_is_refused_before_decoding() {
        let (_, mut bytes) = sample();
        bytes[8] = 2;
        let err = ContainerReader::new(&bytes[..], "mem").read_header().unwrap_err();
        assert!(err.to_string().contains("version 2"), "{}", err);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let (_, mut bytes) = sample();
        bytes.extend_from_slice(b"junk");
        assert!(parse(&bytes).unwrap_err().is_corruption());
    }
}
