//! # Block Codec
//!
//! Compresses one content block at a time with `zstd`. Compression is
//! best-effort: when the compressed form is not strictly smaller than the
//! input the block is kept as-is and tagged [`CompressionAlgo::Store`], so
//! incompressible data never inflates beyond the per-block record overhead.

use std::io::Read;

use crate::error::{ArchiverError, Result};

/// Default Zstandard level, matching the `zstd` CLI default.
pub const DEFAULT_LEVEL: i32 = 3;

/// How a block's payload is encoded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgo {
    /// Plain storage without any compression.
    Store,
    /// Zstandard frame.
    Zstd,
}

impl CompressionAlgo {
    pub(crate) fn tag(self) -> u8 {
        match self {
            CompressionAlgo::Store => 0,
            CompressionAlgo::Zstd => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(CompressionAlgo::Store),
            1 => Ok(CompressionAlgo::Zstd),
            other => Err(ArchiverError::malformed(format!("unknown block encoding tag {}", other))),
        }
    }
}

/// A block payload together with the facts needed to decode it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlock {
    pub algo: CompressionAlgo,
    pub original_len: u64,
    pub payload: Vec<u8>,
}

/// Block compressor configured with a Zstandard level.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    level: i32,
}

impl Default for Codec {
    fn default() -> Self {
        Codec { level: DEFAULT_LEVEL }
    }
}

impl Codec {
    /// Levels outside `1..=22` are clamped.
    pub fn new(level: i32) -> Self {
        Codec { level: level.clamp(1, 22) }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    /// Compresses `data`, falling back to raw storage when that is not smaller.
    pub fn compress(&self, data: &[u8]) -> CompressedBlock {
        let original_len = data.len() as u64;
        if data.is_empty() {
            return CompressedBlock { algo: CompressionAlgo::Store, original_len, payload: Vec::new() };
        }
        match zstd::bulk::compress(data, self.level) {
            Ok(compressed) if compressed.len() < data.len() => {
                CompressedBlock { algo: CompressionAlgo::Zstd, original_len, payload: compressed }
            }
            Ok(_) => CompressedBlock { algo: CompressionAlgo::Store, original_len, payload: data.to_vec() },
            Err(e) => {
                tracing::warn!("zstd compression failed, storing block raw: {}", e);
                CompressedBlock { algo: CompressionAlgo::Store, original_len, payload: data.to_vec() }
            }
        }
    }

    /// Inverse of [`Codec::compress`]. The output must be exactly `original_len` bytes.
    pub fn decompress(&self, block: &CompressedBlock) -> Result<Vec<u8>> {
        let data = match block.algo {
            CompressionAlgo::Store => block.payload.clone(),
            CompressionAlgo::Zstd => {
                // Read one byte past the recorded length so an overlong frame is caught below.
                let mut out = Vec::new();
                zstd::stream::read::Decoder::new(block.payload.as_slice())
                    .and_then(|decoder| decoder.take(block.original_len.saturating_add(1)).read_to_end(&mut out))
                    .map_err(|e| ArchiverError::malformed(format!("zstd block failed to decode: {}", e)))?;
                out
            }
        };
        if data.len() as u64 != block.original_len {
            return Err(ArchiverError::malformed(format!(
                "block decoded to {} bytes, expected {}",
                data.len(),
                block.original_len
            )));
        }
        Ok(data)
    }
}
