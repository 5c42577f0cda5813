//! Content fingerprints.
//!
//! Every file body is keyed by the first 128 bits of the BLAKE3 output for its
//! exact bytes. Two different byte sequences are treated as never sharing a
//! fingerprint.

use serde::{Serialize, Serializer};
use std::fmt;

/// Width of a serialized fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 16;

/// Fixed-size digest of a byte sequence, used as the content-equality key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Hashes `bytes` as a whole. Total and deterministic, including for empty input.
    pub fn of(bytes: &[u8]) -> Self {
        let mut digest = [0u8; FINGERPRINT_LEN];
        blake3::Hasher::new().update(bytes).finalize_xof().fill(&mut digest);
        Fingerprint(digest)
    }

    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// First 12 hex digits, used by `list --long`.
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(12);
        s
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_input_identical_fingerprint() {
        let a = Fingerprint::of(b"same bytes");
        let b = Fingerprint::of(&b"same bytes".to_vec());
        assert_eq!(a, b);
        assert_ne!(a, Fingerprint::of(b"same bytes!"));
    }

    #[test]
    fn empty_input_is_hashable() {
        let empty = Fingerprint::of(&[]);
        // Leading half of the well-known BLAKE3 digest of the empty string.
        assert_eq!(empty.to_string(), "af1349b9f5f9a1a6a0404dea36dcc949");
        assert_eq!(empty.short(), "af1349b9f5f9");
    }

    #[test]
    fn streaming_matches_whole_buffer() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut hasher = blake3::Hasher::new();
        for chunk in data.chunks(4096) {
            hasher.update(chunk);
        }
        let mut digest = [0u8; FINGERPRINT_LEN];
        digest.copy_from_slice(&hasher.finalize().as_bytes()[..FINGERPRINT_LEN]);
        assert_eq!(Fingerprint::from_bytes(digest), Fingerprint::of(&data));
    }
}
