//! Content-addressed block store.
//!
//! Maps a [`Fingerprint`] to exactly one compressed [`ContentBlock`]. The map is
//! guarded by a single `Mutex`; hashing and compression happen outside the
//! lock, and the insert itself is insert-if-absent, so when several threads
//! intern the same content the first insertion wins and the rest observe a
//! dedup hit.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::compress::{Codec, CompressedBlock, CompressionAlgo};
use crate::error::{ArchiverError, Result};
use crate::hash::Fingerprint;

/// One unique payload, keyed by the fingerprint of its original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub fingerprint: Fingerprint,
    pub data: CompressedBlock,
}

impl ContentBlock {
    pub fn original_len(&self) -> u64 {
        self.data.original_len
    }

    pub fn stored_len(&self) -> u64 {
        self.data.payload.len() as u64
    }

    pub fn is_compressed(&self) -> bool {
        self.data.algo == CompressionAlgo::Zstd
    }
}

/// Result of [`ContentStore::intern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interned {
    pub fingerprint: Fingerprint,
    /// `true` when a block with this fingerprint already existed.
    pub dedup_hit: bool,
}

#[derive(Debug)]
struct Slot {
    block: Arc<ContentBlock>,
    references: u64,
}

/// Fingerprint → block map owned by one create/extract invocation.
#[derive(Debug, Default)]
pub struct ContentStore {
    codec: Codec,
    slots: Mutex<HashMap<Fingerprint, Slot>>,
}

impl ContentStore {
    pub fn new(codec: Codec) -> Self {
        ContentStore { codec, slots: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `bytes` once and returns its fingerprint.
    ///
    /// Each call counts as one reference, hit or miss.
    pub fn intern(&self, bytes: &[u8]) -> Interned {
        let fingerprint = Fingerprint::of(bytes);

        if let Some(slot) = self.lock().get_mut(&fingerprint) {
            slot.references += 1;
            return Interned { fingerprint, dedup_hit: true };
        }

        let block = ContentBlock { fingerprint, data: self.codec.compress(bytes) };

        match self.lock().entry(fingerprint) {
            MapEntry::Occupied(mut occupied) => {
                // Another thread inserted the same content while we were compressing.
                occupied.get_mut().references += 1;
                Interned { fingerprint, dedup_hit: true }
            }
            MapEntry::Vacant(vacant) => {
                tracing::trace!(
                    "new block {} ({} -> {} bytes, compressed: {})",
                    fingerprint.short(),
                    block.original_len(),
                    block.stored_len(),
                    block.is_compressed()
                );
                vacant.insert(Slot { block: Arc::new(block), references: 1 });
                Interned { fingerprint, dedup_hit: false }
            }
        }
    }

    /// Adds a block parsed from a container, with no references yet.
    ///
    /// A second block with the same fingerprint means the container is corrupt.
    pub fn insert_block(&self, block: ContentBlock) -> Result<()> {
        match self.lock().entry(block.fingerprint) {
            MapEntry::Occupied(_) => Err(ArchiverError::malformed(format!(
                "content block {} is stored more than once",
                block.fingerprint
            ))),
            MapEntry::Vacant(vacant) => {
                vacant.insert(Slot { block: Arc::new(block), references: 0 });
                Ok(())
            }
        }
    }

    /// Records one more index entry pointing at `fingerprint`.
    pub fn add_reference(&self, fingerprint: &Fingerprint) -> Result<()> {
        let mut slots = self.lock();
        let slot = slots.get_mut(fingerprint).ok_or(ArchiverError::UnknownFingerprint(*fingerprint))?;
        slot.references += 1;
        Ok(())
    }

    /// Decompresses and returns the exact original bytes for `fingerprint`.
    pub fn resolve(&self, fingerprint: &Fingerprint) -> Result<Vec<u8>> {
        let block = self.block(fingerprint).ok_or(ArchiverError::UnknownFingerprint(*fingerprint))?;
        self.codec.decompress(&block.data)
    }

    pub fn block(&self, fingerprint: &Fingerprint) -> Option<Arc<ContentBlock>> {
        self.lock().get(fingerprint).map(|slot| Arc::clone(&slot.block))
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().contains_key(fingerprint)
    }

    /// Number of entries referencing `fingerprint`; 0 if unknown.
    pub fn reference_count(&self, fingerprint: &Fingerprint) -> u64 {
        self.lock().get(fingerprint).map_or(0, |slot| slot.references)
    }

    /// Fingerprints of blocks nothing references.
    pub fn orphans(&self) -> Vec<Fingerprint> {
        let mut orphans: Vec<_> = self
            .lock()
            .iter()
            .filter(|(_, slot)| slot.references == 0)
            .map(|(fp, _)| *fp)
            .collect();
        orphans.sort();
        orphans
    }

    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        let mut all: Vec<_> = self.lock().keys().copied().collect();
        all.sort();
        all
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sum of payload bytes as stored on disk.
    pub fn stored_bytes(&self) -> u64 {
        self.lock().values().map(|slot| slot.block.stored_len()).sum()
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn duplicate_content_is_stored_once() -> Result<(), Box<dyn std::error::Error>> {
        let store = ContentStore::default();
        let first = store.intern(b"same content");
        let other = store.intern(b"different content");
        let second = store.intern(b"same content");

        assert!(!first.dedup_hit);
        assert!(!other.dedup_hit);
        assert!(second.dedup_hit);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(store.len(), 2);
        assert_eq!(store.reference_count(&first.fingerprint), 2);
        assert_eq!(store.reference_count(&other.fingerprint), 1);
        assert_eq!(store.resolve(&first.fingerprint)?, b"same content");
        Ok(())
    }

    #[test]
    fn resolve_unknown_fingerprint_fails() {
        let store = ContentStore::default();
        let err = store.resolve(&Fingerprint::of(b"never added")).unwrap_err();
        assert!(matches!(err, ArchiverError::UnknownFingerprint(_)));
        assert!(err.is_corruption());
    }

    #[test]
    fn concurrent_interns_agree_on_one_block() {
        let store = ContentStore::default();
        let payload = b"shared payload ".repeat(512);
        let outcomes: Vec<Interned> = (0..64).into_par_iter().map(|_| store.intern(&payload)).collect();

        assert_eq!(store.len(), 1);
        assert_eq!(outcomes.iter().filter(|o| !o.dedup_hit).count(), 1);
        assert_eq!(store.reference_count(&outcomes[0].fingerprint), 64);
    }

    #[test]
    fn parsed_blocks_start_unreferenced() -> Result<(), Box<dyn std::error::Error>> {
        let codec = Codec::default();
        let block = ContentBlock { fingerprint: Fingerprint::of(b"abc"), data: codec.compress(b"abc") };
        let store = ContentStore::new(codec);
        store.insert_block(block.clone())?;

        assert_eq!(store.orphans(), vec![block.fingerprint]);
        store.add_reference(&block.fingerprint)?;
        assert!(store.orphans().is_empty());
        assert_eq!(store.reference_count(&block.fingerprint), 1);

        let err = store.insert_block(block).unwrap_err();
        assert!(err.is_corruption());
        Ok(())
    }

    #[test]
    fn empty_content_is_a_block_too() -> Result<(), Box<dyn std::error::Error>> {
        let store = ContentStore::default();
        let a = store.intern(b"");
        let b = store.intern(b"");
        assert!(b.dedup_hit);
        assert_eq!(store.resolve(&a.fingerprint)?, Vec::<u8>::new());
        assert_eq!(store.stored_bytes(), 0);
        Ok(())
    }
}
