//! Parallel file writer for extraction.
//!
//! Runs after every directory of the archive exists. Each job resolves its
//! block through the content store and writes the bytes to its own target, so
//! sibling writes are unordered with respect to each other.

use std::path::PathBuf;

use rayon::prelude::*;

use crate::error::{ArchiverError, Result};
use crate::fsx::FileSystem;
use crate::hash::Fingerprint;
use crate::store::ContentStore;

/// One file to materialize.
#[derive(Debug, Clone)]
pub(crate) struct WriteJob {
    pub target: PathBuf,
    pub content: Fingerprint,
}

/// Writes every job on the current rayon pool. Returns the total bytes written.
pub(crate) fn flush_files<F: FileSystem>(fs: &F, store: &ContentStore, jobs: &[WriteJob]) -> Result<u64> {
    jobs.par_iter()
        .map(|job| {
            let bytes = store.resolve(&job.content)?;
            fs.write_file(&job.target, &bytes).map_err(|e| ArchiverError::write(&job.target, e))?;
            tracing::trace!("wrote {} ({} bytes)", job.target.display(), bytes.len());
            Ok(bytes.len() as u64)
        })
        .try_reduce(|| 0, |a, b| Ok(a + b))
}
