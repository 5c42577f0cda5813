use std::path::PathBuf;

use thiserror::Error;

use crate::hash::Fingerprint;

/// The primary error type for all operations in the `mtar` crate.
///
/// Every variant is terminal for the operation in progress. Use
/// [`ArchiverError::is_corruption`] to tell a damaged archive apart from an
/// environment problem.
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// The tree (or file) to archive does not exist.
    #[error("source path '{}' does not exist", .path.display())]
    SourceNotFound { path: PathBuf },

    /// The archive to list, extract or verify does not exist.
    #[error("archive '{}' does not exist", .path.display())]
    ArchiveNotFound { path: PathBuf },

    /// The header, index or a block record could not be parsed.
    #[error("malformed container: {reason}")]
    MalformedContainer { reason: String },

    /// An index entry names a fingerprint that has no block in the same archive.
    #[error("entry '{path}' references missing content block {fingerprint}")]
    DanglingReference { path: String, fingerprint: Fingerprint },

    /// A fingerprint could not be resolved through the content store.
    #[error("unknown content fingerprint {0}")]
    UnknownFingerprint(Fingerprint),

    /// Writing the archive or an extracted file/directory failed.
    #[error("failed to write '{}': {source}", .path.display())]
    DestinationWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading an existing source file or archive failed.
    #[error("I/O error on path '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiverError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ArchiverError::MalformedContainer { reason: reason.into() }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiverError::DestinationWrite { path: path.into(), source }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiverError::Io { path: path.into(), source }
    }

    /// True for errors caused by a damaged or foreign archive rather than the environment.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            ArchiverError::MalformedContainer { .. }
                | ArchiverError::DanglingReference { .. }
                | ArchiverError::UnknownFingerprint(_)
        )
    }
}

pub type Result<T, E = ArchiverError> = std::result::Result<T, E>;
