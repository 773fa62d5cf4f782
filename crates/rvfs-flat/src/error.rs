//! Storage-level errors of the flat backend.

use std::io;
use std::path::PathBuf;

use rvfs_fs::FsError;
use thiserror::Error;

/// Failures reading or writing the files under a flat repository.
///
/// These never leave the crate as-is: they convert into the matching
/// [`FsError`] kind at the backend boundary.
#[derive(Debug, Error)]
pub enum FlatError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A framed file failed its length or CRC check.
    #[error("damaged file '{path}': {reason}")]
    Damaged { path: PathBuf, reason: String },

    #[error("cannot encode '{path}': {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("cannot decode '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("unsupported repository format {found} (expected {expected})")]
    Format { found: String, expected: u32 },
}

impl FlatError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<FlatError> for FsError {
    fn from(err: FlatError) -> Self {
        match err {
            FlatError::Io { path, source } => {
                FsError::Io(io::Error::new(source.kind(), format!("{}: {source}", path.display())))
            }
            FlatError::Encode { .. } => FsError::Serialization(err.to_string()),
            other => FsError::Corrupt(other.to_string()),
        }
    }
}

pub type FlatResult<T> = Result<T, FlatError>;
