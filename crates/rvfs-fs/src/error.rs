//! Error types for filesystem operations.

use std::io;

use rvfs_types::{Revnum, TypeError, Version};
use thiserror::Error;

/// Errors produced by the filesystem core and by storage backends.
///
/// Backend-specific storage failures surface as [`FsError::Io`],
/// [`FsError::Corrupt`], or [`FsError::Serialization`]; the core passes them
/// through unchanged.
#[derive(Debug, Error)]
pub enum FsError {
    /// No registered backend answers to this type name, or its module could
    /// not be located.
    #[error("unknown FS type '{fs_type}': {reason}")]
    UnknownBackendType { fs_type: String, reason: String },

    /// A backend module was located but lacks its entry point.
    #[error("'{library}' does not define '{symbol}()': {reason}")]
    ModuleLoadFailure {
        library: String,
        symbol: String,
        reason: String,
    },

    /// The backend reports a version other than the loader's.
    #[error("mismatched FS module version for '{fs_type}': found {found}, expected {expected}")]
    VersionMismatch {
        fs_type: String,
        expected: Version,
        found: Version,
    },

    /// A mutating operation was attempted on a revision root.
    #[error("cannot {operation} in a revision root; a transaction root is required")]
    ReadOnlyRoot { operation: &'static str },

    /// A revision-root-only operation was attempted on a transaction root.
    #[error("{operation} requires a revision root")]
    NotRevisionRoot { operation: &'static str },

    /// Merge or commit found conflicting changes.
    #[error("conflict at '{path}'")]
    Conflict { path: String },

    /// The transaction's base is no longer current enough to commit.
    #[error("out of date: {0}")]
    OutOfDate(String),

    #[error("path '{path}' is already locked by user '{owner}'")]
    AlreadyLocked { path: String, owner: String },

    /// A changed path is locked and the caller does not hold the token.
    #[error("cannot verify lock on path '{path}'; no matching lock token available (owner '{owner}')")]
    PathLocked { path: String, owner: String },

    #[error("lock comment has illegal characters")]
    UnsafeComment,

    #[error("no username is currently associated with the filesystem")]
    NoUser,

    #[error("no lock on path '{0}'")]
    NoSuchLock(String),

    #[error("cannot unlock path '{path}': token does not match")]
    BadLockToken { path: String },

    #[error("user '{user}' does not own the lock on '{path}' (currently held by '{owner}')")]
    LockOwnerMismatch {
        path: String,
        user: String,
        owner: String,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("operation cancelled")]
    Cancelled,

    /// The backend legitimately lacks an optional capability.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("no such revision {0}")]
    NoSuchRevision(Revnum),

    #[error("no such transaction '{0}'")]
    NoSuchTransaction(String),

    #[error("path not found: '{0}'")]
    NotFound(String),

    #[error("path already exists: '{0}'")]
    AlreadyExists(String),

    #[error("'{0}' is not a directory")]
    NotDirectory(String),

    #[error("'{0}' is not a file")]
    NotFile(String),

    #[error("invalid path '{path}': {reason}")]
    PathSyntax { path: String, reason: String },

    #[error("checksum mismatch for '{path}': expected {expected}, actual {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Stored data failed an integrity check.
    #[error("corrupt filesystem: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TypeError> for FsError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidPath { path, reason } => Self::PathSyntax { path, reason },
            TypeError::InvalidDelta(reason) => Self::InvalidParameter(reason),
            other => Self::InvalidParameter(other.to_string()),
        }
    }
}

/// Convenience alias for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;
