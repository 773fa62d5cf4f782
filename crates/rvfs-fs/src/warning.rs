//! Warning sinks.
//!
//! Backends report non-fatal problems (a stale lock file, an unreadable
//! transaction left behind by a crash) through the handle's warning sink
//! rather than failing the operation in progress.

use tracing::error;

use crate::error::FsError;

/// Receives warnings raised against one filesystem handle.
pub trait WarningHandler: Send + Sync {
    fn warning(&self, err: &FsError);
}

impl<F> WarningHandler for F
where
    F: Fn(&FsError) + Send + Sync,
{
    fn warning(&self, err: &FsError) {
        self(err)
    }
}

/// The default sink: log the warning and abort the process.
///
/// A server cannot assume stderr goes anywhere, and a warning nobody sees is
/// worse than a crash. Install a real handler with
/// [`Filesystem::set_warning`](crate::Filesystem::set_warning).
#[derive(Clone, Copy, Debug, Default)]
pub struct AbortOnWarning;

impl WarningHandler for AbortOnWarning {
    fn warning(&self, err: &FsError) {
        error!(error = %err, "unhandled filesystem warning; aborting");
        std::process::abort();
    }
}

/// A sink that logs at warn level and continues.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWarnings;

impl WarningHandler for LogWarnings {
    fn warning(&self, err: &FsError) {
        tracing::warn!(error = %err, "filesystem warning");
    }
}
