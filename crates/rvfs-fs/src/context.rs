//! State shared between a filesystem handle and its backend instance.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::FsConfig;
use crate::error::{FsError, FsResult};
use crate::warning::{AbortOnWarning, WarningHandler};

/// Caller-supplied cancellation check. Returns `true` once the caller wants
/// the current operation abandoned.
pub type CancelFunc = Arc<dyn Fn() -> bool + Send + Sync>;

/// Who is acting on the filesystem, and which lock tokens they hold.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FsAccess {
    pub username: String,
    pub lock_tokens: BTreeSet<String>,
}

impl FsAccess {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            lock_tokens: BTreeSet::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.lock_tokens.insert(token.into());
        self
    }

    pub fn add_token(&mut self, token: impl Into<String>) {
        self.lock_tokens.insert(token.into());
    }

    pub fn holds(&self, token: &str) -> bool {
        self.lock_tokens.contains(token)
    }
}

/// Configuration, warning sink, cancellation check, and access context for
/// one handle.
///
/// The handle and its backend both hold an `Arc<FsContext>`; the mutable
/// parts sit behind `RwLock`s so either side can read them at any time.
pub struct FsContext {
    config: FsConfig,
    warning: RwLock<Arc<dyn WarningHandler>>,
    cancel: RwLock<Option<CancelFunc>>,
    access: RwLock<Option<FsAccess>>,
}

impl FsContext {
    /// A context with the default (aborting) warning sink.
    pub fn new(config: FsConfig) -> Self {
        Self {
            config,
            warning: RwLock::new(Arc::new(AbortOnWarning)),
            cancel: RwLock::new(None),
            access: RwLock::new(None),
        }
    }

    pub fn with_warning(self, handler: Arc<dyn WarningHandler>) -> Self {
        self.set_warning(handler);
        self
    }

    pub fn with_cancel(self, cancel: CancelFunc) -> Self {
        self.set_cancel(Some(cancel));
        self
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn set_warning(&self, handler: Arc<dyn WarningHandler>) {
        *self.warning.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }

    /// Route a warning to the current sink.
    pub fn warn(&self, err: &FsError) {
        let handler = Arc::clone(&self.warning.read().unwrap_or_else(PoisonError::into_inner));
        handler.warning(err);
    }

    pub fn set_cancel(&self, cancel: Option<CancelFunc>) {
        *self.cancel.write().unwrap_or_else(PoisonError::into_inner) = cancel;
    }

    /// Fail with [`FsError::Cancelled`] if the caller asked to stop.
    pub fn check_cancelled(&self) -> FsResult<()> {
        let cancel = self.cancel.read().unwrap_or_else(PoisonError::into_inner);
        check(cancel.as_ref())
    }

    pub fn set_access(&self, access: Option<FsAccess>) {
        *self.access.write().unwrap_or_else(PoisonError::into_inner) = access;
    }

    pub fn access(&self) -> Option<FsAccess> {
        self.access
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The acting username, or [`FsError::NoUser`].
    pub fn username(&self) -> FsResult<String> {
        self.access().map(|a| a.username).ok_or(FsError::NoUser)
    }
}

impl fmt::Debug for FsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsContext")
            .field("config", &self.config)
            .field("access", &self.access())
            .finish_non_exhaustive()
    }
}

/// Poll an optional cancellation check.
pub fn check(cancel: Option<&CancelFunc>) -> FsResult<()> {
    match cancel {
        Some(f) if f() => Err(FsError::Cancelled),
        _ => Ok(()),
    }
}
