//! Lock requests and the checks the core applies before a backend sees them.

use chrono::{DateTime, TimeZone, Utc};
use rvfs_types::{path, xml, Revnum};

use crate::error::{FsError, FsResult};

/// Parameters of one lock acquisition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LockRequest {
    /// Path to lock, canonicalized by the handle before dispatch.
    pub path: String,
    /// Caller-chosen token. The backend generates one when `None`.
    pub token: Option<String>,
    pub comment: Option<String>,
    /// Lock created on behalf of a proxying protocol layer.
    pub is_dav_comment: bool,
    /// Expiration as microseconds since the Unix epoch. Zero never expires.
    pub expires_at: i64,
    /// The revision the caller believes the path is at. Locking fails as
    /// out of date if the path changed after it.
    pub current_rev: Option<Revnum>,
    /// Take over an existing lock instead of failing.
    pub steal: bool,
}

impl LockRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn dav_comment(mut self, is_dav_comment: bool) -> Self {
        self.is_dav_comment = is_dav_comment;
        self
    }

    pub fn expires_at(mut self, micros: i64) -> Self {
        self.expires_at = micros;
        self
    }

    pub fn current_rev(mut self, rev: Revnum) -> Self {
        self.current_rev = Some(rev);
        self
    }

    pub fn steal(mut self, steal: bool) -> Self {
        self.steal = steal;
        self
    }

    /// Structural checks that do not depend on any stored state.
    pub fn validate(&self) -> FsResult<()> {
        if let Some(comment) = &self.comment {
            if !xml::is_xml_safe(comment) {
                return Err(FsError::UnsafeComment);
            }
        }
        if self.expires_at < 0 {
            return Err(FsError::InvalidParameter(format!(
                "negative lock expiration {}",
                self.expires_at
            )));
        }
        Ok(())
    }

    /// The expiration as a timestamp, `None` if the lock never expires.
    pub fn expiration_date(&self) -> FsResult<Option<DateTime<Utc>>> {
        if self.expires_at == 0 {
            return Ok(None);
        }
        Utc.timestamp_micros(self.expires_at)
            .single()
            .map(Some)
            .ok_or_else(|| {
                FsError::InvalidParameter(format!("lock expiration {} out of range", self.expires_at))
            })
    }

    pub(crate) fn canonicalized(&self) -> Self {
        Self {
            path: path::canonicalize(&self.path),
            ..self.clone()
        }
    }
}
