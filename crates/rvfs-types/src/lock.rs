use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An exclusive reservation on one path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Absolute path of the locked node.
    pub path: String,
    /// Opaque token proving ownership of the lock.
    pub token: String,
    /// Username that created the lock.
    pub owner: String,
    /// Optional human comment; always safe to embed in XML output.
    pub comment: Option<String>,
    /// Set when the lock was created through a proxying protocol layer.
    pub is_dav_comment: bool,
    pub creation_date: DateTime<Utc>,
    /// `None` means the lock never expires.
    pub expiration_date: Option<DateTime<Utc>>,
}

impl Lock {
    /// Whether the lock has expired as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiration_date {
            Some(expires) => expires <= now,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
