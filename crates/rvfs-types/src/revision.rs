use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A committed revision number.
///
/// Revision 0 is the empty tree every filesystem starts with. Each
/// successful commit produces the next number; numbers are never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revnum(u64);

impl Revnum {
    /// The initial, empty revision.
    pub const ZERO: Self = Self(0);

    pub const fn new(rev: u64) -> Self {
        Self(rev)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The revision that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The revision before this one, or `None` for revision 0.
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl fmt::Debug for Revnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for Revnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Revnum {
    fn from(rev: u64) -> Self {
        Self(rev)
    }
}

impl From<Revnum> for u64 {
    fn from(rev: Revnum) -> Self {
        rev.0
    }
}

impl FromStr for Revnum {
    type Err = TypeError;

    /// Accepts `"12"` as well as `"r12"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_prefix('r').unwrap_or(s.trim());
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| TypeError::InvalidRevision(s.to_string()))
    }
}

/// Selects the base of a new transaction: a fixed revision or whatever is
/// youngest at the moment of the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevisionSpec {
    Youngest,
    Number(Revnum),
}

impl From<Revnum> for RevisionSpec {
    fn from(rev: Revnum) -> Self {
        Self::Number(rev)
    }
}
