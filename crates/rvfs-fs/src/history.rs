//! Backward walk over a node's history.
//!
//! A [`History`] starts at the location it was created for and moves to
//! older locations one [`History::prev`] at a time. The walk is lazy and
//! cannot be restarted; create a new history to walk again.

use std::fmt;

use rvfs_types::Revnum;
use serde::{Deserialize, Serialize};

use crate::backend::HistoryBackend;
use crate::context::{self, CancelFunc};
use crate::error::FsResult;
use crate::root::Root;

/// One (path, revision) point in a node's lineage.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryLocation {
    pub path: String,
    pub revision: Revnum,
}

impl HistoryLocation {
    pub fn new(path: impl Into<String>, revision: Revnum) -> Self {
        Self {
            path: path.into(),
            revision,
        }
    }
}

impl fmt::Display for HistoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.revision)
    }
}

/// A position in a node's history.
pub struct History {
    backend: Box<dyn HistoryBackend>,
}

impl History {
    pub(crate) fn new(backend: Box<dyn HistoryBackend>) -> Self {
        Self { backend }
    }

    pub fn location(&self) -> HistoryLocation {
        self.backend.location()
    }

    /// Step to the next older interesting location.
    ///
    /// With `cross_copies` unset the walk ends (`None`) instead of following
    /// the node back past the copy that created it.
    pub fn prev(&self, cross_copies: bool) -> FsResult<Option<History>> {
        Ok(self.backend.prev(cross_copies)?.map(History::new))
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("History").field(&self.location()).finish()
    }
}

/// Walk the history of `path` in `root`, newest first, starting with the
/// location itself. Stops after `limit` locations when given, and polls
/// `cancel` before every step.
pub fn collect_locations(
    root: &Root,
    path: &str,
    cross_copies: bool,
    limit: Option<usize>,
    cancel: Option<&CancelFunc>,
) -> FsResult<Vec<HistoryLocation>> {
    let mut locations = Vec::new();
    let mut current = Some(root.node_history(path)?);
    while let Some(history) = current {
        if limit.is_some_and(|max| locations.len() >= max) {
            break;
        }
        context::check(cancel)?;
        locations.push(history.location());
        current = history.prev(cross_copies)?;
    }
    Ok(locations)
}
