//! Node history walks over committed revisions.

use std::sync::Arc;

use rvfs_fs::{FsError, FsResult, HistoryBackend, HistoryLocation};
use rvfs_types::Revnum;

use crate::id::FlatId;
use crate::repo::Repo;

/// One location in a node's history, with the node-revision that was live
/// there.
pub struct FlatHistory {
    repo: Arc<Repo>,
    path: String,
    rev: Revnum,
    id: FlatId,
}

impl FlatHistory {
    pub fn new(repo: Arc<Repo>, path: impl Into<String>, rev: Revnum, id: FlatId) -> Self {
        Self {
            repo,
            path: path.into(),
            rev,
            id,
        }
    }

    fn step(&self, path: String, rev: Revnum, id: FlatId) -> Box<dyn HistoryBackend> {
        Box::new(Self::new(Arc::clone(&self.repo), path, rev, id))
    }
}

impl HistoryBackend for FlatHistory {
    fn location(&self) -> HistoryLocation {
        HistoryLocation::new(self.path.clone(), self.rev)
    }

    fn prev(&self, cross_copies: bool) -> FsResult<Option<Box<dyn HistoryBackend>>> {
        let node = self.repo.node(&self.id)?;
        let created = node
            .id
            .rev()
            .ok_or_else(|| FsError::Corrupt(format!("history reached uncommitted node '{}'", node.id)))?;

        // Last change before the current location.
        if created < self.rev {
            return Ok(Some(self.step(node.created_path, created, node.id)));
        }

        if let Some(copyfrom) = node.copyfrom {
            if !cross_copies {
                return Ok(None);
            }
            let Some(pred) = node.predecessor else {
                return Ok(None);
            };
            return Ok(Some(self.step(copyfrom.path, copyfrom.rev, pred)));
        }

        let Some(pred) = node.predecessor else {
            return Ok(None);
        };
        let pred_node = self.repo.node(&pred)?;
        let pred_rev = pred
            .rev()
            .ok_or_else(|| FsError::Corrupt(format!("predecessor '{pred}' is not committed")))?;
        Ok(Some(self.step(pred_node.created_path, pred_rev, pred)))
    }
}
