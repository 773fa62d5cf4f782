//! Transactions: named staging areas that become revisions on commit.

use std::fmt;
use std::sync::Arc;

use rvfs_types::{PropMap, Revnum};
use tracing::{debug, info};

use crate::backend::TxnBackend;
use crate::error::FsResult;
use crate::root::{Root, RootKind};

/// An open transaction.
///
/// [`commit`](Self::commit) and [`abort`](Self::abort) consume the value;
/// the name can be reattached later with
/// [`Filesystem::open_txn`](crate::Filesystem::open_txn) while the
/// transaction is still open.
pub struct Transaction {
    name: String,
    base_rev: Revnum,
    fs_type: Arc<str>,
    backend: Box<dyn TxnBackend>,
}

impl Transaction {
    pub(crate) fn new(fs_type: Arc<str>, backend: Box<dyn TxnBackend>) -> Self {
        Self {
            name: backend.name().to_string(),
            base_rev: backend.base_revision(),
            fs_type,
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The revision this transaction was branched from.
    pub fn base_revision(&self) -> Revnum {
        self.base_rev
    }

    /// Merge with the youngest revision and commit.
    ///
    /// On conflict nothing is committed and the error names the first
    /// conflicting path.
    pub fn commit(self) -> FsResult<Revnum> {
        debug!(txn = %self.name, base = %self.base_rev, "committing transaction");
        let rev = self.backend.commit()?;
        info!(txn = %self.name, rev = %rev, "committed transaction");
        Ok(rev)
    }

    /// Discard everything staged in this transaction.
    pub fn abort(self) -> FsResult<()> {
        self.backend.abort()?;
        debug!(txn = %self.name, "aborted transaction");
        Ok(())
    }

    pub fn prop(&self, name: &str) -> FsResult<Option<Vec<u8>>> {
        self.backend.prop(name)
    }

    pub fn proplist(&self) -> FsResult<PropMap> {
        self.backend.proplist()
    }

    /// Set (`Some`) or delete (`None`) a transaction property.
    pub fn change_prop(&self, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        self.backend.change_prop(name, value)
    }

    /// A mutable root over this transaction's tree.
    pub fn root(&self) -> FsResult<Root> {
        let backend = self.backend.root()?;
        Ok(Root::new(
            RootKind::Transaction(self.name.clone()),
            Arc::clone(&self.fs_type),
            backend,
        ))
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("name", &self.name)
            .field("base_rev", &self.base_rev)
            .field("fs_type", &self.fs_type)
            .finish_non_exhaustive()
    }
}
