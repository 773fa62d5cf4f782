//! Node-revision ids of the flat backend.
//!
//! An id has three parts, written `node.copy.origin`:
//!
//! - `node` -- the line of history. Edits keep it; delete-and-recreate and
//!   fresh files get a new one.
//! - `copy` -- which copy of that line this is. `0` until the node is copied.
//! - `origin` -- `rN` for a node-revision committed in revision N, or
//!   `t<txn>` for one that is still mutable inside transaction `<txn>`.
//!
//! Ids minted inside a transaction use `_`-prefixed node and copy numbers.
//! Commit renumbers them from the repository-wide counters.

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use rvfs_fs::{FsError, IdRelation, NodeId, NodeIdBackend};
use rvfs_types::Revnum;
use serde::{Deserialize, Serialize};

use crate::FS_TYPE;

/// Where a node-revision lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Origin {
    Rev(Revnum),
    Txn(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlatId {
    pub node: String,
    pub copy: String,
    pub origin: Origin,
}

impl FlatId {
    pub fn new(node: impl Into<String>, copy: impl Into<String>, origin: Origin) -> Self {
        Self {
            node: node.into(),
            copy: copy.into(),
            origin,
        }
    }

    /// The id of the root directory of revision 0.
    pub fn root_zero() -> Self {
        Self::new("0", "0", Origin::Rev(Revnum::ZERO))
    }

    /// Key of this node-revision inside its revision or transaction.
    pub fn key(&self) -> String {
        format!("{}.{}", self.node, self.copy)
    }

    pub fn is_mutable_in(&self, txn: &str) -> bool {
        matches!(&self.origin, Origin::Txn(name) if name == txn)
    }

    pub fn rev(&self) -> Option<Revnum> {
        match self.origin {
            Origin::Rev(rev) => Some(rev),
            Origin::Txn(_) => None,
        }
    }

    pub fn relation(&self, other: &FlatId) -> IdRelation {
        if self == other {
            IdRelation::Identical
        } else if self.node == other.node {
            IdRelation::Related
        } else {
            IdRelation::Unrelated
        }
    }

    pub fn to_node_id(&self) -> NodeId {
        NodeId::new(FS_TYPE, std::sync::Arc::new(self.clone()))
    }
}

impl fmt::Display for FlatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Origin::Rev(rev) => write!(f, "{}.{}.r{}", self.node, self.copy, rev),
            Origin::Txn(txn) => write!(f, "{}.{}.t{}", self.node, self.copy, txn),
        }
    }
}

fn is_counter(part: &str) -> bool {
    let digits = part.strip_prefix('_').unwrap_or(part);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_alphanumeric())
}

impl FromStr for FlatId {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || FsError::InvalidParameter(format!("malformed flat node id '{s}'"));
        let mut parts = s.splitn(3, '.');
        let (Some(node), Some(copy), Some(origin)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        if !is_counter(node) || !is_counter(copy) {
            return Err(malformed());
        }
        let origin = if let Some(rev) = origin.strip_prefix('r') {
            if rev.is_empty() || !rev.bytes().all(|b| b.is_ascii_digit()) || (rev.len() > 1 && rev.starts_with('0')) {
                return Err(malformed());
            }
            Origin::Rev(rev.parse::<Revnum>().map_err(|_| malformed())?)
        } else if let Some(txn) = origin.strip_prefix('t') {
            if txn.is_empty() || txn.contains('.') || txn.chars().any(char::is_control) {
                return Err(malformed());
            }
            Origin::Txn(txn.to_string())
        } else {
            return Err(malformed());
        };
        Ok(Self::new(node, copy, origin))
    }
}

impl NodeIdBackend for FlatId {
    fn unparse(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    fn compare(&self, other: &dyn NodeIdBackend) -> IdRelation {
        match other.as_any().downcast_ref::<FlatId>() {
            Some(other) => self.relation(other),
            None => IdRelation::Unrelated,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Parse the unparsed form of a flat id.
pub fn parse(data: &[u8]) -> Result<FlatId, FsError> {
    std::str::from_utf8(data)
        .map_err(|_| FsError::InvalidParameter("flat node id is not UTF-8".into()))?
        .parse()
}
