use serde::{Deserialize, Serialize};

/// What, if anything, lives at a path in a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Nothing exists at the path.
    None,
    File,
    Dir,
}

impl NodeKind {
    pub fn exists(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::File => write!(f, "file"),
            Self::Dir => write!(f, "dir"),
        }
    }
}

/// How a path was touched by a transaction or revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathChangeKind {
    /// Contents or properties changed in place.
    Modify,
    Add,
    Delete,
    /// Deleted and re-added within the same transaction.
    Replace,
}

impl std::fmt::Display for PathChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Modify => write!(f, "M"),
            Self::Add => write!(f, "A"),
            Self::Delete => write!(f, "D"),
            Self::Replace => write!(f, "R"),
        }
    }
}
