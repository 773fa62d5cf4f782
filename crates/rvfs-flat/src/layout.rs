//! Files under a flat repository directory.
//!
//! ```text
//! <root>/
//!   format           repository format number
//!   uuid             repository UUID
//!   current          "<youngest> <next-node> <next-copy>"
//!   txn-current      last transaction sequence number handed out
//!   locks.json       lock table
//!   revs/<N>         framed revision file (see `revfile`)
//!   revprops/<N>     JSON revision properties
//!   txns/<name>.txn  framed transaction state
//! ```
//!
//! Every file is replaced atomically through a temporary file in the same
//! directory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rvfs_types::Revnum;
use tempfile::NamedTempFile;

use crate::error::{FlatError, FlatResult};

pub const FORMAT: u32 = 1;

pub const FORMAT_FILE: &str = "format";
pub const UUID_FILE: &str = "uuid";
pub const CURRENT_FILE: &str = "current";
pub const TXN_CURRENT_FILE: &str = "txn-current";
pub const LOCKS_FILE: &str = "locks.json";
pub const REVS_DIR: &str = "revs";
pub const REVPROPS_DIR: &str = "revprops";
pub const TXNS_DIR: &str = "txns";
pub const TXN_EXT: &str = "txn";

/// Prefix of temporary files; anything carrying it is garbage after a
/// crash.
pub const TMP_PREFIX: &str = ".tmp";

/// Paths of one repository.
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> PathBuf {
        self.root.join(FORMAT_FILE)
    }

    pub fn uuid(&self) -> PathBuf {
        self.root.join(UUID_FILE)
    }

    pub fn current(&self) -> PathBuf {
        self.root.join(CURRENT_FILE)
    }

    pub fn txn_current(&self) -> PathBuf {
        self.root.join(TXN_CURRENT_FILE)
    }

    pub fn locks(&self) -> PathBuf {
        self.root.join(LOCKS_FILE)
    }

    pub fn revs_dir(&self) -> PathBuf {
        self.root.join(REVS_DIR)
    }

    pub fn rev(&self, rev: Revnum) -> PathBuf {
        self.revs_dir().join(rev.to_string())
    }

    pub fn revprops_dir(&self) -> PathBuf {
        self.root.join(REVPROPS_DIR)
    }

    pub fn revprops(&self, rev: Revnum) -> PathBuf {
        self.revprops_dir().join(rev.to_string())
    }

    pub fn txns_dir(&self) -> PathBuf {
        self.root.join(TXNS_DIR)
    }

    pub fn txn(&self, name: &str) -> PathBuf {
        self.txns_dir().join(format!("{name}.{TXN_EXT}"))
    }

    pub fn create_dirs(&self) -> FlatResult<()> {
        for dir in [self.revs_dir(), self.revprops_dir(), self.txns_dir()] {
            fs::create_dir_all(&dir).map_err(|e| FlatError::io(&dir, e))?;
        }
        Ok(())
    }
}

/// Replace `path` with `data` in one step.
pub fn write_atomic(path: &Path, data: &[u8], fsync: bool) -> FlatResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(TMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| FlatError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| FlatError::io(tmp.path(), e))?;
    if fsync {
        tmp.as_file().sync_all().map_err(|e| FlatError::io(tmp.path(), e))?;
    }
    persist(tmp, path)
}

fn persist(tmp: NamedTempFile, path: &Path) -> FlatResult<()> {
    tmp.persist(path)
        .map(|_| ())
        .map_err(|e| FlatError::io(path, e.error))
}

/// Read a whole file, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> FlatResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FlatError::io(path, e)),
    }
}

pub fn read_string(path: &Path) -> FlatResult<String> {
    fs::read_to_string(path).map_err(|e| FlatError::io(path, e))
}

/// Contents of the `current` file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Current {
    pub youngest: Revnum,
    pub next_node: u64,
    pub next_copy: u64,
}

impl Current {
    pub fn initial() -> Self {
        Self {
            youngest: Revnum::ZERO,
            next_node: 1,
            next_copy: 1,
        }
    }

    pub fn read(layout: &Layout) -> FlatResult<Self> {
        let path = layout.current();
        let text = read_string(&path)?;
        let damaged = |reason: &str| FlatError::Damaged {
            path: path.clone(),
            reason: reason.to_string(),
        };
        let fields: Vec<u64> = text
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| damaged("non-numeric field"))?;
        match fields.as_slice() {
            [youngest, next_node, next_copy] => Ok(Self {
                youngest: Revnum::new(*youngest),
                next_node: *next_node,
                next_copy: *next_copy,
            }),
            _ => Err(damaged("expected three fields")),
        }
    }

    pub fn write(&self, layout: &Layout, fsync: bool) -> FlatResult<()> {
        let text = format!("{} {} {}\n", self.youngest, self.next_node, self.next_copy);
        write_atomic(&layout.current(), text.as_bytes(), fsync)
    }
}
