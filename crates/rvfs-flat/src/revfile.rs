//! Framed binary files: revision files and transaction state.
//!
//! On-disk format:
//! ```text
//! [4 bytes: magic]
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode)]
//! ```
//!
//! A file that fails any of these checks is reported as damaged rather
//! than partially read.

use std::collections::BTreeMap;
use std::path::Path;

use rvfs_types::Revnum;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{FlatError, FlatResult};
use crate::id::FlatId;
use crate::layout::{self, Current};
use crate::noderev::{ChangeRecord, NodeRev};

pub const REV_MAGIC: [u8; 4] = *b"RVR1";
pub const TXN_MAGIC: [u8; 4] = *b"RVT1";

const HEADER_SIZE: usize = 12;

/// Everything committed in one revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionFile {
    pub rev: Revnum,
    pub root: FlatId,
    /// Node-revisions created in this revision, by [`FlatId::key`].
    pub nodes: BTreeMap<String, NodeRev>,
    pub changes: BTreeMap<String, ChangeRecord>,
    /// Counters as of the end of this revision, for rebuilding `current`.
    pub next_node: u64,
    pub next_copy: u64,
}

impl RevisionFile {
    pub fn counters(&self) -> Current {
        Current {
            youngest: self.rev,
            next_node: self.next_node,
            next_copy: self.next_copy,
        }
    }
}

pub fn encode<T: Serialize>(magic: [u8; 4], value: &T, path: &Path) -> FlatResult<Vec<u8>> {
    let payload = bincode::serialize(value).map_err(|e| FlatError::Encode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let length = u32::try_from(payload.len()).map_err(|_| FlatError::Encode {
        path: path.to_path_buf(),
        reason: format!("payload of {} bytes is too large", payload.len()),
    })?;
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&magic);
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

pub fn decode<T: DeserializeOwned>(magic: [u8; 4], data: &[u8], path: &Path) -> FlatResult<T> {
    let damaged = |reason: String| FlatError::Damaged {
        path: path.to_path_buf(),
        reason,
    };
    if data.len() < HEADER_SIZE {
        return Err(damaged(format!("{} bytes is shorter than the header", data.len())));
    }
    let (header, payload) = data.split_at(HEADER_SIZE);
    if header[..4] != magic {
        return Err(damaged("bad magic".into()));
    }
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let expected_crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    if payload.len() != length {
        return Err(damaged(format!(
            "payload is {} bytes, header says {length}",
            payload.len()
        )));
    }
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(damaged(format!(
            "CRC mismatch (expected {expected_crc:08x}, actual {actual_crc:08x})"
        )));
    }
    bincode::deserialize(payload).map_err(|e| FlatError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn write<T: Serialize>(magic: [u8; 4], value: &T, path: &Path, fsync: bool) -> FlatResult<()> {
    let data = encode(magic, value, path)?;
    layout::write_atomic(path, &data, fsync)
}

/// Read a framed file; `None` if it does not exist.
pub fn read<T: DeserializeOwned>(magic: [u8; 4], path: &Path) -> FlatResult<Option<T>> {
    match layout::read_optional(path)? {
        Some(data) => decode(magic, &data, path).map(Some),
        None => Ok(None),
    }
}
