//! Minimal text deltas.
//!
//! A [`TextDelta`] rebuilds a target byte string from a source byte string
//! with two instructions: copy a range of the source, or insert new bytes.
//! Deltas are computed with the `similar` crate (Myers diff over bytes).

use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffTag};

use crate::error::TypeError;

/// One delta instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaOp {
    /// Copy `len` bytes of the source starting at `offset`.
    Source { offset: usize, len: usize },
    /// Insert literal bytes.
    New(Vec<u8>),
}

/// An ordered list of delta instructions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDelta {
    pub ops: Vec<DeltaOp>,
}

impl TextDelta {
    /// A delta that ignores its source and produces `target`.
    pub fn full(target: &[u8]) -> Self {
        if target.is_empty() {
            return Self::default();
        }
        Self {
            ops: vec![DeltaOp::New(target.to_vec())],
        }
    }

    /// Compute a delta turning `source` into `target`.
    pub fn compute(source: &[u8], target: &[u8]) -> Self {
        if source.is_empty() {
            return Self::full(target);
        }

        let mut delta = Self::default();
        for op in capture_diff_slices(Algorithm::Myers, source, target) {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            match tag {
                DiffTag::Equal => delta.push(DeltaOp::Source {
                    offset: old_range.start,
                    len: old_range.len(),
                }),
                DiffTag::Insert | DiffTag::Replace => {
                    delta.push(DeltaOp::New(target[new_range].to_vec()))
                }
                DiffTag::Delete => {}
            }
        }
        delta
    }

    /// Rebuild the target from `source`.
    pub fn apply(&self, source: &[u8]) -> Result<Vec<u8>, TypeError> {
        let mut out = Vec::with_capacity(self.target_len());
        for op in &self.ops {
            match op {
                DeltaOp::Source { offset, len } => {
                    let end = offset.checked_add(*len).ok_or_else(|| {
                        TypeError::InvalidDelta("source range overflows".into())
                    })?;
                    let chunk = source.get(*offset..end).ok_or_else(|| {
                        TypeError::InvalidDelta(format!(
                            "source range {offset}..{end} exceeds source length {}",
                            source.len()
                        ))
                    })?;
                    out.extend_from_slice(chunk);
                }
                DeltaOp::New(data) => out.extend_from_slice(data),
            }
        }
        Ok(out)
    }

    /// Length of the target this delta produces.
    pub fn target_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Source { len, .. } => *len,
                DeltaOp::New(data) => data.len(),
            })
            .sum()
    }

    /// Number of literal bytes carried by the delta.
    pub fn new_data_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::New(data) => data.len(),
                DeltaOp::Source { .. } => 0,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    // Adjacent instructions of the same kind are coalesced.
    fn push(&mut self, op: DeltaOp) {
        if let Some(last) = self.ops.last_mut() {
            match (last, &op) {
                (DeltaOp::New(prev), DeltaOp::New(data)) => {
                    prev.extend_from_slice(data);
                    return;
                }
                (
                    DeltaOp::Source { offset, len },
                    DeltaOp::Source {
                        offset: next_offset,
                        len: next_len,
                    },
                ) if *offset + *len == *next_offset => {
                    *len += *next_len;
                    return;
                }
                _ => {}
            }
        }
        self.ops.push(op);
    }
}
