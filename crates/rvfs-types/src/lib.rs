//! Foundation types for RVFS, the revisioned tree filesystem.
//!
//! This crate holds the plain value types shared by the filesystem core
//! (`rvfs-fs`) and every storage backend. Nothing here performs I/O.
//!
//! # Key Types
//!
//! - [`Revnum`] / [`RevisionSpec`] -- committed revision numbers and the
//!   "youngest" marker
//! - [`Version`] -- exact-match software version used by the backend loader
//! - [`NodeKind`] / [`PathChangeKind`] -- tree node classification
//! - [`Lock`] -- an exclusive reservation on one path
//! - [`Checksum`] -- BLAKE3 content checksum
//! - [`TextDelta`] -- minimal copy/insert delta between two byte strings
//! - [`path`] / [`xml`] -- path syntax and comment safety checks

pub mod checksum;
pub mod delta;
pub mod error;
pub mod lock;
pub mod node;
pub mod path;
pub mod props;
pub mod revision;
pub mod version;
pub mod xml;

pub use checksum::Checksum;
pub use delta::{DeltaOp, TextDelta};
pub use error::TypeError;
pub use lock::Lock;
pub use node::{NodeKind, PathChangeKind};
pub use props::{PropMap, PROP_REVISION_AUTHOR, PROP_REVISION_DATE};
pub use revision::{RevisionSpec, Revnum};
pub use version::Version;
