//! Property tables.
//!
//! Properties are string-keyed, opaque byte-string values attached to
//! revisions, transactions, and nodes.

use std::collections::BTreeMap;

/// A property table. Values are opaque bytes.
pub type PropMap = BTreeMap<String, Vec<u8>>;

/// Revision property naming the committing user.
pub const PROP_REVISION_AUTHOR: &str = "rvfs:author";

/// Revision property holding the commit time (RFC 3339, UTC).
pub const PROP_REVISION_DATE: &str = "rvfs:date";

/// Apply a change to a property table: `Some` sets, `None` deletes.
pub fn apply_change(props: &mut PropMap, name: &str, value: Option<&[u8]>) {
    match value {
        Some(v) => {
            props.insert(name.to_string(), v.to_vec());
        }
        None => {
            props.remove(name);
        }
    }
}
