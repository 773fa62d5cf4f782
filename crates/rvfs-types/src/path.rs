//! Filesystem path syntax.
//!
//! Paths inside a tree are `/`-separated and absolute. Callers may omit the
//! leading slash; [`canonicalize`] adds it. Paths handed to a structural
//! mutation must also pass [`check_valid`]:
//! - no empty components (`a//b`, trailing `/`)
//! - no `.` or `..` components
//! - no control characters (U+0000..U+001F, U+007F)

use crate::error::TypeError;

/// The root of every tree.
pub const ROOT: &str = "/";

/// Validate path syntax, returning `Ok(())` if the path may be created.
///
/// # Examples
///
/// ```
/// use rvfs_types::path::check_valid;
///
/// assert!(check_valid("/trunk/src/main.rs").is_ok());
/// assert!(check_valid("trunk/a").is_ok());
/// assert!(check_valid("trunk//a").is_err());
/// assert!(check_valid("trunk/\u{7}bell").is_err());
/// ```
pub fn check_valid(path: &str) -> Result<(), TypeError> {
    if let Some(ch) = path.chars().find(|c| c.is_control()) {
        return Err(invalid(
            path,
            format!("contains control character {:?}", ch),
        ));
    }

    let body = path.strip_prefix('/').unwrap_or(path);
    if body.is_empty() {
        return Ok(());
    }

    for component in body.split('/') {
        if component.is_empty() {
            return Err(invalid(path, "path components must not be empty"));
        }
        if component == "." || component == ".." {
            return Err(invalid(
                path,
                format!("component {component:?} is not allowed"),
            ));
        }
    }

    Ok(())
}

/// Normalize a path to its absolute form: leading `/`, no trailing `/`, no
/// empty or `.` components.
pub fn canonicalize(path: &str) -> String {
    let parts: Vec<&str> = path
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    if parts.is_empty() {
        ROOT.to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// The components of a canonical path, root first. The root itself has none.
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

pub fn is_root(path: &str) -> bool {
    components(path).is_empty()
}

/// Join a directory path and an entry name.
pub fn join(dir: &str, name: &str) -> String {
    let dir = canonicalize(dir);
    if dir == ROOT {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Split a canonical path into its parent directory and final component.
///
/// Returns `None` for the root, which has no parent.
pub fn split(path: &str) -> Option<(String, String)> {
    let mut parts = components(path);
    let name = parts.pop()?.to_string();
    let parent = if parts.is_empty() {
        ROOT.to_string()
    } else {
        format!("/{}", parts.join("/"))
    };
    Some((parent, name))
}

/// Whether `ancestor` is `path` itself or one of its parent directories.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    let a = components(ancestor);
    let p = components(path);
    a.len() <= p.len() && a.iter().zip(p.iter()).all(|(x, y)| x == y)
}

fn invalid(path: &str, reason: impl Into<String>) -> TypeError {
    TypeError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}
