use std::fmt;

/// Software version reported by the filesystem core and by every backend.
///
/// The backend loader compares versions with `==`, which requires all four
/// fields to match. [`Version::is_compatible`] is the looser check a backend
/// may apply to the loader that calls it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Pre-release tag, empty for a release build.
    pub tag: &'static str,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32, tag: &'static str) -> Self {
        Self {
            major,
            minor,
            patch,
            tag,
        }
    }

    /// Build a version from the string components Cargo exposes through
    /// `CARGO_PKG_VERSION_*`. Unparseable numbers become 0.
    pub fn from_parts(major: &str, minor: &str, patch: &str, tag: &'static str) -> Self {
        Self {
            major: major.parse().unwrap_or(0),
            minor: minor.parse().unwrap_or(0),
            patch: patch.parse().unwrap_or(0),
            tag,
        }
    }

    /// Whether a component built as `self` can be driven by a caller at
    /// `other`: same major, and `other` is not newer in minor.
    pub fn is_compatible(&self, other: &Version) -> bool {
        self.major == other.major && other.minor <= self.minor
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.tag.is_empty() {
            write!(f, "-{}", self.tag)?;
        }
        Ok(())
    }
}

/// The version of the crate this macro is expanded in.
#[macro_export]
macro_rules! crate_version {
    () => {
        $crate::Version::from_parts(
            env!("CARGO_PKG_VERSION_MAJOR"),
            env!("CARGO_PKG_VERSION_MINOR"),
            env!("CARGO_PKG_VERSION_PATCH"),
            env!("CARGO_PKG_VERSION_PRE"),
        )
    };
}
