//! Canonical form of archive and package-database paths.

use std::borrow::Borrow;
use std::fmt;

use serde::Serialize;

/// The root path, preserved verbatim by normalization.
pub const ROOT: &str = "/";

/// A path in canonical comparison form.
///
/// Archive entries, symlink targets and installed-file names from the package
/// database all spell the same file differently (`/usr/bin/ls`,
/// `./usr/bin/ls`, `usr//bin/./ls`). `NormalizedPath` is the one spelling
/// used as a map key everywhere in the audit.
///
/// # Invariants
///
/// - Never begins with `/`, except for the root path itself, which is `/`
/// - Contains no empty, `.` or `..` components
/// - The empty relative path is represented as `.`
///
/// # Examples
///
/// ```
/// use tamperscan_core::types::NormalizedPath;
///
/// assert_eq!(NormalizedPath::new("/my/path").as_str(), "my/path");
/// assert_eq!(NormalizedPath::new("./this/that").as_str(), "this/that");
/// assert_eq!(NormalizedPath::new("/a/../b").as_str(), "b");
/// assert_eq!(NormalizedPath::new("/").as_str(), "/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NormalizedPath(String);

impl NormalizedPath {
    /// Normalizes `raw` into canonical form.
    ///
    /// Leading separators are stripped and the remainder is cleaned
    /// lexically. `..` never climbs above the image root: a `..` with nothing
    /// left to pop is dropped. Only an input made of separators alone is the
    /// root `/`; any other path that cleans down to nothing is `.`.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b == b'/') {
            return Self(ROOT.to_string());
        }

        let mut parts: Vec<&str> = Vec::new();
        for component in raw.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }

        if parts.is_empty() {
            return Self(".".to_string());
        }
        Self(parts.join("/"))
    }

    /// Normalizes `name` relative to the directory `base`.
    ///
    /// Absolute names ignore `base`. Used for relative symlink targets,
    /// which are interpreted against the directory holding the link.
    #[must_use]
    pub fn resolve(base: &Self, name: &str) -> Self {
        if name.starts_with('/') || base.is_root() || base.0 == "." {
            return Self::new(name);
        }
        Self::new(&format!("{}/{name}", base.0))
    }

    /// Returns the canonical string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the root path `/`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == ROOT
    }

    /// Returns the final component, or the whole path for single-component
    /// paths and the root.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }

    /// Returns the parent directory.
    ///
    /// Single-component paths have the root as parent; the root and `.` have
    /// no parent.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() || self.0 == "." {
            return None;
        }
        Some(match self.0.rsplit_once('/') {
            Some((dir, _)) => Self(dir.to_string()),
            None => Self(ROOT.to_string()),
        })
    }

    /// Returns this path with the final component replaced by `name`.
    #[must_use]
    pub fn with_file_name(&self, name: &str) -> Self {
        match self.parent() {
            Some(parent) => Self::resolve(&parent, name),
            None => Self::new(name),
        }
    }

    /// Returns `true` if `self` equals `dir` or lies strictly below it on a
    /// component boundary.
    ///
    /// `etcetera/x` is not below `etc`. Every path is below the root.
    #[must_use]
    pub fn is_within(&self, dir: &str) -> bool {
        if dir == ROOT {
            return true;
        }
        let dir = dir.trim_end_matches('/');
        self.0 == dir
            || self
                .0
                .strip_prefix(dir)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Consumes the path and returns the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NormalizedPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NormalizedPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Normalizes a raw path string; shorthand for [`NormalizedPath::new`].
#[must_use]
pub fn normalize(raw: &str) -> NormalizedPath {
    NormalizedPath::new(raw)
}
