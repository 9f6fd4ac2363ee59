//! Paths exempt from tamper reporting.
//!
//! Some files owned by packages are expected to change in any deployed
//! image: runtime state, variable data and host configuration written by the
//! container engine. The exclusion policy lists them. It is static
//! configuration and applies regardless of which package owns the path.

use std::collections::BTreeSet;

use crate::types::NormalizedPath;

const DEFAULT_EXCLUDED_DIRECTORIES: &[&str] = &["etc", "var", "run"];

// A directory can appear with or without a trailing separator depending on
// how the archive spelled it, so both forms are listed.
const DEFAULT_EXCLUDED_PATHS: &[&str] = &[
    "etc/resolv.conf",
    "etc/hostname",
    "etc",
    "etc/",
    "run",
    "run/",
];

/// Which rule exempted a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// The path equals or lies below an excluded directory.
    Directory,
    /// The path matches an excluded path exactly.
    Path,
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Directory => f.write_str("directory"),
            Self::Path => f.write_str("file"),
        }
    }
}

/// Excluded directory prefixes and exact paths.
///
/// # Examples
///
/// ```
/// use tamperscan_core::ExclusionPolicy;
/// use tamperscan_core::types::NormalizedPath;
///
/// let policy = ExclusionPolicy::default();
/// assert!(policy.is_excluded(&NormalizedPath::new("etc/passwd")));
/// assert!(!policy.is_excluded(&NormalizedPath::new("usr/bin/ls")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionPolicy {
    directories: BTreeSet<String>,
    paths: BTreeSet<String>,
}

impl Default for ExclusionPolicy {
    /// The standard policy.
    ///
    /// - directories: `etc`, `var`, `run`
    /// - paths: `etc/resolv.conf`, `etc/hostname`, `etc`, `etc/`, `run`,
    ///   `run/`
    fn default() -> Self {
        Self {
            directories: DEFAULT_EXCLUDED_DIRECTORIES
                .iter()
                .map(ToString::to_string)
                .collect(),
            paths: DEFAULT_EXCLUDED_PATHS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl ExclusionPolicy {
    /// Creates a policy that exempts nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            directories: BTreeSet::new(),
            paths: BTreeSet::new(),
        }
    }

    /// Adds an excluded directory. Leading separators are ignored.
    pub fn with_directory(mut self, dir: impl AsRef<str>) -> Self {
        let dir = dir.as_ref().trim_start_matches('/');
        self.directories.insert(dir.trim_end_matches('/').to_string());
        self
    }

    /// Adds an excluded exact path, with and without a trailing separator.
    pub fn with_path(mut self, path: impl AsRef<str>) -> Self {
        let path = path.as_ref().trim_start_matches('/');
        let bare = path.trim_end_matches('/');
        self.paths.insert(bare.to_string());
        self.paths.insert(format!("{bare}/"));
        self
    }

    /// Returns the excluded exact paths.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Returns `true` if `path` equals or lies below an excluded directory.
    ///
    /// Matching is on component boundaries: `etcetera/x` is not below `etc`.
    #[must_use]
    pub fn directory_excludes(&self, path: &NormalizedPath) -> bool {
        self.directories.iter().any(|dir| path.is_within(dir))
    }

    /// Returns `true` if `path` matches an excluded path literally.
    #[must_use]
    pub fn path_excludes(&self, path: &NormalizedPath) -> bool {
        self.paths.contains(path.as_str())
    }

    /// Returns the rule that exempts `path`, if any.
    ///
    /// The exact-path rule is reported first when both apply.
    #[must_use]
    pub fn check(&self, path: &NormalizedPath) -> Option<ExclusionReason> {
        if self.path_excludes(path) {
            Some(ExclusionReason::Path)
        } else if self.directory_excludes(path) {
            Some(ExclusionReason::Directory)
        } else {
            None
        }
    }

    /// Returns `true` if either rule exempts `path`.
    #[must_use]
    pub fn is_excluded(&self, path: &NormalizedPath) -> bool {
        self.check(path).is_some()
    }
}
