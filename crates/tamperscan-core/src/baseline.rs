//! Baseline file map: the files package installation wrote, and who owns them.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::ops::Bound;

use serde::Serialize;

use crate::rpmdb::FileFlags;
use crate::rpmdb::PackageRecord;
use crate::types::NormalizedPath;

/// Which installed files enter the baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BaselinePolicy {
    /// Every installed file; owners are `name-version`.
    Unfiltered,

    /// Installed files without any [`FileFlags::MODIFIABLE`] flag; owners
    /// are `name-version-release`.
    #[default]
    FlagFiltered,
}

impl BaselinePolicy {
    /// Returns `true` if a file with `flags` belongs in the baseline.
    #[must_use]
    pub const fn includes(self, flags: FileFlags) -> bool {
        match self {
            Self::Unfiltered => true,
            Self::FlagFiltered => !flags.intersects(FileFlags::MODIFIABLE),
        }
    }

    /// Returns the owner string recorded for `package`.
    #[must_use]
    pub fn owner(self, package: &PackageRecord) -> String {
        match self {
            Self::Unfiltered => package.nv(),
            Self::FlagFiltered => package.nvr(),
        }
    }
}

impl std::fmt::Display for BaselinePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unfiltered => f.write_str("unfiltered"),
            Self::FlagFiltered => f.write_str("flag-filtered"),
        }
    }
}

/// Normalized installed path mapped to its owning package.
///
/// Iteration and serialization are in sorted path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Baseline {
    files: BTreeMap<NormalizedPath, String>,
}

impl Baseline {
    /// Builds a baseline from packages in database enumeration order.
    ///
    /// When two packages claim the same path, the later one wins.
    #[must_use]
    pub fn build(packages: &[PackageRecord], policy: BaselinePolicy) -> Self {
        let mut files = BTreeMap::new();

        for package in packages {
            let owner = policy.owner(package);
            for file in &package.files {
                if !policy.includes(file.flags) {
                    continue;
                }
                let path = NormalizedPath::new(&file.path);
                if let Some(previous) = files.insert(path, owner.clone()) {
                    tracing::debug!(
                        path = %file.path,
                        previous = %previous,
                        owner = %owner,
                        "baseline path claimed by more than one package"
                    );
                }
            }
        }

        Self { files }
    }

    /// Returns the owner of `path`.
    #[must_use]
    pub fn owner(&self, path: &NormalizedPath) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Returns `true` if `path` is a baseline key.
    #[must_use]
    pub fn contains(&self, path: &NormalizedPath) -> bool {
        self.files.contains_key(path)
    }

    /// Returns the number of paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if no path is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates paths and owners in sorted path order.
    pub fn iter(&self) -> btree_map::Iter<'_, NormalizedPath, String> {
        self.files.iter()
    }

    /// Returns the baseline paths equal to or below `dir`, in sorted order.
    pub fn under<'a>(
        &'a self,
        dir: &'a NormalizedPath,
    ) -> impl Iterator<Item = &'a NormalizedPath> {
        let everything = dir.is_root();
        let start = if everything { "" } else { dir.as_str() };
        self.files
            .range::<str, _>((Bound::Included(start), Bound::Unbounded))
            .map(|(path, _)| path)
            .take_while(move |path| everything || path.as_str().starts_with(start))
            .filter(move |path| path.is_within(dir.as_str()))
    }
}

impl<'a> IntoIterator for &'a Baseline {
    type Item = (&'a NormalizedPath, &'a String);
    type IntoIter = btree_map::Iter<'a, NormalizedPath, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::rpmdb::InstalledFile;

    fn package(name: &str, files: &[(&str, FileFlags)]) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            version: "1.0".to_string(),
            release: "3.el9".to_string(),
            epoch: None,
            arch: Some("x86_64".to_string()),
            files: files
                .iter()
                .map(|(path, flags)| InstalledFile {
                    path: (*path).to_string(),
                    flags: *flags,
                })
                .collect(),
        }
    }

    fn p(raw: &str) -> NormalizedPath {
        NormalizedPath::new(raw)
    }

    #[test]
    fn test_unfiltered_includes_everything() {
        let packages = [package(
            "tzdata",
            &[
                ("/usr/share/zoneinfo/UTC", FileFlags::default()),
                ("/usr/share/doc/tzdata/README", FileFlags::DOC),
            ],
        )];
        let baseline = Baseline::build(&packages, BaselinePolicy::Unfiltered);
        assert_eq!(baseline.len(), 2);
        assert_eq!(baseline.owner(&p("usr/share/zoneinfo/UTC")), Some("tzdata-1.0"));
    }

    #[test]
    fn test_flag_filtered_drops_modifiable_files() {
        let packages = [package(
            "bash",
            &[
                ("/usr/bin/bash", FileFlags::default()),
                ("/etc/bashrc", FileFlags::CONFIG | FileFlags::NOREPLACE),
                ("/usr/share/doc/bash/FAQ", FileFlags::DOC),
                ("/usr/share/licenses/bash/COPYING", FileFlags::LICENSE),
                ("/usr/share/bash/README", FileFlags::README),
                ("/var/log/bash.log", FileFlags::MISSINGOK),
                ("/usr/lib/.build-id/ab", FileFlags::GHOST),
            ],
        )];
        let baseline = Baseline::build(&packages, BaselinePolicy::FlagFiltered);
        let paths: Vec<&str> = baseline.iter().map(|(path, _)| path.as_str()).collect();
        assert_eq!(paths, ["usr/bin/bash", "usr/lib/.build-id/ab"]);
        assert_eq!(baseline.owner(&p("usr/bin/bash")), Some("bash-1.0-3.el9"));
    }

    #[test]
    fn test_last_package_wins_collisions() {
        let shared = [("/usr/lib/shared.so", FileFlags::default())];
        let packages = [package("first", &shared), package("second", &shared)];
        let baseline = Baseline::build(&packages, BaselinePolicy::Unfiltered);
        assert_eq!(baseline.len(), 1);
        assert_eq!(baseline.owner(&p("usr/lib/shared.so")), Some("second-1.0"));
    }

    #[test]
    fn test_paths_are_normalized() {
        let packages = [package("odd", &[("//usr/./bin/../bin/tool", FileFlags::default())])];
        let baseline = Baseline::build(&packages, BaselinePolicy::FlagFiltered);
        assert!(baseline.contains(&p("usr/bin/tool")));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(Baseline::build(&[], BaselinePolicy::Unfiltered).is_empty());
        let packages = [package("docs", &[("/usr/share/doc/x", FileFlags::DOC)])];
        assert!(Baseline::build(&packages, BaselinePolicy::FlagFiltered).is_empty());
    }

    #[test]
    fn test_under_respects_boundaries() {
        let packages = [package(
            "mix",
            &[
                ("/usr/share/doc/a", FileFlags::default()),
                ("/usr/share/doc/sub/b", FileFlags::default()),
                ("/usr/share/doc", FileFlags::default()),
                ("/usr/share/docs/c", FileFlags::default()),
                ("/usr/share/doc-extra", FileFlags::default()),
            ],
        )];
        let baseline = Baseline::build(&packages, BaselinePolicy::Unfiltered);
        let dir = p("usr/share/doc");
        let under: Vec<&str> = baseline.under(&dir).map(NormalizedPath::as_str).collect();
        assert_eq!(under, ["usr/share/doc", "usr/share/doc/a", "usr/share/doc/sub/b"]);

        let root = p("/");
        assert_eq!(baseline.under(&root).count(), 5);
    }

    #[test]
    fn test_serializes_sorted_map() {
        let packages = [package(
            "z",
            &[("/b", FileFlags::default()), ("/a", FileFlags::default())],
        )];
        let baseline = Baseline::build(&packages, BaselinePolicy::Unfiltered);
        let json = serde_json::to_string(&baseline).unwrap();
        assert_eq!(json, r#"{"a":"z-1.0","b":"z-1.0"}"#);
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(BaselinePolicy::default(), BaselinePolicy::FlagFiltered);
        assert_eq!(BaselinePolicy::Unfiltered.to_string(), "unfiltered");
    }
}
