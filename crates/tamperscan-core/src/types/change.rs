//! Layer change records.

use serde::Serialize;

use super::NormalizedPath;

/// How a layer entry touches a path.
///
/// All kinds count equally as "touched" when deciding whether a change is
/// disallowed. The kind is kept as evidence in the per-layer artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A regular file was written or overwritten.
    Written,

    /// A whiteout entry deleted the path from lower layers.
    Deleted,

    /// An opaque whiteout hid every lower-layer entry below the directory.
    OpaqueDirectory,

    /// A symbolic link points at the path.
    SymlinkTarget,
}

/// One path touched by a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Change {
    /// Normalized path that was touched.
    pub path: NormalizedPath,

    /// How the path was touched.
    pub kind: ChangeKind,
}

impl Change {
    /// Creates a change record.
    #[must_use]
    pub fn new(path: NormalizedPath, kind: ChangeKind) -> Self {
        Self { path, kind }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_change_serializes_kind_in_snake_case() {
        let change = Change::new(NormalizedPath::new("usr/bin/ls"), ChangeKind::SymlinkTarget);
        let json = serde_json::to_string(&change).unwrap();
        assert_eq!(json, r#"{"path":"usr/bin/ls","kind":"symlink_target"}"#);
    }
}
