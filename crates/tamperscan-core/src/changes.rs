//! Layer change-set extraction.
//!
//! A layer's tar stream is reduced to the list of paths the layer touches
//! once applied on top of the layers below it:
//!
//! | Entry | Touched path | Kind |
//! |-------|--------------|------|
//! | regular file | the file | [`Written`](ChangeKind::Written) |
//! | regular file or directory `.wh.<name>` | `<name>` | [`Deleted`](ChangeKind::Deleted) |
//! | `.wh..wh..opq` (any type) | containing directory | [`OpaqueDirectory`](ChangeKind::OpaqueDirectory) |
//! | symlink | link target | [`SymlinkTarget`](ChangeKind::SymlinkTarget) |
//!
//! Plain directories, hard links, devices and FIFOs are not reported.

use std::io::Read;

use serde::Serialize;

use crate::AuditError;
use crate::Result;
use crate::image::Layer;
use crate::types::Change;
use crate::types::ChangeKind;
use crate::types::NormalizedPath;

/// Base-name prefix of an OCI whiteout entry.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Base name of the OCI opaque-directory marker.
pub const OPAQUE_MARKER: &str = ".wh..wh..opq";

/// Paths touched by one layer, in archive order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    /// Digest of the layer.
    pub digest: String,

    /// Touched paths.
    pub changes: Vec<Change>,
}

impl ChangeSet {
    /// Returns the number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if the layer touches nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the touched paths, in archive order.
    pub fn paths(&self) -> impl Iterator<Item = &NormalizedPath> {
        self.changes.iter().map(|change| &change.path)
    }
}

/// Computes the change set of a layer.
///
/// # Errors
///
/// Returns [`AuditError::Archive`] if the layer's archive stream is
/// malformed, or the layer's open error if it cannot be read at all.
pub fn layer_changes<L: Layer + ?Sized>(layer: &L) -> Result<ChangeSet> {
    let stream = layer.uncompressed()?;
    archive_changes(layer.digest(), stream)
}

/// Computes the change set of a raw tar stream attributed to `digest`.
///
/// # Errors
///
/// Returns [`AuditError::Archive`] if the stream is not a valid tar archive.
pub fn archive_changes<R: Read>(digest: &str, reader: R) -> Result<ChangeSet> {
    let mut archive = tar::Archive::new(reader);
    let mut changes = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| AuditError::archive(digest, format!("failed to read entries: {e}")))?;

    for entry_result in entries {
        let entry = entry_result
            .map_err(|e| AuditError::archive(digest, format!("failed to read entry: {e}")))?;

        let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let path = NormalizedPath::new(&raw);
        let entry_type = entry.header().entry_type();

        if path.file_name() == OPAQUE_MARKER {
            let dir = path
                .parent()
                .unwrap_or_else(|| NormalizedPath::new(crate::types::normalized_path::ROOT));
            changes.push(Change::new(dir, ChangeKind::OpaqueDirectory));
            continue;
        }

        let change = match entry_type {
            tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::GNUSparse => {
                Some(whiteout_target(&path).map_or_else(
                    || Change::new(path.clone(), ChangeKind::Written),
                    |target| Change::new(target, ChangeKind::Deleted),
                ))
            }
            tar::EntryType::Directory => {
                whiteout_target(&path).map(|target| Change::new(target, ChangeKind::Deleted))
            }
            tar::EntryType::Symlink => {
                let target = entry
                    .link_name_bytes()
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .ok_or_else(|| {
                        AuditError::archive(digest, format!("symlink {raw} has no target"))
                    })?;
                Some(Change::new(
                    symlink_target(&path, &target),
                    ChangeKind::SymlinkTarget,
                ))
            }
            other => {
                tracing::trace!(layer = digest, path = %path, kind = ?other, "ignoring entry");
                None
            }
        };

        if let Some(change) = change {
            changes.push(change);
        }
    }

    tracing::debug!(layer = digest, changes = changes.len(), "computed layer change set");
    Ok(ChangeSet {
        digest: digest.to_string(),
        changes,
    })
}

/// Returns the path a whiteout entry deletes, or `None` for ordinary
/// entries.
fn whiteout_target(path: &NormalizedPath) -> Option<NormalizedPath> {
    let name = path.file_name().strip_prefix(WHITEOUT_PREFIX)?;
    Some(path.with_file_name(name))
}

/// Resolves a symlink target: absolute targets from the image root,
/// relative targets from the directory holding the link.
fn symlink_target(link: &NormalizedPath, target: &str) -> NormalizedPath {
    match link.parent() {
        Some(dir) => NormalizedPath::resolve(&dir, target),
        None => NormalizedPath::new(target),
    }
}
