//! Error conversion utilities for CLI.
//!
//! Converts tamperscan-core's typed errors (thiserror) into user-friendly
//! contextual errors (anyhow) with actionable guidance.

use anyhow::anyhow;
use std::path::Path;
use tamperscan_core::AuditError;

/// Converts `AuditError` to user-friendly anyhow error with context
pub fn convert_audit_error(err: AuditError, layout: &Path) -> anyhow::Error {
    match err {
        AuditError::NoDatabaseFound => {
            anyhow!(
                "No RPM package database found in any layer of '{}'\n\
                 HINT: Only images built from RPM-based distributions can be audited.",
                layout.display()
            )
        }
        AuditError::EmptyBaseline { digest } => {
            anyhow!(
                "Package database in layer {digest} lists no trackable files\n\
                 HINT: Try --policy unfiltered to track config and documentation files too."
            )
        }
        AuditError::DatabaseCorrupt {
            digest,
            path,
            source,
        } => {
            anyhow!(
                "Corrupt package database {} in layer {digest}: {source}\n\
                 HINT: The layer may have been tampered with to hide its package list.",
                path.display()
            )
        }
        AuditError::Archive { digest, reason } => {
            anyhow!(
                "Malformed archive in layer {digest}: {reason}\n\
                 HINT: The layer blob may be truncated. Re-export the image and use --verify-digests.",
            )
        }
        AuditError::DigestMismatch { expected, actual } => {
            anyhow!(
                "Blob {expected} in '{}' hashes to {actual}\n\
                 HINT: The image layout is corrupted or was modified after export.",
                layout.display()
            )
        }
        AuditError::InvalidImage(reason) => {
            anyhow!(
                "Invalid image layout '{}': {reason}\n\
                 HINT: Expected an OCI image layout directory (oci-layout, index.json, blobs/).",
                layout.display()
            )
        }
        AuditError::Io(io_err) => {
            anyhow!("I/O error while auditing '{}': {io_err}", layout.display())
        }
    }
}

/// Adds image context to an audit result
pub fn add_image_context<T>(result: Result<T, AuditError>, layout: &Path) -> anyhow::Result<T> {
    result.map_err(|e| convert_audit_error(e, layout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_convert_no_database_error() {
        let converted = convert_audit_error(AuditError::NoDatabaseFound, Path::new("image"));
        let msg = format!("{converted:?}");
        assert!(msg.contains("No RPM package database"));
        assert!(msg.contains("image"));
        assert!(msg.contains("HINT"));
    }

    #[test]
    fn test_convert_empty_baseline_error() {
        let err = AuditError::EmptyBaseline {
            digest: "sha256:abc".to_string(),
        };
        let msg = format!("{:?}", convert_audit_error(err, Path::new("image")));
        assert!(msg.contains("sha256:abc"));
        assert!(msg.contains("--policy unfiltered"));
    }

    #[test]
    fn test_convert_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let converted = convert_audit_error(AuditError::Io(io_err), Path::new("image"));
        let msg = format!("{converted:?}");
        assert!(msg.contains("I/O error"));
    }
}
