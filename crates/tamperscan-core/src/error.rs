//! Error types for image audits.

use std::path::PathBuf;
use thiserror::Error;

use crate::rpmdb::RpmDbError;

/// Result type alias using `AuditError`.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Broad class of an audit failure.
///
/// Every class is fatal for the run; the class decides how the failure is
/// worded for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input to the audit (unreadable image layout, unknown reference).
    Configuration,
    /// A layer archive could not be read.
    Archive,
    /// A package database was present but could not be parsed.
    DatabaseCorruption,
    /// The image violates an assumption the audit depends on.
    InvariantViolation,
    /// Local I/O failed (scratch area, blob files).
    Io,
}

/// Errors that can occur during an image audit.
#[derive(Error, Debug)]
pub enum AuditError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image source is malformed or the requested image does not exist.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A blob's content does not hash to its digest.
    #[error("digest mismatch for blob {expected}: content hashes to {actual}")]
    DigestMismatch {
        /// Digest the blob is stored under.
        expected: String,
        /// Digest of the bytes actually read.
        actual: String,
    },

    /// A layer's archive stream is malformed.
    #[error("malformed archive in layer {digest}: {reason}")]
    Archive {
        /// Layer digest.
        digest: String,
        /// What went wrong while reading.
        reason: String,
    },

    /// A package database file was found but could not be parsed.
    #[error("corrupt package database {} in layer {digest}: {source}", path.display())]
    DatabaseCorrupt {
        /// Layer digest.
        digest: String,
        /// Database path inside the layer.
        path: PathBuf,
        /// Parser failure.
        #[source]
        source: RpmDbError,
    },

    /// No layer of the image contains a package database.
    #[error("unable to find a valid package database in any layer of the image")]
    NoDatabaseFound,

    /// The package database yielded no trackable files.
    #[error("package database in layer {digest} produced an empty baseline")]
    EmptyBaseline {
        /// Layer digest of the database layer.
        digest: String,
    },
}

impl AuditError {
    /// Returns the failure class of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use tamperscan_core::AuditError;
    /// use tamperscan_core::error::ErrorCategory;
    ///
    /// let err = AuditError::NoDatabaseFound;
    /// assert_eq!(err.category(), ErrorCategory::InvariantViolation);
    ///
    /// let err = AuditError::InvalidImage("missing index.json".into());
    /// assert_eq!(err.category(), ErrorCategory::Configuration);
    /// ```
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) => ErrorCategory::Io,
            Self::InvalidImage(_) => ErrorCategory::Configuration,
            Self::DigestMismatch { .. } | Self::Archive { .. } => ErrorCategory::Archive,
            Self::DatabaseCorrupt { .. } => ErrorCategory::DatabaseCorruption,
            Self::NoDatabaseFound | Self::EmptyBaseline { .. } => {
                ErrorCategory::InvariantViolation
            }
        }
    }

    /// Returns the digest of the layer the error is attributed to, if any.
    #[must_use]
    pub fn layer_digest(&self) -> Option<&str> {
        match self {
            Self::Archive { digest, .. }
            | Self::DatabaseCorrupt { digest, .. }
            | Self::EmptyBaseline { digest } => Some(digest),
            Self::DigestMismatch { expected, .. } => Some(expected),
            _ => None,
        }
    }

    pub(crate) fn archive(digest: &str, err: impl std::fmt::Display) -> Self {
        Self::Archive {
            digest: digest.to_string(),
            reason: err.to_string(),
        }
    }
}
