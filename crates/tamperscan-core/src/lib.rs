//! Container image audit for post-install tampering of RPM-owned files.
//!
//! `tamperscan-core` finds the image layer holding the RPM package database,
//! builds the set of files package installation wrote, and checks every
//! later layer for writes, deletions and symlinks that touch those files
//! outside an exclusion policy.
//!
//! # Examples
//!
//! ```no_run
//! use tamperscan_core::AuditConfig;
//! use tamperscan_core::NoopObserver;
//! use tamperscan_core::audit_image;
//! use tamperscan_core::image::OciLayoutOptions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let outcome = audit_image(
//!     "/path/to/oci-layout",
//!     &OciLayoutOptions::default(),
//!     &AuditConfig::default(),
//!     &mut NoopObserver,
//! )?;
//! println!("verdict: {}", outcome.verdict());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod baseline;
pub mod changes;
pub mod config;
pub mod copy;
pub mod database;
pub mod error;
pub mod exclusion;
pub mod image;
pub mod io;
pub mod report;
pub mod rpmdb;
pub mod types;

#[doc(hidden)]
pub mod test_utils;

// Re-export main API types
pub use audit::AuditOutcome;
pub use audit::Verdict;
pub use audit::audit_image;
pub use audit::audit_layers;
pub use audit::build_image_baseline;
pub use audit::find_package_database;
pub use baseline::Baseline;
pub use baseline::BaselinePolicy;
pub use changes::ChangeSet;
pub use changes::layer_changes;
pub use config::AuditConfig;
pub use database::DatabaseLookup;
pub use database::PackageDatabase;
pub use database::extract_package_database;
pub use error::AuditError;
pub use error::ErrorCategory;
pub use error::Result;
pub use exclusion::ExclusionPolicy;
pub use exclusion::ExclusionReason;
pub use image::Layer;
pub use report::AuditObserver;
pub use report::AuditReport;
pub use report::AuditState;
pub use report::DatabaseLayer;
pub use report::NoopObserver;

// Re-export types module for easier access
pub use types::Change;
pub use types::ChangeKind;
pub use types::NormalizedPath;
