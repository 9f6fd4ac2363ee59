//! Value types shared across the audit pipeline.
//!
//! Paths are compared only in their normalized form, so every path that
//! enters the pipeline (archive entry names, symlink targets, installed file
//! names) is converted to [`NormalizedPath`] at the boundary.

pub mod change;
pub mod normalized_path;

pub use change::Change;
pub use change::ChangeKind;
pub use normalized_path::NormalizedPath;
pub use normalized_path::normalize;
