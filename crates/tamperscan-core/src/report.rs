//! Audit reporting: the final report and the observer interface.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::baseline::Baseline;
use crate::changes::ChangeSet;
use crate::exclusion::ExclusionReason;
use crate::rpmdb::DatabaseFormat;
use crate::types::NormalizedPath;

/// The layer the baseline was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseLayer {
    /// Position in the image, oldest layer first.
    pub index: usize,

    /// Layer digest.
    pub digest: String,

    /// Database format.
    pub format: DatabaseFormat,

    /// Database file path inside the layer.
    pub path: PathBuf,

    /// Number of packages read.
    pub package_count: usize,
}

/// Report of a completed audit.
///
/// A path appears in [`disallowed`](Self::disallowed) when it is a baseline
/// key, a later layer touched it, and no exclusion applies. When several
/// layers touch the same path, the newest one is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Where the baseline came from.
    pub database: DatabaseLayer,

    /// Baseline built from the database layer.
    pub baseline: Baseline,

    /// Change set of every layer after the database layer, in image order.
    pub layers: Vec<ChangeSet>,

    /// Disallowed path mapped to the digest of the layer that touched it.
    pub disallowed: BTreeMap<NormalizedPath, String>,
}

impl AuditReport {
    /// Returns `true` if no disallowed modification was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.disallowed.is_empty()
    }

    /// Returns the disallowed paths attributed to the layer `digest`.
    pub fn disallowed_in<'a>(
        &'a self,
        digest: &'a str,
    ) -> impl Iterator<Item = &'a NormalizedPath> {
        self.disallowed
            .iter()
            .filter(move |(_, layer)| layer.as_str() == digest)
            .map(|(path, _)| path)
    }
}

/// Audit state machine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditState {
    /// Looking for the layer holding the package database.
    Searching,
    /// The baseline is built.
    BaselineBuilt,
    /// Walking the layers after the database layer.
    Scanning,
    /// All layers scanned.
    Done,
    /// The database is in the final layer; nothing to scan.
    TrivialPass,
    /// No layer holds a package database.
    NoDatabaseFound,
}

impl std::fmt::Display for AuditState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Searching => "searching",
            Self::BaselineBuilt => "baseline built",
            Self::Scanning => "scanning",
            Self::Done => "done",
            Self::TrivialPass => "trivial pass",
            Self::NoDatabaseFound => "no database found",
        };
        f.write_str(name)
    }
}

/// Receives audit events as they happen.
///
/// Every method has an empty default body, so implementors pick the events
/// they care about. The audit result never depends on the observer.
///
/// # Examples
///
/// ```
/// use tamperscan_core::AuditObserver;
/// use tamperscan_core::types::NormalizedPath;
///
/// #[derive(Default)]
/// struct Collector {
///     findings: Vec<String>,
/// }
///
/// impl AuditObserver for Collector {
///     fn on_disallowed(&mut self, digest: &str, path: &NormalizedPath, owner: &str) {
///         self.findings.push(format!("{path} ({owner}) in {digest}"));
///     }
/// }
/// ```
pub trait AuditObserver: Send {
    /// Called on every state transition.
    fn on_state(&mut self, _state: AuditState) {}

    /// Called after a layer was probed for a package database.
    fn on_database_probe(&mut self, _index: usize, _digest: &str, _found: bool) {}

    /// Called once the baseline is built.
    fn on_baseline_built(&mut self, _baseline: &Baseline) {}

    /// Called before a layer is scanned.
    ///
    /// `current` counts from 1 up to `total` scanned layers.
    fn on_layer_start(&mut self, _digest: &str, _current: usize, _total: usize) {}

    /// Called when a touched baseline path is exempted.
    fn on_path_excluded(
        &mut self,
        _digest: &str,
        _path: &NormalizedPath,
        _reason: ExclusionReason,
    ) {
    }

    /// Called for every disallowed modification.
    fn on_disallowed(&mut self, _digest: &str, _path: &NormalizedPath, _owner: &str) {}

    /// Called after a layer was scanned.
    fn on_layer_complete(&mut self, _changes: &ChangeSet) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl AuditObserver for NoopObserver {}
