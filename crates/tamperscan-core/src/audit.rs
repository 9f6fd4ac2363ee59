//! Audit orchestration.
//!
//! ```text
//! Searching ──found in layer i < last──▶ BaselineBuilt ──▶ Scanning ──▶ Done
//!     │                                       │
//!     ├──found in last layer──▶ TrivialPass   └──empty baseline──▶ error
//!     └──no layer holds a database──▶ NoDatabaseFound (error)
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

use crate::AuditError;
use crate::Result;
use crate::baseline::Baseline;
use crate::changes::ChangeSet;
use crate::changes::layer_changes;
use crate::config::AuditConfig;
use crate::database::DatabaseLookup;
use crate::database::PackageDatabase;
use crate::database::extract_package_database;
use crate::exclusion::ExclusionPolicy;
use crate::image::Layer;
use crate::report::AuditObserver;
use crate::report::AuditReport;
use crate::report::AuditState;
use crate::report::DatabaseLayer;
use crate::types::ChangeKind;
use crate::types::NormalizedPath;

/// Final judgement on an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Later layers exist and none touches a tracked file.
    Pass,
    /// The database is in the final layer, so nothing could be modified.
    TrivialPass,
    /// At least one disallowed modification was found.
    Tampered,
}

impl Verdict {
    /// Returns `true` unless tampering was found.
    #[must_use]
    pub const fn is_pass(self) -> bool {
        !matches!(self, Self::Tampered)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::TrivialPass => f.write_str("trivial pass"),
            Self::Tampered => f.write_str("tampered"),
        }
    }
}

/// Result of an audit that ran to a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// The database layer is the final layer; no layer was scanned.
    TrivialPass {
        /// The database layer.
        database: DatabaseLayer,
    },

    /// Every layer after the database layer was scanned.
    Completed(AuditReport),
}

impl AuditOutcome {
    /// Returns the verdict.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::TrivialPass { .. } => Verdict::TrivialPass,
            Self::Completed(report) if report.is_clean() => Verdict::Pass,
            Self::Completed(_) => Verdict::Tampered,
        }
    }

    /// Returns the database layer.
    #[must_use]
    pub fn database(&self) -> &DatabaseLayer {
        match self {
            Self::TrivialPass { database } => database,
            Self::Completed(report) => &report.database,
        }
    }

    /// Returns the report of a completed audit.
    #[must_use]
    pub fn report(&self) -> Option<&AuditReport> {
        match self {
            Self::TrivialPass { .. } => None,
            Self::Completed(report) => Some(report),
        }
    }
}

/// Finds the oldest layer holding a package database.
///
/// Returns the layer index and the database.
///
/// # Errors
///
/// Returns [`AuditError::NoDatabaseFound`] if no layer holds one, or the
/// first lookup error.
pub fn find_package_database<L: Layer>(
    layers: &[L],
    config: &AuditConfig,
    observer: &mut dyn AuditObserver,
) -> Result<(usize, PackageDatabase)> {
    observer.on_state(AuditState::Searching);

    for (index, layer) in layers.iter().enumerate() {
        let lookup = extract_package_database(layer, &config.database_dirs)?;
        observer.on_database_probe(index, layer.digest(), lookup.is_found());
        if let DatabaseLookup::Found(database) = lookup {
            return Ok((index, database));
        }
    }

    observer.on_state(AuditState::NoDatabaseFound);
    Err(AuditError::NoDatabaseFound)
}

/// Finds the database layer and builds its baseline.
///
/// # Errors
///
/// As [`find_package_database`], plus [`AuditError::EmptyBaseline`].
pub fn build_image_baseline<L: Layer>(
    layers: &[L],
    config: &AuditConfig,
    observer: &mut dyn AuditObserver,
) -> Result<(DatabaseLayer, Baseline)> {
    let (index, database) = find_package_database(layers, config, observer)?;
    let database_layer = database_layer(layers, index, &database);
    let baseline = baseline_for(&database_layer, &database, config)?;
    Ok((database_layer, baseline))
}

fn database_layer<L: Layer>(
    layers: &[L],
    index: usize,
    database: &PackageDatabase,
) -> DatabaseLayer {
    DatabaseLayer {
        index,
        digest: layers[index].digest().to_string(),
        format: database.format,
        path: database.path.clone(),
        package_count: database.packages.len(),
    }
}

fn baseline_for(
    database_layer: &DatabaseLayer,
    database: &PackageDatabase,
    config: &AuditConfig,
) -> Result<Baseline> {
    let baseline = Baseline::build(&database.packages, config.baseline_policy);
    if baseline.is_empty() {
        return Err(AuditError::EmptyBaseline {
            digest: database_layer.digest.clone(),
        });
    }
    tracing::info!(
        files = baseline.len(),
        policy = %config.baseline_policy,
        "built baseline"
    );
    Ok(baseline)
}

/// Audits an image given as layers, oldest first.
///
/// # Errors
///
/// Every failure is fatal and returned as the first error encountered:
/// archive and database errors of any layer, [`AuditError::NoDatabaseFound`]
/// and [`AuditError::EmptyBaseline`].
///
/// # Examples
///
/// ```
/// use tamperscan_core::AuditConfig;
/// use tamperscan_core::NoopObserver;
/// use tamperscan_core::Verdict;
/// use tamperscan_core::audit_layers;
/// use tamperscan_core::image::MemoryLayer;
/// use tamperscan_core::test_utils::PackageBlob;
/// use tamperscan_core::test_utils::TarTestBuilder;
/// use tamperscan_core::test_utils::sqlite_database_layer;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let base = sqlite_database_layer(&[PackageBlob::new("bash", "5.1.8", "9.el9")
///     .file("/usr/bin/bash", 0)
///     .build()]);
/// let top = TarTestBuilder::new().add_file("usr/bin/bash", b"evil").build();
/// let layers = [MemoryLayer::new(base), MemoryLayer::new(top)];
///
/// let outcome = audit_layers(&layers, &AuditConfig::default(), &mut NoopObserver)?;
/// assert_eq!(outcome.verdict(), Verdict::Tampered);
/// # Ok(())
/// # }
/// ```
pub fn audit_layers<L: Layer>(
    layers: &[L],
    config: &AuditConfig,
    observer: &mut dyn AuditObserver,
) -> Result<AuditOutcome> {
    let (index, database) = find_package_database(layers, config, observer)?;
    let database_layer = database_layer(layers, index, &database);

    if index + 1 == layers.len() {
        tracing::info!(layer = %database_layer.digest, "package database is in the final layer");
        observer.on_state(AuditState::TrivialPass);
        return Ok(AuditOutcome::TrivialPass {
            database: database_layer,
        });
    }

    let baseline = baseline_for(&database_layer, &database, config)?;
    observer.on_state(AuditState::BaselineBuilt);
    observer.on_baseline_built(&baseline);

    observer.on_state(AuditState::Scanning);
    let remaining = &layers[index + 1..];
    let mut disallowed = BTreeMap::new();
    let mut change_sets = Vec::with_capacity(remaining.len());

    for (position, layer) in remaining.iter().enumerate() {
        observer.on_layer_start(layer.digest(), position + 1, remaining.len());
        let change_set = layer_changes(layer)?;
        classify(&change_set, &baseline, &config.exclusions, &mut disallowed, observer);
        observer.on_layer_complete(&change_set);
        change_sets.push(change_set);
    }

    observer.on_state(AuditState::Done);
    tracing::info!(
        scanned = change_sets.len(),
        disallowed = disallowed.len(),
        "audit complete"
    );
    Ok(AuditOutcome::Completed(AuditReport {
        database: database_layer,
        baseline,
        layers: change_sets,
        disallowed,
    }))
}

/// Records every disallowed path of one layer, overwriting attributions
/// from older layers.
fn classify(
    change_set: &ChangeSet,
    baseline: &Baseline,
    exclusions: &ExclusionPolicy,
    disallowed: &mut BTreeMap<NormalizedPath, String>,
    observer: &mut dyn AuditObserver,
) {
    let digest = change_set.digest.as_str();
    let mut record = |path: &NormalizedPath, owner: &str| {
        if let Some(reason) = exclusions.check(path) {
            tracing::trace!(layer = digest, path = %path, %reason, "excluded");
            observer.on_path_excluded(digest, path, reason);
            return;
        }
        tracing::debug!(layer = digest, path = %path, owner, "disallowed modification");
        observer.on_disallowed(digest, path, owner);
        disallowed.insert(path.clone(), digest.to_string());
    };

    for change in &change_set.changes {
        if change.kind == ChangeKind::OpaqueDirectory {
            for (path, owner) in baseline
                .under(&change.path)
                .filter_map(|path| baseline.owner(path).map(|owner| (path, owner)))
            {
                record(path, owner);
            }
            continue;
        }
        if let Some(owner) = baseline.owner(&change.path) {
            record(&change.path, owner);
        }
    }
}

/// Opens an OCI layout and audits it.
///
/// # Errors
///
/// As [`OciLayout::open`](crate::image::OciLayout::open) and
/// [`audit_layers`].
pub fn audit_image<P: AsRef<std::path::Path>>(
    layout: P,
    options: &crate::image::OciLayoutOptions,
    config: &AuditConfig,
    observer: &mut dyn AuditObserver,
) -> Result<AuditOutcome> {
    let image = crate::image::OciLayout::open(layout, options)?;
    audit_layers(image.layers(), config, observer)
}
