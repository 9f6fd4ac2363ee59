//! JSON artifact files written by the audit command.

use anyhow::Context;
use anyhow::Result;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tamperscan_core::AuditReport;
use tamperscan_core::Baseline;
use tamperscan_core::ChangeSet;

/// Baseline artifact.
pub const FILEMAP: &str = "filemap.json";

/// Disallowed modification artifact.
pub const DISALLOWED: &str = "disallowedmods.json";

/// Returns the artifact name for one scanned layer.
pub fn layer_artifact_name(digest: &str) -> String {
    format!("modified-in-{digest}.json")
}

/// Paths of the artifacts written for one audit.
#[derive(Debug, Default, Serialize)]
pub struct WrittenArtifacts {
    pub files: Vec<PathBuf>,
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

/// Writes every artifact of a completed audit into `dir`.
///
/// Layer artifacts are written for every scanned layer, in image order,
/// followed by the baseline and the disallowed map.
pub fn write_report(dir: &Path, report: &AuditReport) -> Result<WrittenArtifacts> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let mut written = WrittenArtifacts::default();
    for changes in &report.layers {
        written.files.push(write_changes(dir, changes)?);
    }
    written.files.push(write_baseline(dir, &report.baseline)?);

    let path = dir.join(DISALLOWED);
    write_json(&path, &report.disallowed)?;
    written.files.push(path);

    Ok(written)
}

fn write_changes(dir: &Path, changes: &ChangeSet) -> Result<PathBuf> {
    let path = dir.join(layer_artifact_name(&changes.digest));
    write_json(&path, changes)?;
    Ok(path)
}

fn write_baseline(dir: &Path, baseline: &Baseline) -> Result<PathBuf> {
    let path = dir.join(FILEMAP);
    write_json(&path, baseline)?;
    Ok(path)
}
