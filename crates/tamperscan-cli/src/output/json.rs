//! JSON output formatter for machine-readable results.

use super::formatter::JsonOutput;
use super::formatter::OutputFormatter;
use crate::artifacts::WrittenArtifacts;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::io::{self};
use std::path::PathBuf;
use tamperscan_core::AuditOutcome;
use tamperscan_core::Baseline;
use tamperscan_core::ChangeSet;
use tamperscan_core::DatabaseLayer;
use tamperscan_core::NormalizedPath;
use tamperscan_core::Verdict;

pub struct JsonFormatter;

#[derive(Serialize)]
struct AuditOutput<'a> {
    verdict: Verdict,
    database: &'a DatabaseLayer,
    scanned_layers: usize,
    baseline_files: usize,
    disallowed: Option<&'a BTreeMap<NormalizedPath, String>>,
    artifacts: &'a [PathBuf],
}

impl JsonFormatter {
    fn output<T: Serialize>(value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        writeln!(io::stdout(), "{json}")?;
        Ok(())
    }

    fn audit_output<'a>(
        outcome: &'a AuditOutcome,
        artifacts: Option<&'a WrittenArtifacts>,
    ) -> AuditOutput<'a> {
        let report = outcome.report();
        AuditOutput {
            verdict: outcome.verdict(),
            database: outcome.database(),
            scanned_layers: report.map_or(0, |r| r.layers.len()),
            baseline_files: report.map_or(0, |r| r.baseline.len()),
            disallowed: report.map(|r| &r.disallowed),
            artifacts: artifacts.map(|a| a.files.as_slice()).unwrap_or_default(),
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_audit_result(
        &self,
        outcome: &AuditOutcome,
        artifacts: Option<&WrittenArtifacts>,
    ) -> Result<()> {
        let output = JsonOutput::success("audit", Self::audit_output(outcome, artifacts));
        Self::output(&output)
    }

    fn format_baseline(&self, database: &DatabaseLayer, baseline: &Baseline) -> Result<()> {
        #[derive(Serialize)]
        struct BaselineOutput<'a> {
            database: &'a DatabaseLayer,
            files: &'a Baseline,
        }

        let output = JsonOutput::success(
            "baseline",
            BaselineOutput {
                database,
                files: baseline,
            },
        );
        Self::output(&output)
    }

    fn format_changes(&self, changes: &ChangeSet) -> Result<()> {
        Self::output(&JsonOutput::success("changes", changes))
    }

    fn format_error(&self, error: &anyhow::Error) {
        let output = JsonOutput::<()>::error("unknown", format!("{error:?}"));
        if let Ok(json) = serde_json::to_string_pretty(&output) {
            let _ = writeln!(io::stderr(), "{json}");
        }
    }

    fn format_warning(&self, message: &str) {
        #[derive(Serialize)]
        struct WarningData<'a> {
            message: &'a str,
        }

        let output = JsonOutput::success("warning", WarningData { message });
        if let Ok(json) = serde_json::to_string(&output) {
            let _ = writeln!(io::stderr(), "{json}");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tamperscan_core::rpmdb::DatabaseFormat;

    #[test]
    fn test_trivial_pass_output_structure() {
        let outcome = AuditOutcome::TrivialPass {
            database: DatabaseLayer {
                index: 2,
                digest: "sha256:base".to_string(),
                format: DatabaseFormat::BerkeleyDb,
                path: PathBuf::from("var/lib/rpm/Packages"),
                package_count: 7,
            },
        };

        let data = JsonFormatter::audit_output(&outcome, None);
        let json = serde_json::to_value(JsonOutput::success("audit", data)).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"]["verdict"], "trivial_pass");
        assert_eq!(json["data"]["database"]["format"], "berkeley_db");
        assert_eq!(json["data"]["scanned_layers"], 0);
        assert!(json["data"]["disallowed"].is_null());
    }
}
