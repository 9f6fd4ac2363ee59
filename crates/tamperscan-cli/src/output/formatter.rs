//! Output formatter trait for CLI results.

use crate::artifacts::WrittenArtifacts;
use anyhow::Result;
use serde::Serialize;
use tamperscan_core::AuditOutcome;
use tamperscan_core::Baseline;
use tamperscan_core::ChangeSet;
use tamperscan_core::DatabaseLayer;

/// Common output formatter trait
pub trait OutputFormatter {
    /// Format audit result
    fn format_audit_result(
        &self,
        outcome: &AuditOutcome,
        artifacts: Option<&WrittenArtifacts>,
    ) -> Result<()>;

    /// Format an image baseline
    fn format_baseline(&self, database: &DatabaseLayer, baseline: &Baseline) -> Result<()>;

    /// Format one layer's change set
    fn format_changes(&self, changes: &ChangeSet) -> Result<()>;

    /// Format error message
    fn format_error(&self, error: &anyhow::Error);

    /// Format warning message
    fn format_warning(&self, message: &str);
}

/// Generic JSON output structure
#[derive(Debug, Serialize)]
pub struct JsonOutput<T> {
    pub operation: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn success(operation: impl Into<String>, data: T) -> Self {
        Self {
            operation: operation.into(),
            status: Status::Success,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(operation: impl Into<String>, error: impl Into<String>) -> JsonOutput<()> {
        JsonOutput {
            operation: operation.into(),
            status: Status::Error,
            data: None,
            error: Some(error.into()),
        }
    }
}
