//! Audit command implementation.

use super::CommandStatus;
use super::open_image;
use crate::artifacts::write_report;
use crate::cli::AuditArgs;
use crate::error::add_image_context;
use crate::output::OutputFormatter;
use crate::progress::CliProgress;
use anyhow::Context;
use anyhow::Result;
use std::env;
use tamperscan_core::AuditConfig;
use tamperscan_core::AuditOutcome;
use tamperscan_core::ExclusionPolicy;
use tamperscan_core::NoopObserver;
use tamperscan_core::audit_layers;

pub fn execute(
    args: &AuditArgs,
    formatter: &dyn OutputFormatter,
    show_progress: bool,
) -> Result<CommandStatus> {
    let image = open_image(&args.image)?;

    let mut config = AuditConfig {
        baseline_policy: args.policy.into(),
        ..AuditConfig::default()
    };
    if args.no_exclusions {
        config.exclusions = ExclusionPolicy::empty();
        formatter.format_warning("exclusion policy disabled, every tracked path is reported");
    }

    tracing::info!(
        layout = %args.image.layout.display(),
        layers = image.layers().len(),
        policy = %config.baseline_policy,
        "starting audit"
    );

    let result = if show_progress {
        let mut progress = CliProgress::new();
        audit_layers(image.layers(), &config, &mut progress)
    } else {
        audit_layers(image.layers(), &config, &mut NoopObserver)
    };
    let outcome = add_image_context(result, &args.image.layout)?;

    let artifacts = match &outcome {
        AuditOutcome::Completed(report) if !args.no_artifacts => {
            let dir = match &args.output_dir {
                Some(dir) => dir.clone(),
                None => env::current_dir().context("failed to get current directory")?,
            };
            let written = write_report(&dir, report)?;
            tracing::debug!(
                dir = %dir.display(),
                files = written.files.len(),
                "wrote audit artifacts"
            );
            Some(written)
        }
        _ => None,
    };

    formatter.format_audit_result(&outcome, artifacts.as_ref())?;

    if outcome.verdict().is_pass() {
        Ok(CommandStatus::Clean)
    } else {
        Ok(CommandStatus::Tampered)
    }
}
