//! Baseline command implementation.

use super::CommandStatus;
use super::open_image;
use crate::cli::BaselineArgs;
use crate::error::add_image_context;
use crate::output::OutputFormatter;
use anyhow::Result;
use tamperscan_core::AuditConfig;
use tamperscan_core::NoopObserver;
use tamperscan_core::build_image_baseline;

pub fn execute(args: &BaselineArgs, formatter: &dyn OutputFormatter) -> Result<CommandStatus> {
    let image = open_image(&args.image)?;
    let config = AuditConfig {
        baseline_policy: args.policy.into(),
        ..AuditConfig::default()
    };

    let (database, baseline) = add_image_context(
        build_image_baseline(image.layers(), &config, &mut NoopObserver),
        &args.image.layout,
    )?;

    tracing::debug!(
        layer = database.index,
        files = baseline.len(),
        policy = %config.baseline_policy,
        "built baseline"
    );
    formatter.format_baseline(&database, &baseline)?;
    Ok(CommandStatus::Clean)
}
