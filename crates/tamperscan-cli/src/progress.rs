//! Progress bar implementation for CLI operations.

use crate::output::short_digest;
use console::Term;
use console::style;
use indicatif::ProgressBar;
use indicatif::ProgressStyle;
use std::time::Duration;
use tamperscan_core::AuditObserver;
use tamperscan_core::AuditState;
use tamperscan_core::Baseline;
use tamperscan_core::ChangeSet;
use tamperscan_core::NormalizedPath;

/// CLI progress bar wrapper implementing `AuditObserver`.
///
/// Shows a spinner while the package database is located, then a bar over
/// the scanned layers. Layers with disallowed modifications are announced
/// above the bar. Automatically cleans up on drop.
pub struct CliProgress {
    bar: ProgressBar,
    layer_findings: usize,
}

impl CliProgress {
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            layer_findings: 0,
        }
    }

    /// Checks if we should show progress (TTY detection).
    #[must_use]
    pub fn should_show() -> bool {
        Term::stdout().is_term()
    }

    fn switch_to_bar(&self, total: usize) {
        // Template: "Scanning [████████░░░░] 2/5 layers 0123456789ab"
        self.bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} [{bar:40.cyan/blue}] {pos}/{len} layers {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        self.bar.set_prefix("Scanning");
        self.bar.set_length(total as u64);
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

impl AuditObserver for CliProgress {
    fn on_state(&mut self, state: AuditState) {
        match state {
            AuditState::Searching => self.bar.set_message("Searching for the package database"),
            AuditState::Done | AuditState::TrivialPass | AuditState::NoDatabaseFound => {
                self.bar.finish_and_clear();
            }
            AuditState::BaselineBuilt | AuditState::Scanning => {}
        }
    }

    fn on_database_probe(&mut self, index: usize, digest: &str, found: bool) {
        if found {
            self.bar.println(format!(
                "{} Package database found in layer {index} [{}]",
                style("✓").green(),
                short_digest(digest)
            ));
        } else {
            self.bar.set_message(format!(
                "Searching for the package database (layer {index})"
            ));
        }
    }

    fn on_baseline_built(&mut self, baseline: &Baseline) {
        self.bar
            .set_message(format!("Tracking {} installed files", baseline.len()));
    }

    fn on_layer_start(&mut self, digest: &str, current: usize, total: usize) {
        if current == 1 {
            self.switch_to_bar(total);
        }
        self.layer_findings = 0;
        self.bar.set_message(short_digest(digest).to_string());
    }

    fn on_disallowed(&mut self, _digest: &str, _path: &NormalizedPath, _owner: &str) {
        self.layer_findings += 1;
    }

    fn on_layer_complete(&mut self, changes: &ChangeSet) {
        if self.layer_findings > 0 {
            self.bar.println(format!(
                "{} {} disallowed modifications in layer [{}]",
                style("✗").red().bold(),
                self.layer_findings,
                short_digest(&changes.digest)
            ));
        }
        self.bar.inc(1);
    }
}
