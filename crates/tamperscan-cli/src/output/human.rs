//! Human-readable output formatter with colors and styling.

use super::formatter::OutputFormatter;
use super::short_digest;
use crate::artifacts::WrittenArtifacts;
use anyhow::Result;
use console::Term;
use console::style;
use tamperscan_core::AuditOutcome;
use tamperscan_core::Baseline;
use tamperscan_core::ChangeSet;
use tamperscan_core::DatabaseLayer;
use tamperscan_core::Verdict;

pub struct HumanFormatter {
    verbose: bool,
    quiet: bool,
    use_colors: bool,
    term: Term,
    err_term: Term,
}

impl HumanFormatter {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            use_colors: console::colors_enabled(),
            term: Term::stdout(),
            err_term: Term::stderr(),
        }
    }

    fn format_number(n: usize) -> String {
        let s = n.to_string();
        let mut result = String::new();
        let mut count = 0;

        for c in s.chars().rev() {
            if count == 3 {
                result.push(',');
                count = 0;
            }
            result.push(c);
            count += 1;
        }

        result.chars().rev().collect()
    }

    fn database_line(database: &DatabaseLayer) -> String {
        format!(
            "  Package database: {} ({}, {} packages) in layer {} [{}]",
            database.path.display(),
            database.format,
            Self::format_number(database.package_count),
            database.index,
            short_digest(&database.digest)
        )
    }

    fn verdict_line(&self, verdict: Verdict) -> String {
        let (symbol, text) = match verdict {
            Verdict::Pass => ("✓", "No disallowed modifications"),
            Verdict::TrivialPass => (
                "✓",
                "Package database is in the final layer, nothing to scan",
            ),
            Verdict::Tampered => ("✗", "Disallowed modifications found"),
        };
        if !self.use_colors {
            return text.to_string();
        }
        let symbol = match verdict {
            Verdict::Tampered => style(symbol).red().bold(),
            Verdict::Pass | Verdict::TrivialPass => style(symbol).green().bold(),
        };
        format!("{symbol} {text}")
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_audit_result(
        &self,
        outcome: &AuditOutcome,
        artifacts: Option<&WrittenArtifacts>,
    ) -> Result<()> {
        let verdict = outcome.verdict();
        // Tampering is reported even in quiet mode
        if self.quiet && verdict.is_pass() {
            return Ok(());
        }

        let _ = self.term.write_line(&self.verdict_line(verdict));
        let _ = self.term.write_line(&Self::database_line(outcome.database()));

        let Some(report) = outcome.report() else {
            return Ok(());
        };

        let _ = self.term.write_line(&format!(
            "  Tracked files: {}",
            Self::format_number(report.baseline.len())
        ));
        let _ = self
            .term
            .write_line(&format!("  Layers scanned: {}", report.layers.len()));

        if !report.disallowed.is_empty() {
            let _ = self.term.write_line("");
            if self.use_colors {
                let _ = self.term.write_line(&format!(
                    "{}",
                    style("Disallowed modifications:").red().bold()
                ));
            } else {
                let _ = self.term.write_line("Disallowed modifications:");
            }
            for (path, digest) in &report.disallowed {
                let owner = report.baseline.owner(path).unwrap_or("-");
                let _ = self.term.write_line(&format!(
                    "  {path}  {owner}  [{}]",
                    short_digest(digest)
                ));
            }
        }

        if self.verbose {
            let _ = self.term.write_line("");
            for changes in &report.layers {
                let _ = self.term.write_line(&format!(
                    "  Layer {}: {} changes, {} disallowed",
                    short_digest(&changes.digest),
                    changes.len(),
                    report.disallowed_in(&changes.digest).count()
                ));
            }
            if let Some(artifacts) = artifacts {
                for file in &artifacts.files {
                    let _ = self.term.write_line(&format!("  Wrote {}", file.display()));
                }
            }
        }

        Ok(())
    }

    fn format_baseline(&self, database: &DatabaseLayer, baseline: &Baseline) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        for (path, owner) in baseline {
            let _ = self.term.write_line(&format!("{path}\t{owner}"));
        }

        if self.verbose {
            let _ = self.term.write_line("");
            let _ = self.term.write_line(&Self::database_line(database));
            let _ = self.term.write_line(&format!(
                "  Tracked files: {}",
                Self::format_number(baseline.len())
            ));
        }

        Ok(())
    }

    fn format_changes(&self, changes: &ChangeSet) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        for change in &changes.changes {
            let marker = match change.kind {
                tamperscan_core::ChangeKind::Written => "W",
                tamperscan_core::ChangeKind::Deleted => "D",
                tamperscan_core::ChangeKind::OpaqueDirectory => "O",
                tamperscan_core::ChangeKind::SymlinkTarget => "L",
            };
            let _ = self.term.write_line(&format!("{marker} {}", change.path));
        }

        if self.verbose {
            let _ = self.term.write_line("");
            let _ = self.term.write_line(&format!(
                "Total: {} changes in layer {}",
                Self::format_number(changes.len()),
                changes.digest
            ));
        }

        Ok(())
    }

    fn format_error(&self, error: &anyhow::Error) {
        // Always show errors, even in quiet mode
        if self.use_colors {
            let _ = self
                .err_term
                .write_line(&format!("{} {error:?}", style("ERROR:").red().bold()));
        } else {
            let _ = self.err_term.write_line(&format!("ERROR: {error:?}"));
        }
    }

    fn format_warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        if self.use_colors {
            let _ = self
                .err_term
                .write_line(&format!("{} {message}", style("⚠").yellow().bold()));
        } else {
            let _ = self.err_term.write_line(&format!("WARNING: {message}"));
        }
    }
}
