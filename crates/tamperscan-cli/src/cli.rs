//! CLI argument parsing using clap.

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use clap_complete::Shell;
use std::path::PathBuf;
use tamperscan_core::BaselinePolicy;

#[derive(Parser)]
#[command(name = "tamperscan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output results in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Audit an image for modified package files
    Audit(AuditArgs),
    /// Print the installed-file baseline of an image
    Baseline(BaselineArgs),
    /// Print the change set of one layer
    Changes(ChangesArgs),
    /// Generate shell completions
    Completion(CompletionArgs),
}

/// Arguments that select an image inside an OCI layout.
#[derive(clap::Args)]
pub struct ImageArgs {
    /// Path to the OCI image layout directory
    #[arg(value_name = "LAYOUT")]
    pub layout: PathBuf,

    /// Image reference (org.opencontainers.image.ref.name) to select
    #[arg(long = "ref", value_name = "NAME")]
    pub reference: Option<String>,

    /// Check every blob against its digest before use
    #[arg(long)]
    pub verify_digests: bool,
}

#[derive(clap::Args)]
pub struct AuditArgs {
    #[command(flatten)]
    pub image: ImageArgs,

    /// Which installed files are tracked
    #[arg(long, value_enum, default_value_t = PolicyArg::Flags)]
    pub policy: PolicyArg,

    /// Directory for the JSON artifacts (default: current directory)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Do not write artifact files
    #[arg(long, conflicts_with = "output_dir")]
    pub no_artifacts: bool,

    /// Report every tracked path, ignoring the exclusion policy
    #[arg(long)]
    pub no_exclusions: bool,
}

#[derive(clap::Args)]
pub struct BaselineArgs {
    #[command(flatten)]
    pub image: ImageArgs,

    /// Which installed files are tracked
    #[arg(long, value_enum, default_value_t = PolicyArg::Flags)]
    pub policy: PolicyArg,
}

#[derive(clap::Args)]
pub struct ChangesArgs {
    #[command(flatten)]
    pub image: ImageArgs,

    /// Layer index (0 is the oldest) or digest
    #[arg(value_name = "LAYER")]
    pub layer: String,
}

#[derive(clap::Args)]
pub struct CompletionArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Baseline policy as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Skip config, doc, license, missingok and readme files
    Flags,
    /// Track every installed file
    Unfiltered,
}

impl From<PolicyArg> for BaselinePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Flags => Self::FlagFiltered,
            PolicyArg::Unfiltered => Self::Unfiltered,
        }
    }
}

/// A `LAYER` argument: a position in the image or a digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSelector {
    Index(usize),
    Digest(String),
}

impl LayerSelector {
    pub fn parse(raw: &str) -> Self {
        raw.parse::<usize>()
            .map_or_else(|_| Self::Digest(raw.to_string()), Self::Index)
    }
}
