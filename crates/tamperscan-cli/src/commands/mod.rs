//! Subcommand implementations.

pub mod audit;
pub mod baseline;
pub mod changes;
pub mod completion;

use crate::cli::ImageArgs;
use crate::error::add_image_context;
use anyhow::Result;
use tamperscan_core::image::OciLayout;
use tamperscan_core::image::OciLayoutOptions;

/// How a command that ran to completion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Clean,
    Tampered,
}

/// Opens the image selected by `args`.
fn open_image(args: &ImageArgs) -> Result<OciLayout> {
    let options = OciLayoutOptions {
        reference: args.reference.clone(),
        verify_digests: args.verify_digests,
    };
    add_image_context(OciLayout::open(&args.layout, &options), &args.layout)
}
