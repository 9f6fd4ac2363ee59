//! Changes command implementation.

use super::CommandStatus;
use super::open_image;
use crate::cli::ChangesArgs;
use crate::cli::LayerSelector;
use crate::error::add_image_context;
use crate::output::OutputFormatter;
use anyhow::Result;
use anyhow::bail;
use tamperscan_core::Layer;
use tamperscan_core::image::BlobLayer;
use tamperscan_core::layer_changes;

pub fn execute(args: &ChangesArgs, formatter: &dyn OutputFormatter) -> Result<CommandStatus> {
    let image = open_image(&args.image)?;
    let layer = select_layer(image.layers(), &LayerSelector::parse(&args.layer))?;

    tracing::debug!(layer = layer.digest(), "listing layer changes");

    let changes = add_image_context(layer_changes(layer), &args.image.layout)?;
    formatter.format_changes(&changes)?;
    Ok(CommandStatus::Clean)
}

fn select_layer<'a>(layers: &'a [BlobLayer], selector: &LayerSelector) -> Result<&'a BlobLayer> {
    match selector {
        LayerSelector::Index(index) => match layers.get(*index) {
            Some(layer) => Ok(layer),
            None => bail!(
                "layer index {index} is out of range, the image has {} layers",
                layers.len()
            ),
        },
        LayerSelector::Digest(digest) => match layers.iter().find(|l| l.digest() == digest) {
            Some(layer) => Ok(layer),
            None => bail!("no layer with digest {digest} in the image"),
        },
    }
}
