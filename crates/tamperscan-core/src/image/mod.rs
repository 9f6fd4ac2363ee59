//! Image sources: ordered layers with digests and uncompressed streams.
//!
//! The audit only ever needs two things from a layer: the digest that names
//! it in the report, and a fresh stream of its uncompressed tar archive.
//! Every image source implements [`Layer`] for its layer type.

pub mod compression;
mod memory;
mod oci_layout;

use std::io::Read;

use crate::Result;

pub use memory::MemoryLayer;
pub use oci_layout::BlobLayer;
pub use oci_layout::OciLayout;
pub use oci_layout::OciLayoutOptions;

/// One image layer.
///
/// Each call to [`uncompressed`](Layer::uncompressed) opens a new stream from
/// the start of the archive; the stream is closed when dropped.
pub trait Layer {
    /// Content digest, `sha256:<hex>`.
    fn digest(&self) -> &str;

    /// Opens the layer's uncompressed tar stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be opened, fails verification, or
    /// uses an unreadable compression.
    fn uncompressed(&self) -> Result<Box<dyn Read + '_>>;
}

impl<L: Layer + ?Sized> Layer for &L {
    fn digest(&self) -> &str {
        (**self).digest()
    }

    fn uncompressed(&self) -> Result<Box<dyn Read + '_>> {
        (**self).uncompressed()
    }
}

impl<L: Layer + ?Sized> Layer for Box<L> {
    fn digest(&self) -> &str {
        (**self).digest()
    }

    fn uncompressed(&self) -> Result<Box<dyn Read + '_>> {
        (**self).uncompressed()
    }
}
