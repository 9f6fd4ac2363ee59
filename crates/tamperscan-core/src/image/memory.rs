use std::io::Read;

use super::Layer;
use super::compression;
use crate::Result;
use crate::io::hashing::sha256_digest;

/// A layer held in memory.
///
/// The bytes may be plain or compressed; they are decompressed on every
/// read like any stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLayer {
    digest: String,
    data: Vec<u8>,
}

impl MemoryLayer {
    /// Creates a layer named by the sha256 digest of `data`.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            digest: sha256_digest(&data),
            data,
        }
    }

    /// Creates a layer with an explicit digest.
    #[must_use]
    pub fn with_digest(digest: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            digest: digest.into(),
            data,
        }
    }

    /// Returns the stored bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Layer for MemoryLayer {
    fn digest(&self) -> &str {
        &self.digest
    }

    fn uncompressed(&self) -> Result<Box<dyn Read + '_>> {
        let (_, stream) = compression::decompress(self.data.as_slice())?;
        Ok(stream)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::gzip;

    #[test]
    fn test_digest_of_content() {
        let layer = MemoryLayer::new(b"abc".to_vec());
        assert_eq!(
            layer.digest(),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_streams_are_fresh_and_decompressed() {
        let layer = MemoryLayer::with_digest("sha256:0", gzip(b"payload"));
        for _ in 0..2 {
            let mut out = Vec::new();
            layer.uncompressed().unwrap().read_to_end(&mut out).unwrap();
            assert_eq!(out, b"payload");
        }
    }
}
