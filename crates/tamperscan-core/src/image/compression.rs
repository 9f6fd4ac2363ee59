//! Layer blob compression detection.
//!
//! Layer blobs are stored either as plain tar or compressed with gzip or
//! zstd. The codec is detected from the leading magic bytes rather than the
//! descriptor media type, which some registries get wrong.

use std::io::BufRead;
use std::io::Read;

/// Compression codec of a layer blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionCodec {
    /// Uncompressed tar.
    None,
    /// Gzip (deflate).
    Gzip,
    /// Zstandard.
    Zstd,
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

impl CompressionCodec {
    /// Detects the codec from the first bytes of a blob.
    ///
    /// # Examples
    ///
    /// ```
    /// use tamperscan_core::image::compression::CompressionCodec;
    ///
    /// assert_eq!(CompressionCodec::detect(&[0x1f, 0x8b, 0x08]), CompressionCodec::Gzip);
    /// assert_eq!(CompressionCodec::detect(b"usr/"), CompressionCodec::None);
    /// ```
    #[must_use]
    pub fn detect(prefix: &[u8]) -> Self {
        if prefix.starts_with(&GZIP_MAGIC) {
            Self::Gzip
        } else if prefix.starts_with(&ZSTD_MAGIC) {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Returns the codec name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        }
    }
}

/// Wraps `reader` in the decoder its magic bytes call for.
pub fn decompress<'a, R: BufRead + 'a>(
    mut reader: R,
) -> std::io::Result<(CompressionCodec, Box<dyn Read + 'a>)> {
    let codec = CompressionCodec::detect(reader.fill_buf()?);
    let stream: Box<dyn Read + 'a> = match codec {
        CompressionCodec::None => Box::new(reader),
        CompressionCodec::Gzip => Box::new(flate2::bufread::GzDecoder::new(reader)),
        CompressionCodec::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(reader)?),
    };
    Ok((codec, stream))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::gzip;

    fn read_all(data: &[u8]) -> (CompressionCodec, Vec<u8>) {
        let (codec, mut stream) = decompress(data).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        (codec, out)
    }

    #[test]
    fn test_plain_passthrough() {
        let (codec, out) = read_all(b"plain tar bytes");
        assert_eq!(codec, CompressionCodec::None);
        assert_eq!(out, b"plain tar bytes");
    }

    #[test]
    fn test_gzip_stream() {
        let compressed = gzip(b"layer content");
        let (codec, out) = read_all(&compressed);
        assert_eq!(codec, CompressionCodec::Gzip);
        assert_eq!(out, b"layer content");
    }

    #[test]
    fn test_zstd_stream() {
        let compressed = zstd::encode_all(&b"layer content"[..], 3).unwrap();
        let (codec, out) = read_all(&compressed);
        assert_eq!(codec, CompressionCodec::Zstd);
        assert_eq!(out, b"layer content");
    }

    #[test]
    fn test_empty_blob() {
        let (codec, out) = read_all(b"");
        assert_eq!(codec, CompressionCodec::None);
        assert!(out.is_empty());
    }

    #[test]
    fn test_codec_names() {
        assert_eq!(CompressionCodec::Gzip.name(), "gzip");
        assert_eq!(CompressionCodec::Zstd.name(), "zstd");
        assert_eq!(CompressionCodec::None.name(), "none");
    }
}
