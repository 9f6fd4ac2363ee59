//! Reader that digests everything read through it.
//!
//! Blob verification streams the blob through a `HashingReader` and compares
//! the resulting `sha256:<hex>` digest with the digest the blob is stored
//! under.

use std::io::Read;

use sha2::Digest;
use sha2::Sha256;

/// Wrapper reader that hashes the bytes it yields.
///
/// # Examples
///
/// ```
/// use std::io::Read;
/// use tamperscan_core::io::HashingReader;
///
/// let mut reader = HashingReader::new(&b"hello"[..]);
/// let mut out = Vec::new();
/// reader.read_to_end(&mut out)?;
///
/// assert_eq!(
///     reader.digest(),
///     "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
/// );
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R> HashingReader<R> {
    /// Creates a new hashing reader.
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Returns the `sha256:<hex>` digest of the bytes read so far.
    #[must_use]
    pub fn digest(&self) -> String {
        format_digest(&self.hasher.clone().finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

pub(crate) fn format_digest(hash: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(7 + hash.len() * 2);
    out.push_str("sha256:");
    for byte in hash {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Returns the `sha256:<hex>` digest of `bytes`.
#[must_use]
pub fn sha256_digest(bytes: &[u8]) -> String {
    format_digest(&Sha256::digest(bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_reader_empty() {
        let mut reader = HashingReader::new(std::io::empty());
        assert_eq!(std::io::copy(&mut reader, &mut std::io::sink()).unwrap(), 0);
        assert_eq!(
            reader.digest(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hashing_reader_matches_one_shot_digest() {
        let data = vec![7u8; 100_000];
        let mut reader = HashingReader::new(data.as_slice());
        let mut small = [0u8; 333];
        let mut total = 0;
        loop {
            let n = reader.read(&mut small).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 100_000);
        assert_eq!(reader.digest(), sha256_digest(&data));
    }

    #[test]
    fn test_digest_is_idempotent() {
        let mut reader = HashingReader::new(&b"abc"[..]);
        std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
        assert_eq!(reader.digest(), reader.digest());
    }
}
