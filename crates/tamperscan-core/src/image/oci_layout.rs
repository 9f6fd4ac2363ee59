//! OCI image-layout directories.
//!
//! ```text
//! <layout>/
//!   oci-layout            {"imageLayoutVersion": "1.0.0"}
//!   index.json            image index naming one or more manifests
//!   blobs/<alg>/<hex>     content-addressed blobs
//! ```
//!
//! The top-level index is resolved to a single image manifest, descending
//! through nested image indexes, and the manifest's layers become
//! [`BlobLayer`]s in manifest order.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use super::Layer;
use super::compression;
use crate::AuditError;
use crate::Result;
use crate::io::HashingReader;

const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";
const MAX_INDEX_DEPTH: usize = 4;
const PREFERRED_OS: &str = "linux";
const PREFERRED_ARCH: &str = "amd64";

/// Options for opening an OCI layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OciLayoutOptions {
    /// Manifest to select by its `org.opencontainers.image.ref.name`
    /// annotation. Without it the first `linux/amd64` entry is used, or the
    /// first entry when none matches.
    pub reference: Option<String>,

    /// Hash every blob and compare with its digest before use.
    pub verify_digests: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    #[serde(default)]
    media_type: Option<String>,
    digest: String,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    #[serde(default)]
    platform: Option<Platform>,
}

#[derive(Debug, Deserialize)]
struct Platform {
    #[serde(default)]
    architecture: String,
    #[serde(default)]
    os: String,
}

/// Either an image index or an image manifest; both are read through the
/// same shape and told apart by which list is present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Option<Vec<Descriptor>>,
    #[serde(default)]
    layers: Option<Vec<Descriptor>>,
}

fn is_index_media_type(media_type: Option<&str>) -> bool {
    matches!(
        media_type,
        Some(
            "application/vnd.oci.image.index.v1+json"
                | "application/vnd.docker.distribution.manifest.list.v2+json"
        )
    )
}

/// A layer blob stored in an OCI layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLayer {
    digest: String,
    path: PathBuf,
    media_type: Option<String>,
    verify: bool,
}

impl BlobLayer {
    /// Returns the descriptor media type, when present.
    #[must_use]
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }
}

impl Layer for BlobLayer {
    fn digest(&self) -> &str {
        &self.digest
    }

    fn uncompressed(&self) -> Result<Box<dyn Read + '_>> {
        if self.verify {
            verify_blob(&self.path, &self.digest)?;
        }
        let file = File::open(&self.path)?;
        let (codec, stream) = compression::decompress(BufReader::new(file))?;
        tracing::trace!(digest = %self.digest, codec = codec.name(), "opened layer blob");
        Ok(stream)
    }
}

/// An image read from an OCI layout directory.
///
/// # Examples
///
/// ```no_run
/// use tamperscan_core::image::Layer;
/// use tamperscan_core::image::OciLayout;
/// use tamperscan_core::image::OciLayoutOptions;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let image = OciLayout::open("./ubi9-layout", &OciLayoutOptions::default())?;
/// for layer in image.layers() {
///     println!("{}", layer.digest());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OciLayout {
    manifest_digest: String,
    layers: Vec<BlobLayer>,
}

impl OciLayout {
    /// Opens a layout and resolves its image manifest.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidImage`] if the directory is not an OCI
    /// layout, the reference matches nothing, or a document is malformed.
    pub fn open<P: AsRef<Path>>(root: P, options: &OciLayoutOptions) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.join("oci-layout").is_file() {
            return Err(AuditError::InvalidImage(format!(
                "{} is not an OCI image layout (missing oci-layout)",
                root.display()
            )));
        }

        let index_bytes = std::fs::read(root.join("index.json")).map_err(|e| {
            AuditError::InvalidImage(format!("cannot read {}/index.json: {e}", root.display()))
        })?;
        let index: ManifestDocument = parse_document("index.json", &index_bytes)?;
        let manifests = index.manifests.unwrap_or_default();

        let mut descriptor = match &options.reference {
            Some(reference) => manifests
                .into_iter()
                .find(|d| d.annotations.get(REF_NAME_ANNOTATION) == Some(reference))
                .ok_or_else(|| {
                    AuditError::InvalidImage(format!("no manifest named {reference:?} in index"))
                })?,
            None => select_platform(manifests, "index.json")?,
        };

        for _ in 0..MAX_INDEX_DEPTH {
            let bytes = read_blob(&root, &descriptor.digest, options.verify_digests)?;
            let document: ManifestDocument = parse_document(&descriptor.digest, &bytes)?;

            let nested = is_index_media_type(descriptor.media_type.as_deref())
                || is_index_media_type(document.media_type.as_deref())
                || (document.manifests.is_some() && document.layers.is_none());
            if nested {
                tracing::debug!(digest = %descriptor.digest, "descending into nested image index");
                descriptor =
                    select_platform(document.manifests.unwrap_or_default(), &descriptor.digest)?;
                continue;
            }

            let layers = document
                .layers
                .unwrap_or_default()
                .into_iter()
                .map(|layer| {
                    Ok(BlobLayer {
                        path: blob_path(&root, &layer.digest)?,
                        digest: layer.digest,
                        media_type: layer.media_type,
                        verify: options.verify_digests,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            tracing::debug!(
                manifest = %descriptor.digest,
                layers = layers.len(),
                "resolved image manifest"
            );
            return Ok(Self {
                manifest_digest: descriptor.digest,
                layers,
            });
        }

        Err(AuditError::InvalidImage(format!(
            "image indexes nest deeper than {MAX_INDEX_DEPTH} levels"
        )))
    }

    /// Returns the digest of the resolved image manifest.
    #[must_use]
    pub fn manifest_digest(&self) -> &str {
        &self.manifest_digest
    }

    /// Returns the layers, oldest first.
    #[must_use]
    pub fn layers(&self) -> &[BlobLayer] {
        &self.layers
    }
}

fn parse_document(name: &str, bytes: &[u8]) -> Result<ManifestDocument> {
    serde_json::from_slice(bytes)
        .map_err(|e| AuditError::InvalidImage(format!("malformed image document {name}: {e}")))
}

fn select_platform(mut manifests: Vec<Descriptor>, source: &str) -> Result<Descriptor> {
    if manifests.is_empty() {
        return Err(AuditError::InvalidImage(format!("{source} lists no manifests")));
    }
    let preferred = manifests.iter().position(|d| {
        d.platform
            .as_ref()
            .is_some_and(|p| p.os == PREFERRED_OS && p.architecture == PREFERRED_ARCH)
    });
    Ok(manifests.swap_remove(preferred.unwrap_or(0)))
}

/// Maps a digest onto its blob file, rejecting digests that would escape
/// the blob store.
fn blob_path(root: &Path, digest: &str) -> Result<PathBuf> {
    let invalid = || AuditError::InvalidImage(format!("invalid blob digest {digest:?}"));
    let (algorithm, hex) = digest.split_once(':').ok_or_else(invalid)?;

    let algorithm_ok = !algorithm.is_empty()
        && algorithm
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"+._-".contains(&b));
    let hex_ok = !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_alphanumeric());
    if !algorithm_ok || !hex_ok {
        return Err(invalid());
    }
    Ok(root.join("blobs").join(algorithm).join(hex))
}

fn read_blob(root: &Path, digest: &str, verify: bool) -> Result<Vec<u8>> {
    let path = blob_path(root, digest)?;
    let bytes = std::fs::read(&path).map_err(|e| {
        AuditError::InvalidImage(format!("cannot read blob {digest}: {e}"))
    })?;
    if verify {
        let actual = crate::io::hashing::sha256_digest(&bytes);
        check_digest(digest, actual)?;
    }
    Ok(bytes)
}

fn verify_blob(path: &Path, digest: &str) -> Result<()> {
    let mut reader = HashingReader::new(BufReader::new(File::open(path)?));
    std::io::copy(&mut reader, &mut std::io::sink())?;
    check_digest(digest, reader.digest())
}

fn check_digest(expected: &str, actual: String) -> Result<()> {
    if !expected.starts_with("sha256:") {
        return Err(AuditError::InvalidImage(format!(
            "cannot verify {expected}: only sha256 digests are supported"
        )));
    }
    if actual != expected {
        return Err(AuditError::DigestMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
