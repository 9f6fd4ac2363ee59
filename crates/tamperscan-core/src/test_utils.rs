//! Test utilities for layer archives, package databases and image layouts.
//!
//! This module provides reusable helpers for building in-memory layer
//! archives, RPM header blobs and both package database formats, reducing
//! code duplication across unit, integration and CLI tests.
//!
//! # Panics
//!
//! All functions in this module may panic on I/O errors since they are
//! designed for test use only where panics are acceptable.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::io::Write;
use std::path::Path;

pub use crate::io::hashing::sha256_digest;
use crate::rpmdb::header::TAG_ARCH;
use crate::rpmdb::header::TAG_BASENAMES;
use crate::rpmdb::header::TAG_DIRINDEXES;
use crate::rpmdb::header::TAG_DIRNAMES;
use crate::rpmdb::header::TAG_EPOCH;
use crate::rpmdb::header::TAG_FILEFLAGS;
use crate::rpmdb::header::TAG_NAME;
use crate::rpmdb::header::TAG_RELEASE;
use crate::rpmdb::header::TAG_VERSION;
use crate::rpmdb::header::TYPE_INT32;
use crate::rpmdb::header::TYPE_STRING;
use crate::rpmdb::header::TYPE_STRING_ARRAY;

/// Builder for layer archives with various entry types.
///
/// Supports files, directories, symlinks, hardlinks, FIFOs and OCI
/// whiteouts.
///
/// # Examples
///
/// ```
/// use tamperscan_core::test_utils::TarTestBuilder;
///
/// let tar_data = TarTestBuilder::new()
///     .add_file("usr/bin/ls", b"content")
///     .add_directory("usr/share/")
///     .add_symlink("usr/bin/dir", "ls")
///     .add_whiteout("usr/bin/vdir")
///     .build();
/// ```
pub struct TarTestBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl TarTestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    fn append(mut self, path: &str, kind: tar::EntryType, mode: u32, data: &[u8]) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_entry_type(kind);
        header.set_cksum();
        self.builder.append_data(&mut header, path, data).unwrap();
        self
    }

    fn append_link(mut self, path: &str, kind: tar::EntryType, target: &str) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o777);
        header.set_entry_type(kind);
        header.set_cksum();
        self.builder
            .append_link(&mut header, path, target)
            .unwrap();
        self
    }

    /// Adds a regular file.
    #[must_use]
    pub fn add_file(self, path: &str, data: &[u8]) -> Self {
        self.append(path, tar::EntryType::Regular, 0o644, data)
    }

    /// Adds a regular file with a custom mode.
    #[must_use]
    pub fn add_file_with_mode(self, path: &str, data: &[u8], mode: u32) -> Self {
        self.append(path, tar::EntryType::Regular, mode, data)
    }

    /// Adds a directory.
    #[must_use]
    pub fn add_directory(self, path: &str) -> Self {
        self.append(path, tar::EntryType::Directory, 0o755, &[])
    }

    /// Adds a symlink.
    #[must_use]
    pub fn add_symlink(self, path: &str, target: &str) -> Self {
        self.append_link(path, tar::EntryType::Symlink, target)
    }

    /// Adds a hardlink.
    #[must_use]
    pub fn add_hardlink(self, path: &str, target: &str) -> Self {
        self.append_link(path, tar::EntryType::Link, target)
    }

    /// Adds a FIFO.
    #[must_use]
    pub fn add_fifo(self, path: &str) -> Self {
        self.append(path, tar::EntryType::Fifo, 0o644, &[])
    }

    /// Adds an OCI whiteout for `path`, as an empty regular file named
    /// `.wh.<name>`.
    #[must_use]
    pub fn add_whiteout(self, path: &str) -> Self {
        let marker = whiteout_name(path);
        self.add_file(&marker, &[])
    }

    /// Adds a whiteout for `path` spelled as a directory entry.
    #[must_use]
    pub fn add_whiteout_directory(self, path: &str) -> Self {
        let marker = whiteout_name(path);
        self.add_directory(&marker)
    }

    /// Adds an opaque whiteout marker inside `dir`.
    #[must_use]
    pub fn add_opaque_whiteout(self, dir: &str) -> Self {
        let dir = dir.trim_end_matches('/');
        self.add_file(&format!("{dir}/.wh..wh..opq"), &[])
    }

    /// Builds and returns the archive bytes.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.builder.into_inner().unwrap()
    }
}

impl Default for TarTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn whiteout_name(path: &str) -> String {
    let path = path.trim_end_matches('/');
    match path.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/.wh.{name}"),
        None => format!(".wh.{path}"),
    }
}

/// Builder for raw RPM header blobs.
///
/// Entries are written in insertion order. Int32 data is aligned to four
/// bytes as RPM does.
#[derive(Debug, Default)]
pub struct HeaderBlobBuilder {
    index: Vec<(i32, u32, u32, u32)>,
    data: Vec<u8>,
}

impl HeaderBlobBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn offset(&self) -> u32 {
        u32::try_from(self.data.len()).unwrap()
    }

    /// Adds a `STRING` tag.
    #[must_use]
    pub fn string(mut self, tag: i32, value: &str) -> Self {
        let offset = self.offset();
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.index.push((tag, TYPE_STRING, offset, 1));
        self
    }

    /// Adds a `STRING_ARRAY` tag.
    #[must_use]
    pub fn string_array(mut self, tag: i32, values: &[&str]) -> Self {
        let offset = self.offset();
        for value in values {
            self.data.extend_from_slice(value.as_bytes());
            self.data.push(0);
        }
        let count = u32::try_from(values.len()).unwrap();
        self.index.push((tag, TYPE_STRING_ARRAY, offset, count));
        self
    }

    /// Adds an `INT32` tag.
    #[must_use]
    pub fn int32(mut self, tag: i32, values: &[i32]) -> Self {
        while self.data.len() % 4 != 0 {
            self.data.push(0);
        }
        let offset = self.offset();
        for value in values {
            self.data.extend_from_slice(&value.to_be_bytes());
        }
        let count = u32::try_from(values.len()).unwrap();
        self.index.push((tag, TYPE_INT32, offset, count));
        self
    }

    /// Serializes the blob.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(8 + self.index.len() * 16 + self.data.len());
        blob.extend_from_slice(&u32::try_from(self.index.len()).unwrap().to_be_bytes());
        blob.extend_from_slice(&self.offset().to_be_bytes());
        for (tag, kind, offset, count) in &self.index {
            blob.extend_from_slice(&tag.to_be_bytes());
            blob.extend_from_slice(&kind.to_be_bytes());
            blob.extend_from_slice(&offset.to_be_bytes());
            blob.extend_from_slice(&count.to_be_bytes());
        }
        blob.extend_from_slice(&self.data);
        blob
    }
}

/// Builder for a package header blob with compressed file names.
///
/// # Examples
///
/// ```
/// use tamperscan_core::rpmdb::header::parse_package;
/// use tamperscan_core::test_utils::PackageBlob;
///
/// let blob = PackageBlob::new("bash", "5.1.8", "9.el9")
///     .file("/usr/bin/bash", 0)
///     .build();
/// assert_eq!(parse_package(&blob).unwrap().files[0].path, "/usr/bin/bash");
/// ```
#[derive(Debug, Clone)]
pub struct PackageBlob {
    name: String,
    version: String,
    release: String,
    epoch: Option<i32>,
    arch: Option<String>,
    files: Vec<(String, u32)>,
}

impl PackageBlob {
    /// Starts a package with the given identity.
    #[must_use]
    pub fn new(name: &str, version: &str, release: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            release: release.to_string(),
            epoch: None,
            arch: None,
            files: Vec::new(),
        }
    }

    /// Sets the epoch.
    #[must_use]
    pub fn epoch(mut self, epoch: i32) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Sets the architecture.
    #[must_use]
    pub fn arch(mut self, arch: &str) -> Self {
        self.arch = Some(arch.to_string());
        self
    }

    /// Adds an installed file with raw `FILEFLAGS` bits.
    #[must_use]
    pub fn file(mut self, path: &str, flags: u32) -> Self {
        self.files.push((path.to_string(), flags));
        self
    }

    /// Serializes the header blob.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut builder = HeaderBlobBuilder::new()
            .string(TAG_NAME, &self.name)
            .string(TAG_VERSION, &self.version)
            .string(TAG_RELEASE, &self.release);
        if let Some(epoch) = self.epoch {
            builder = builder.int32(TAG_EPOCH, &[epoch]);
        }
        if let Some(arch) = &self.arch {
            builder = builder.string(TAG_ARCH, arch);
        }
        if self.files.is_empty() {
            return builder.build();
        }

        let mut dirnames: Vec<String> = Vec::new();
        let mut basenames = Vec::new();
        let mut dirindexes = Vec::new();
        for (path, _) in &self.files {
            let (dir, base) = match path.rsplit_once('/') {
                Some((dir, base)) => (format!("{dir}/"), base),
                None => (String::new(), path.as_str()),
            };
            let index = dirnames.iter().position(|d| *d == dir).unwrap_or_else(|| {
                dirnames.push(dir);
                dirnames.len() - 1
            });
            basenames.push(base);
            dirindexes.push(i32::try_from(index).unwrap());
        }
        #[allow(clippy::cast_possible_wrap)]
        let flags: Vec<i32> = self.files.iter().map(|(_, f)| *f as i32).collect();
        let dirnames: Vec<&str> = dirnames.iter().map(String::as_str).collect();

        builder
            .string_array(TAG_BASENAMES, &basenames)
            .string_array(TAG_DIRNAMES, &dirnames)
            .int32(TAG_DIRINDEXES, &dirindexes)
            .int32(TAG_FILEFLAGS, &flags)
            .build()
    }
}

/// Writes an `rpmdb.sqlite` file holding `blobs` in order.
pub fn write_sqlite_rpmdb(path: &Path, blobs: &[Vec<u8>]) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE Packages (hnum INTEGER PRIMARY KEY AUTOINCREMENT, blob BLOB NOT NULL);",
    )
    .unwrap();
    for blob in blobs {
        conn.execute("INSERT INTO Packages (blob) VALUES (?1)", [blob])
            .unwrap();
    }
}

/// Returns the bytes of an `rpmdb.sqlite` file holding `blobs`.
#[must_use]
pub fn sqlite_rpmdb_bytes(blobs: &[Vec<u8>]) -> Vec<u8> {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("rpmdb.sqlite");
    write_sqlite_rpmdb(&path, blobs);
    std::fs::read(&path).unwrap()
}

const BDB_PAGE_SIZE: usize = 512;
const BDB_PAGE_HEADER: usize = 26;
const BDB_PAIRS_PER_PAGE: usize = 16;

fn put_u16(page: &mut [u8], at: usize, value: usize) {
    page[at..at + 2].copy_from_slice(&u16::try_from(value).unwrap().to_le_bytes());
}

fn put_u32(page: &mut [u8], at: usize, value: usize) {
    page[at..at + 4].copy_from_slice(&u32::try_from(value).unwrap().to_le_bytes());
}

/// Returns a little-endian Berkeley DB hash `Packages` file holding `blobs`.
///
/// Every value is stored off-page. Hash pages come first, then the overflow
/// chains, one per value, in order.
#[must_use]
pub fn bdb_packages_bytes(blobs: &[Vec<u8>]) -> Vec<u8> {
    let chunk = BDB_PAGE_SIZE - BDB_PAGE_HEADER;
    let hash_pages = blobs.len().div_ceil(BDB_PAIRS_PER_PAGE).max(1);

    let mut first_pages = Vec::with_capacity(blobs.len());
    let mut next_free = 1 + hash_pages;
    for blob in blobs {
        first_pages.push(next_free);
        next_free += blob.len().div_ceil(chunk).max(1);
    }
    let last_page = next_free - 1;
    let mut file = vec![0u8; (last_page + 1) * BDB_PAGE_SIZE];

    let meta = &mut file[..BDB_PAGE_SIZE];
    put_u32(meta, 12, 0x0006_1561);
    put_u32(meta, 16, 9);
    put_u32(meta, 20, BDB_PAGE_SIZE);
    meta[25] = 8;
    put_u32(meta, 32, last_page);

    for page_index in 0..hash_pages {
        let page_no = 1 + page_index;
        let page = &mut file[page_no * BDB_PAGE_SIZE..(page_no + 1) * BDB_PAGE_SIZE];
        put_u32(page, 8, page_no);
        page[25] = 13;

        let start = page_index * BDB_PAIRS_PER_PAGE;
        let end = (start + BDB_PAIRS_PER_PAGE).min(blobs.len());
        let mut top = BDB_PAGE_SIZE;
        let mut entries = 0;
        for hnum in start..end {
            top -= 5;
            page[top] = 1;
            put_u32(page, top + 1, hnum + 1);
            put_u16(page, BDB_PAGE_HEADER + entries * 2, top);
            entries += 1;

            top -= 12;
            page[top] = 3;
            put_u32(page, top + 4, first_pages[hnum]);
            put_u32(page, top + 8, blobs[hnum].len());
            put_u16(page, BDB_PAGE_HEADER + entries * 2, top);
            entries += 1;
        }
        put_u16(page, 20, entries);
        put_u16(page, 22, top);
    }

    for (blob, first) in blobs.iter().zip(&first_pages) {
        let chunks: Vec<&[u8]> = if blob.is_empty() {
            vec![&blob[..]]
        } else {
            blob.chunks(chunk).collect()
        };
        for (i, data) in chunks.iter().enumerate() {
            let page_no = first + i;
            let page = &mut file[page_no * BDB_PAGE_SIZE..(page_no + 1) * BDB_PAGE_SIZE];
            put_u32(page, 8, page_no);
            if i + 1 < chunks.len() {
                put_u32(page, 16, page_no + 1);
            }
            put_u16(page, 22, data.len());
            page[25] = 7;
            page[BDB_PAGE_HEADER..BDB_PAGE_HEADER + data.len()].copy_from_slice(data);
        }
    }

    file
}

/// Gzip-compresses `bytes`.
#[must_use]
pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Builder for OCI image-layout directories.
///
/// # Examples
///
/// ```
/// use tamperscan_core::test_utils::OciLayoutBuilder;
/// use tamperscan_core::test_utils::TarTestBuilder;
///
/// let temp = tempfile::TempDir::new().unwrap();
/// let digests = OciLayoutBuilder::new()
///     .layer(TarTestBuilder::new().add_file("hello", b"hi").build())
///     .write(temp.path());
/// assert_eq!(digests.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct OciLayoutBuilder {
    layers: Vec<Vec<u8>>,
    gzip: bool,
    reference: Option<String>,
}

impl OciLayoutBuilder {
    /// Creates a builder with no layers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an uncompressed layer archive.
    #[must_use]
    pub fn layer(mut self, tar: Vec<u8>) -> Self {
        self.layers.push(tar);
        self
    }

    /// Stores layers gzip-compressed.
    #[must_use]
    pub fn gzip(mut self, enabled: bool) -> Self {
        self.gzip = enabled;
        self
    }

    /// Annotates the manifest with a reference name.
    #[must_use]
    pub fn reference(mut self, name: &str) -> Self {
        self.reference = Some(name.to_string());
        self
    }

    /// Writes the layout into `dir` and returns the layer digests in order.
    pub fn write(self, dir: &Path) -> Vec<String> {
        let blobs = dir.join("blobs").join("sha256");
        std::fs::create_dir_all(&blobs).unwrap();

        let store = |bytes: &[u8]| -> (String, usize) {
            let digest = sha256_digest(bytes);
            let hex = digest.trim_start_matches("sha256:");
            std::fs::write(blobs.join(hex), bytes).unwrap();
            (digest, bytes.len())
        };

        let layer_media_type = if self.gzip {
            "application/vnd.oci.image.layer.v1.tar+gzip"
        } else {
            "application/vnd.oci.image.layer.v1.tar"
        };
        let mut digests = Vec::new();
        let mut descriptors = Vec::new();
        for layer in &self.layers {
            let stored = if self.gzip { gzip(layer) } else { layer.clone() };
            let (digest, size) = store(&stored);
            descriptors.push(serde_json::json!({
                "mediaType": layer_media_type,
                "digest": digest,
                "size": size,
            }));
            digests.push(digest);
        }

        let config = serde_json::to_vec(&serde_json::json!({
            "architecture": "amd64",
            "os": "linux",
            "rootfs": { "type": "layers", "diff_ids": [] },
        }))
        .unwrap();
        let (config_digest, config_size) = store(&config);

        let manifest = serde_json::to_vec(&serde_json::json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": config_digest,
                "size": config_size,
            },
            "layers": descriptors,
        }))
        .unwrap();
        let (manifest_digest, manifest_size) = store(&manifest);

        let mut descriptor = serde_json::json!({
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": manifest_digest,
            "size": manifest_size,
        });
        if let Some(reference) = &self.reference {
            descriptor["annotations"] =
                serde_json::json!({ "org.opencontainers.image.ref.name": reference });
        }

        std::fs::write(
            dir.join("oci-layout"),
            br#"{"imageLayoutVersion":"1.0.0"}"#,
        )
        .unwrap();
        let index = serde_json::json!({ "schemaVersion": 2, "manifests": [descriptor] });
        std::fs::write(dir.join("index.json"), serde_json::to_vec(&index).unwrap()).unwrap();

        digests
    }
}

/// Returns a layer archive containing an `rpmdb.sqlite` under
/// `var/lib/rpm`.
#[must_use]
pub fn sqlite_database_layer(blobs: &[Vec<u8>]) -> Vec<u8> {
    TarTestBuilder::new()
        .add_directory("var/")
        .add_directory("var/lib/")
        .add_directory("var/lib/rpm/")
        .add_file("var/lib/rpm/rpmdb.sqlite", &sqlite_rpmdb_bytes(blobs))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tar_builder() {
        let tar_data = TarTestBuilder::new()
            .add_file("file.txt", b"content")
            .add_symlink("link", "file.txt")
            .add_whiteout("dir/gone")
            .build();

        let mut archive = tar::Archive::new(tar_data.as_slice());
        let paths: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(paths, ["file.txt", "link", "dir/.wh.gone"]);
    }

    #[test]
    fn test_whiteout_name() {
        assert_eq!(whiteout_name("usr/bin/ls"), "usr/bin/.wh.ls");
        assert_eq!(whiteout_name("opt/"), ".wh.opt");
    }

    #[test]
    fn test_header_builder_aligns_int32() {
        let blob = HeaderBlobBuilder::new()
            .string(TAG_NAME, "ab")
            .int32(TAG_EPOCH, &[2])
            .build();
        // "ab\0" padded to 4, then one int32
        assert_eq!(&blob[4..8], &8u32.to_be_bytes());
    }
}
