//! RPM package database reader.
//!
//! Two on-disk formats hold the same payload, one RPM header blob per
//! installed package:
//!
//! - `rpmdb.sqlite`: SQLite database with a `Packages(hnum, blob)` table
//!   (RPM 4.16 and later)
//! - `Packages`: Berkeley DB hash database (older releases)
//!
//! The format is detected from the file content, not its name.
//!
//! # Examples
//!
//! ```no_run
//! use tamperscan_core::rpmdb::RpmDatabase;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut db = RpmDatabase::open("/var/lib/rpm/rpmdb.sqlite")?;
//! for package in db.list_packages()? {
//!     println!("{} ({} files)", package.nvr(), package.files.len());
//! }
//! # Ok(())
//! # }
//! ```

mod bdb;
pub mod header;
mod sqlite;

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors raised while reading a package database.
#[derive(Error, Debug)]
pub enum RpmDbError {
    /// Reading the database file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The SQLite backend rejected the file or query.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The Berkeley DB file is malformed.
    #[error("berkeley db: {0}")]
    BerkeleyDb(String),

    /// A package header blob is malformed.
    #[error("invalid package header: {0}")]
    Header(String),
}

/// On-disk database format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseFormat {
    /// `rpmdb.sqlite`.
    Sqlite,
    /// Berkeley DB hash `Packages`.
    BerkeleyDb,
}

impl std::fmt::Display for DatabaseFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => f.write_str("sqlite"),
            Self::BerkeleyDb => f.write_str("bdb"),
        }
    }
}

/// Per-file attribute flags, as stored in the `FILEFLAGS` header tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FileFlags(u32);

impl FileFlags {
    /// `%config`
    pub const CONFIG: Self = Self(1 << 0);
    /// `%doc`
    pub const DOC: Self = Self(1 << 1);
    /// Icon file (obsolete).
    pub const ICON: Self = Self(1 << 2);
    /// `%config(missingok)`
    pub const MISSINGOK: Self = Self(1 << 3);
    /// `%config(noreplace)`
    pub const NOREPLACE: Self = Self(1 << 4);
    /// Spec file (source packages).
    pub const SPECFILE: Self = Self(1 << 5);
    /// `%ghost`
    pub const GHOST: Self = Self(1 << 6);
    /// `%license`
    pub const LICENSE: Self = Self(1 << 7);
    /// `%readme`
    pub const README: Self = Self(1 << 8);
    /// `%pubkey`
    pub const PUBKEY: Self = Self(1 << 11);
    /// `%artifact`
    pub const ARTIFACT: Self = Self(1 << 12);

    /// Files with any of these flags are expected to be modified after
    /// installation.
    pub const MODIFIABLE: Self = Self(
        Self::CONFIG.0 | Self::DOC.0 | Self::LICENSE.0 | Self::MISSINGOK.0 | Self::README.0,
    );

    /// Creates flags from the raw tag value.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw tag value.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any flag in `other` is set.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for FileFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A file a package claims to have installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledFile {
    /// Absolute path as recorded in the database.
    pub path: String,
    /// Attribute flags.
    pub flags: FileFlags,
}

/// One installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRecord {
    /// Package name.
    pub name: String,
    /// Upstream version.
    pub version: String,
    /// Distribution release.
    pub release: String,
    /// Epoch, when the package declares one.
    pub epoch: Option<i32>,
    /// Architecture, absent for `gpg-pubkey` pseudo-packages.
    pub arch: Option<String>,
    /// Installed files in header order.
    pub files: Vec<InstalledFile>,
}

impl PackageRecord {
    /// Returns `name-version`.
    #[must_use]
    pub fn nv(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Returns `name-version-release`.
    #[must_use]
    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.release)
    }
}

enum Backend {
    Sqlite(rusqlite::Connection),
    BerkeleyDb(bdb::HashDatabase<File>),
}

/// An opened package database.
pub struct RpmDatabase {
    path: PathBuf,
    format: DatabaseFormat,
    backend: Backend,
}

impl std::fmt::Debug for RpmDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpmDatabase")
            .field("path", &self.path)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

impl RpmDatabase {
    /// Opens a database read-only, detecting its format.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RpmDbError> {
        Self::open_with(path.as_ref(), false)
    }

    /// Opens a private copy of a database.
    ///
    /// SQLite databases in WAL mode need write access to their shared-memory
    /// file, which a scratch copy can safely grant.
    pub(crate) fn open_scratch(path: &Path) -> Result<Self, RpmDbError> {
        Self::open_with(path, true)
    }

    fn open_with(path: &Path, writable: bool) -> Result<Self, RpmDbError> {
        let mut magic = [0u8; 16];
        let mut file = File::open(path)?;
        let read = read_prefix(&mut file, &mut magic)?;

        if read == magic.len() && &magic == SQLITE_MAGIC {
            drop(file);
            let conn = sqlite::open(path, writable)?;
            return Ok(Self {
                path: path.to_path_buf(),
                format: DatabaseFormat::Sqlite,
                backend: Backend::Sqlite(conn),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            format: DatabaseFormat::BerkeleyDb,
            backend: Backend::BerkeleyDb(bdb::HashDatabase::open(file)?),
        })
    }

    /// Returns the detected format.
    #[must_use]
    pub fn format(&self) -> DatabaseFormat {
        self.format
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every package, in database enumeration order.
    ///
    /// Any malformed header fails the whole listing.
    pub fn list_packages(&mut self) -> Result<Vec<PackageRecord>, RpmDbError> {
        let blobs = match &mut self.backend {
            Backend::Sqlite(conn) => sqlite::read_blobs(conn)?,
            Backend::BerkeleyDb(db) => db.read_blobs()?,
        };

        blobs
            .iter()
            .map(|blob| header::parse_package(blob))
            .collect()
    }
}

fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_utils::PackageBlob;
    use crate::test_utils::bdb_packages_bytes;
    use crate::test_utils::write_sqlite_rpmdb;
    use tempfile::TempDir;

    fn sample_blobs() -> Vec<Vec<u8>> {
        vec![
            PackageBlob::new("bash", "5.1.8", "9.el9")
                .file("/usr/bin/bash", 0)
                .file("/etc/skel/.bashrc", FileFlags::CONFIG.bits())
                .build(),
            PackageBlob::new("coreutils", "8.32", "35.el9")
                .file("/usr/bin/ls", 0)
                .file("/usr/share/doc/coreutils/README", FileFlags::DOC.bits())
                .build(),
        ]
    }

    #[test]
    fn test_file_flags() {
        let flags = FileFlags::CONFIG | FileFlags::NOREPLACE;
        assert!(flags.contains(FileFlags::CONFIG));
        assert!(flags.intersects(FileFlags::MODIFIABLE));
        assert!(!FileFlags::GHOST.intersects(FileFlags::MODIFIABLE));
        assert_eq!(FileFlags::from_bits(0x100), FileFlags::README);
    }

    #[test]
    fn test_package_identity_strings() {
        let blob = PackageBlob::new("bash", "5.1.8", "9.el9").build();
        let package = header::parse_package(&blob).unwrap();
        assert_eq!(package.nv(), "bash-5.1.8");
        assert_eq!(package.nvr(), "bash-5.1.8-9.el9");
    }

    #[test]
    fn test_open_sqlite_database() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rpmdb.sqlite");
        write_sqlite_rpmdb(&path, &sample_blobs());

        let mut db = RpmDatabase::open(&path).unwrap();
        assert_eq!(db.format(), DatabaseFormat::Sqlite);

        let packages = db.list_packages().unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "bash");
        assert_eq!(packages[1].files[0].path, "/usr/bin/ls");
        assert_eq!(packages[1].files[1].flags, FileFlags::DOC);
    }

    #[test]
    fn test_open_berkeley_database() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Packages");
        std::fs::write(&path, bdb_packages_bytes(&sample_blobs())).unwrap();

        let mut db = RpmDatabase::open(&path).unwrap();
        assert_eq!(db.format(), DatabaseFormat::BerkeleyDb);

        let packages = db.list_packages().unwrap();
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["bash", "coreutils"]);
        assert_eq!(packages[0].files[1].path, "/etc/skel/.bashrc");
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Packages");
        std::fs::write(&path, b"definitely not a database").unwrap();

        assert!(matches!(
            RpmDatabase::open(&path),
            Err(RpmDbError::BerkeleyDb(_))
        ));
    }

    #[test]
    fn test_sqlite_without_packages_table_fails_listing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rpmdb.sqlite");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE Other (x INTEGER);").unwrap();
        drop(conn);

        let result = RpmDatabase::open(&path).and_then(|mut db| db.list_packages());
        assert!(matches!(result, Err(RpmDbError::Sqlite(_))));
    }
}
