//! Package database extraction from a layer.
//!
//! The database files of a layer are copied into a private scratch
//! directory, which is then probed for a database the reader can open. The
//! scratch directory is removed when the lookup returns, on every path.

use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use tempfile::TempDir;

use crate::AuditError;
use crate::Result;
use crate::changes::WHITEOUT_PREFIX;
use crate::config::DATABASE_FILE_NAMES;
use crate::copy::CopyBuffer;
use crate::copy::CopyError;
use crate::copy::copy_with_buffer;
use crate::image::Layer;
use crate::rpmdb::DatabaseFormat;
use crate::rpmdb::PackageRecord;
use crate::rpmdb::RpmDatabase;
use crate::types::NormalizedPath;

/// A package database read from a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDatabase {
    /// Database format.
    pub format: DatabaseFormat,

    /// Database file path inside the layer, e.g. `var/lib/rpm/rpmdb.sqlite`.
    pub path: PathBuf,

    /// Installed packages in database enumeration order.
    pub packages: Vec<PackageRecord>,
}

/// Outcome of looking for a package database in one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLookup {
    /// The layer holds a readable database.
    Found(PackageDatabase),

    /// The layer holds no database file.
    NotFound,
}

impl DatabaseLookup {
    /// Returns `true` for [`DatabaseLookup::Found`].
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Looks for a package database in `layer`.
///
/// Entries on or below one of `database_dirs` are materialized, except
/// whiteouts. Afterwards each directory is probed, in order, for
/// `rpmdb.sqlite` and then `Packages`; the first file present is read.
///
/// # Errors
///
/// - [`AuditError::Archive`] if the layer stream is malformed
/// - [`AuditError::DatabaseCorrupt`] if a database file is present but
///   unreadable
/// - [`AuditError::Io`] if the scratch directory cannot be written
pub fn extract_package_database<L: Layer + ?Sized>(
    layer: &L,
    database_dirs: &[String],
) -> Result<DatabaseLookup> {
    let digest = layer.digest();
    let scratch = tempfile::Builder::new().prefix("rpmdb-").tempdir()?;

    let materialized = materialize(layer, database_dirs, &scratch)?;
    if materialized == 0 {
        tracing::trace!(layer = digest, "no database entries in layer");
        return Ok(DatabaseLookup::NotFound);
    }

    for dir in database_dirs {
        let dir = NormalizedPath::new(dir);
        for name in DATABASE_FILE_NAMES {
            let relative = Path::new(dir.as_str()).join(name);
            let candidate = scratch.path().join(&relative);
            if !candidate.is_file() {
                continue;
            }

            let corrupt = |source| AuditError::DatabaseCorrupt {
                digest: digest.to_string(),
                path: relative.clone(),
                source,
            };
            let mut db = RpmDatabase::open_scratch(&candidate).map_err(corrupt)?;
            let format = db.format();
            let packages = db.list_packages().map_err(corrupt)?;

            tracing::info!(
                layer = digest,
                path = %relative.display(),
                %format,
                packages = packages.len(),
                "found package database"
            );
            return Ok(DatabaseLookup::Found(PackageDatabase {
                format,
                path: relative,
                packages,
            }));
        }
    }

    tracing::debug!(
        layer = digest,
        entries = materialized,
        "database directory present but holds no database file"
    );
    Ok(DatabaseLookup::NotFound)
}

fn in_database_dir(path: &NormalizedPath, database_dirs: &[String]) -> bool {
    !path.is_root()
        && database_dirs
            .iter()
            .any(|dir| path.is_within(NormalizedPath::new(dir).as_str()))
}

/// Copies database entries of `layer` into `scratch`, returning how many
/// entries were written.
fn materialize<L: Layer + ?Sized>(
    layer: &L,
    database_dirs: &[String],
    scratch: &TempDir,
) -> Result<usize> {
    let digest = layer.digest();
    let stream = layer.uncompressed()?;
    let mut archive = tar::Archive::new(stream);
    let mut buffer = CopyBuffer::new();
    let mut written = 0;

    let entries = archive
        .entries()
        .map_err(|e| AuditError::archive(digest, format!("failed to read entries: {e}")))?;

    for entry_result in entries {
        let mut entry = entry_result
            .map_err(|e| AuditError::archive(digest, format!("failed to read entry: {e}")))?;

        let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let path = NormalizedPath::new(&raw);
        if !in_database_dir(&path, database_dirs)
            || path.file_name().starts_with(WHITEOUT_PREFIX)
        {
            continue;
        }

        // Normalized paths are relative and free of `..`, so the join stays
        // inside the scratch directory.
        let target = scratch.path().join(path.as_str());
        let mode = entry.header().mode().unwrap_or(0o644);

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&target)?;
                set_mode(&target, mode | 0o700)?;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut file = File::create(&target)?;
                let size = copy_with_buffer(&mut entry, &mut file, &mut buffer).map_err(|e| {
                    match e {
                        CopyError::Read(e) => AuditError::archive(
                            digest,
                            format!("failed to read {}: {e}", path.as_str()),
                        ),
                        CopyError::Write(e) => AuditError::Io(e),
                    }
                })?;
                drop(file);
                set_mode(&target, mode | 0o600)?;
                tracing::debug!(layer = digest, path = %path, size, "materialized database file");
            }
            other => {
                tracing::trace!(layer = digest, path = %path, kind = ?other, "skipping entry");
                continue;
            }
        }
        written += 1;
    }

    Ok(written)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::image::MemoryLayer;
    use crate::test_utils::PackageBlob;
    use crate::test_utils::TarTestBuilder;
    use crate::test_utils::bdb_packages_bytes;
    use crate::test_utils::sqlite_database_layer;
    use crate::test_utils::sqlite_rpmdb_bytes;

    fn dirs() -> Vec<String> {
        AuditConfig::default().database_dirs
    }

    fn blobs() -> Vec<Vec<u8>> {
        vec![
            PackageBlob::new("filesystem", "3.16", "2.el9")
                .file("/usr/bin", 0)
                .build(),
            PackageBlob::new("bash", "5.1.8", "9.el9")
                .file("/usr/bin/bash", 0)
                .build(),
        ]
    }

    fn lookup(tar: Vec<u8>) -> DatabaseLookup {
        let layer = MemoryLayer::with_digest("sha256:db", tar);
        extract_package_database(&layer, &dirs()).unwrap()
    }

    #[test]
    fn test_finds_sqlite_database() {
        let DatabaseLookup::Found(db) = lookup(sqlite_database_layer(&blobs())) else {
            panic!("database not found");
        };
        assert_eq!(db.format, DatabaseFormat::Sqlite);
        assert_eq!(db.path, Path::new("var/lib/rpm/rpmdb.sqlite"));
        let names: Vec<&str> = db.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["filesystem", "bash"]);
    }

    #[test]
    fn test_finds_berkeley_database() {
        let tar = TarTestBuilder::new()
            .add_file("./var/lib/rpm/Packages", &bdb_packages_bytes(&blobs()))
            .build();
        let DatabaseLookup::Found(db) = lookup(tar) else {
            panic!("database not found");
        };
        assert_eq!(db.format, DatabaseFormat::BerkeleyDb);
        assert_eq!(db.packages.len(), 2);
    }

    #[test]
    fn test_sqlite_preferred_over_packages() {
        let tar = TarTestBuilder::new()
            .add_file("var/lib/rpm/Packages", &bdb_packages_bytes(&blobs()[..1]))
            .add_file("var/lib/rpm/rpmdb.sqlite", &sqlite_rpmdb_bytes(&blobs()))
            .build();
        let DatabaseLookup::Found(db) = lookup(tar) else {
            panic!("database not found");
        };
        assert_eq!(db.format, DatabaseFormat::Sqlite);
        assert_eq!(db.packages.len(), 2);
    }

    #[test]
    fn test_sysimage_location() {
        let tar = TarTestBuilder::new()
            .add_file("usr/lib/sysimage/rpm/rpmdb.sqlite", &sqlite_rpmdb_bytes(&blobs()))
            .build();
        let DatabaseLookup::Found(db) = lookup(tar) else {
            panic!("database not found");
        };
        assert_eq!(db.path, Path::new("usr/lib/sysimage/rpm/rpmdb.sqlite"));
    }

    #[test]
    fn test_layer_without_database() {
        let tar = TarTestBuilder::new()
            .add_file("usr/bin/bash", b"elf")
            .add_directory("var/lib/rpm/")
            .build();
        assert_eq!(lookup(tar), DatabaseLookup::NotFound);
    }

    #[test]
    fn test_whiteout_is_not_a_database() {
        let tar = TarTestBuilder::new()
            .add_whiteout("var/lib/rpm/rpmdb.sqlite")
            .build();
        assert_eq!(lookup(tar), DatabaseLookup::NotFound);
    }

    #[test]
    fn test_sibling_directory_is_not_database_dir() {
        let tar = TarTestBuilder::new()
            .add_file("var/lib/rpmstate/rpmdb.sqlite", &sqlite_rpmdb_bytes(&blobs()))
            .build();
        assert_eq!(lookup(tar), DatabaseLookup::NotFound);
    }

    #[test]
    fn test_corrupt_database_is_an_error() {
        let tar = TarTestBuilder::new()
            .add_file("var/lib/rpm/Packages", b"this is not a berkeley db file")
            .build();
        let layer = MemoryLayer::with_digest("sha256:db", tar);
        let err = extract_package_database(&layer, &dirs()).unwrap_err();
        match err {
            AuditError::DatabaseCorrupt { digest, path, .. } => {
                assert_eq!(digest, "sha256:db");
                assert_eq!(path, Path::new("var/lib/rpm/Packages"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_corrupt_header_blob_is_an_error() {
        let tar = sqlite_database_layer(&[vec![0, 0, 0, 1]]);
        let layer = MemoryLayer::with_digest("sha256:db", tar);
        assert!(matches!(
            extract_package_database(&layer, &dirs()),
            Err(AuditError::DatabaseCorrupt { .. })
        ));
    }

    #[test]
    fn test_malformed_archive_is_an_error() {
        let layer = MemoryLayer::with_digest("sha256:db", vec![0xff; 1024]);
        assert!(matches!(
            extract_package_database(&layer, &dirs()),
            Err(AuditError::Archive { .. })
        ));
    }

    #[test]
    fn test_scratch_write_failure_is_an_error() {
        // `var/lib/rpm` lands as a regular file, so its children cannot be
        // created below it.
        let tar = TarTestBuilder::new()
            .add_file("var/lib/rpm", b"not a directory")
            .add_file("var/lib/rpm/rpmdb.sqlite", &sqlite_rpmdb_bytes(&blobs()))
            .build();
        let layer = MemoryLayer::with_digest("sha256:db", tar);
        let result = extract_package_database(&layer, &dirs());
        assert!(
            matches!(result, Err(AuditError::Io(_))),
            "expected an I/O error, got {result:?}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_modes_are_widened() {
        let tar = TarTestBuilder::new()
            .add_file_with_mode("var/lib/rpm/rpmdb.sqlite", &sqlite_rpmdb_bytes(&blobs()), 0o000)
            .build();
        assert!(lookup(tar).is_found());
    }

    #[test]
    fn test_in_database_dir() {
        let dirs = dirs();
        assert!(in_database_dir(&NormalizedPath::new("var/lib/rpm"), &dirs));
        assert!(in_database_dir(&NormalizedPath::new("var/lib/rpm/x"), &dirs));
        assert!(!in_database_dir(&NormalizedPath::new("var/lib"), &dirs));
        assert!(!in_database_dir(&NormalizedPath::new("/"), &dirs));
    }
}
