//! RPM header blob parsing.
//!
//! A header blob as stored in the package database has no lead or magic:
//!
//! ```text
//! +---------+---------+----------------------+-------------------+
//! | il: u32 | dl: u32 | il * 16-byte entries |  dl bytes of data |
//! +---------+---------+----------------------+-------------------+
//! entry = tag: i32 | type: u32 | offset: i32 | count: u32   (big-endian)
//! ```
//!
//! Only the tags needed to identify a package and enumerate its files are
//! decoded; every other tag is skipped.

use super::FileFlags;
use super::InstalledFile;
use super::PackageRecord;
use super::RpmDbError;

/// `RPMTAG_NAME`
pub const TAG_NAME: i32 = 1000;
/// `RPMTAG_VERSION`
pub const TAG_VERSION: i32 = 1001;
/// `RPMTAG_RELEASE`
pub const TAG_RELEASE: i32 = 1002;
/// `RPMTAG_EPOCH`
pub const TAG_EPOCH: i32 = 1003;
/// `RPMTAG_ARCH`
pub const TAG_ARCH: i32 = 1022;
/// `RPMTAG_OLDFILENAMES`
pub const TAG_OLDFILENAMES: i32 = 1027;
/// `RPMTAG_FILEFLAGS`
pub const TAG_FILEFLAGS: i32 = 1037;
/// `RPMTAG_DIRINDEXES`
pub const TAG_DIRINDEXES: i32 = 1116;
/// `RPMTAG_BASENAMES`
pub const TAG_BASENAMES: i32 = 1117;
/// `RPMTAG_DIRNAMES`
pub const TAG_DIRNAMES: i32 = 1118;

/// `RPM_INT32_TYPE`
pub const TYPE_INT32: u32 = 4;
/// `RPM_STRING_TYPE`
pub const TYPE_STRING: u32 = 6;
/// `RPM_STRING_ARRAY_TYPE`
pub const TYPE_STRING_ARRAY: u32 = 8;
/// `RPM_I18NSTRING_TYPE`
pub const TYPE_I18NSTRING: u32 = 9;

const PREAMBLE_LEN: usize = 8;
const ENTRY_LEN: usize = 16;
const MAX_INDEX_ENTRIES: usize = 0xffff;
const MAX_DATA_LEN: usize = 0x0fff_ffff;

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    tag: i32,
    kind: u32,
    offset: usize,
    count: usize,
}

/// A validated view over a header blob.
#[derive(Debug)]
pub struct Header<'a> {
    entries: Vec<IndexEntry>,
    data: &'a [u8],
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn corrupt(reason: impl Into<String>) -> RpmDbError {
    RpmDbError::Header(reason.into())
}

impl<'a> Header<'a> {
    /// Validates the preamble and index of `blob`.
    pub fn parse(blob: &'a [u8]) -> Result<Self, RpmDbError> {
        if blob.len() < PREAMBLE_LEN {
            return Err(corrupt(format!("blob too short ({} bytes)", blob.len())));
        }

        let il = be_u32(blob, 0) as usize;
        let dl = be_u32(blob, 4) as usize;
        if il == 0 || il > MAX_INDEX_ENTRIES {
            return Err(corrupt(format!("implausible index entry count {il}")));
        }
        if dl > MAX_DATA_LEN {
            return Err(corrupt(format!("implausible data length {dl}")));
        }

        let data_start = PREAMBLE_LEN + il * ENTRY_LEN;
        let data_end = data_start + dl;
        if blob.len() < data_end {
            return Err(corrupt(format!(
                "blob of {} bytes is shorter than declared {data_end}",
                blob.len()
            )));
        }

        let mut entries = Vec::with_capacity(il);
        for i in 0..il {
            let at = PREAMBLE_LEN + i * ENTRY_LEN;
            #[allow(clippy::cast_possible_wrap)]
            let tag = be_u32(blob, at) as i32;
            let kind = be_u32(blob, at + 4);
            let offset = be_u32(blob, at + 8) as usize;
            let count = be_u32(blob, at + 12) as usize;
            if offset > dl {
                return Err(corrupt(format!(
                    "tag {tag} data offset {offset} is outside the {dl}-byte store"
                )));
            }
            entries.push(IndexEntry {
                tag,
                kind,
                offset,
                count,
            });
        }

        Ok(Self {
            entries,
            data: &blob[data_start..data_end],
        })
    }

    fn entry(&self, tag: i32) -> Option<&IndexEntry> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }

    fn strings_at(&self, entry: &IndexEntry) -> Result<Vec<String>, RpmDbError> {
        let mut out = Vec::with_capacity(entry.count);
        let mut at = entry.offset;
        for _ in 0..entry.count {
            let rest = &self.data[at..];
            let len = rest.iter().position(|&b| b == 0).ok_or_else(|| {
                corrupt(format!("tag {} has an unterminated string", entry.tag))
            })?;
            out.push(String::from_utf8_lossy(&rest[..len]).into_owned());
            at += len + 1;
        }
        Ok(out)
    }

    /// Returns a string tag, or `None` if absent.
    pub fn string(&self, tag: i32) -> Result<Option<String>, RpmDbError> {
        let Some(entry) = self.entry(tag) else {
            return Ok(None);
        };
        match entry.kind {
            TYPE_STRING | TYPE_I18NSTRING | TYPE_STRING_ARRAY if entry.count >= 1 => {
                let first = IndexEntry { count: 1, ..*entry };
                Ok(self.strings_at(&first)?.into_iter().next())
            }
            kind => Err(corrupt(format!("tag {tag} has type {kind}, expected a string"))),
        }
    }

    /// Returns a string-array tag, or an empty list if absent.
    pub fn string_array(&self, tag: i32) -> Result<Vec<String>, RpmDbError> {
        let Some(entry) = self.entry(tag) else {
            return Ok(Vec::new());
        };
        match entry.kind {
            TYPE_STRING_ARRAY | TYPE_I18NSTRING => self.strings_at(entry),
            kind => Err(corrupt(format!(
                "tag {tag} has type {kind}, expected a string array"
            ))),
        }
    }

    /// Returns an int32 tag, or an empty list if absent.
    pub fn int32_array(&self, tag: i32) -> Result<Vec<i32>, RpmDbError> {
        let Some(entry) = self.entry(tag) else {
            return Ok(Vec::new());
        };
        if entry.kind != TYPE_INT32 {
            return Err(corrupt(format!(
                "tag {tag} has type {}, expected int32",
                entry.kind
            )));
        }
        let end = entry
            .count
            .checked_mul(4)
            .and_then(|len| len.checked_add(entry.offset))
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| corrupt(format!("tag {tag} int32 array overruns the store")))?;

        #[allow(clippy::cast_possible_wrap)]
        let values = self.data[entry.offset..end]
            .chunks_exact(4)
            .map(|chunk| be_u32(chunk, 0) as i32)
            .collect();
        Ok(values)
    }
}

/// Decodes one package header blob.
pub fn parse_package(blob: &[u8]) -> Result<PackageRecord, RpmDbError> {
    let header = Header::parse(blob)?;

    let required = |tag: i32, what: &str| -> Result<String, RpmDbError> {
        header
            .string(tag)?
            .ok_or_else(|| corrupt(format!("package header has no {what}")))
    };
    let name = required(TAG_NAME, "name")?;
    let version = required(TAG_VERSION, "version")?;
    let release = required(TAG_RELEASE, "release")?;
    let epoch = header.int32_array(TAG_EPOCH)?.first().copied();
    let arch = header.string(TAG_ARCH)?;

    let paths = file_paths(&header)?;
    let flags = header.int32_array(TAG_FILEFLAGS)?;
    if !flags.is_empty() && flags.len() != paths.len() {
        return Err(corrupt(format!(
            "{name}: {} file flags for {} files",
            flags.len(),
            paths.len()
        )));
    }

    #[allow(clippy::cast_sign_loss)]
    let files = paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| InstalledFile {
            path,
            flags: FileFlags::from_bits(flags.get(i).copied().unwrap_or(0) as u32),
        })
        .collect();

    Ok(PackageRecord {
        name,
        version,
        release,
        epoch,
        arch,
        files,
    })
}

fn file_paths(header: &Header<'_>) -> Result<Vec<String>, RpmDbError> {
    let basenames = header.string_array(TAG_BASENAMES)?;
    if basenames.is_empty() {
        return header.string_array(TAG_OLDFILENAMES);
    }

    let dirnames = header.string_array(TAG_DIRNAMES)?;
    let dirindexes = header.int32_array(TAG_DIRINDEXES)?;
    if dirindexes.len() != basenames.len() {
        return Err(corrupt(format!(
            "{} directory indexes for {} basenames",
            dirindexes.len(),
            basenames.len()
        )));
    }

    basenames
        .into_iter()
        .zip(dirindexes)
        .map(|(base, index)| {
            let dir = usize::try_from(index)
                .ok()
                .and_then(|index| dirnames.get(index))
                .ok_or_else(|| corrupt(format!("directory index {index} out of range")))?;
            Ok(format!("{dir}{base}"))
        })
        .collect()
}
