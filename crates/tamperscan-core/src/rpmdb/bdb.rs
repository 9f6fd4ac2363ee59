//! Berkeley DB hash backend for the legacy `Packages` file.
//!
//! Only the subset of the on-disk format that RPM produces is supported:
//! an unencrypted hash database whose values are stored off-page, in chains
//! of overflow pages. Values are returned in page order.

use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

use super::RpmDbError;

const HASH_MAGIC: u32 = 0x0006_1561;
const META_LEN: usize = 72;
const PAGE_HEADER_LEN: usize = 26;

const PAGE_HASH_UNSORTED: u8 = 2;
const PAGE_OVERFLOW: u8 = 7;
const PAGE_HASH_META: u8 = 8;
const PAGE_HASH: u8 = 13;

const ITEM_OFFPAGE: u8 = 3;
const OFFPAGE_ITEM_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, bytes: &[u8], at: usize) -> u16 {
        let raw = [bytes[at], bytes[at + 1]];
        match self {
            Self::Little => u16::from_le_bytes(raw),
            Self::Big => u16::from_be_bytes(raw),
        }
    }

    fn u32(self, bytes: &[u8], at: usize) -> u32 {
        let raw = [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
        match self {
            Self::Little => u32::from_le_bytes(raw),
            Self::Big => u32::from_be_bytes(raw),
        }
    }
}

fn corrupt(reason: impl Into<String>) -> RpmDbError {
    RpmDbError::BerkeleyDb(reason.into())
}

/// Generic page header fields.
#[derive(Debug, Clone, Copy)]
struct PageHeader {
    next_page: u32,
    entries: u16,
    // Free-area offset on hash pages; bytes in use on overflow pages.
    offset: u16,
    page_type: u8,
}

/// An opened hash database.
#[derive(Debug)]
pub(super) struct HashDatabase<R> {
    reader: R,
    order: ByteOrder,
    page_size: usize,
    last_page: u32,
}

impl<R: Read + Seek> HashDatabase<R> {
    /// Validates the metadata page.
    pub(super) fn open(mut reader: R) -> Result<Self, RpmDbError> {
        let mut meta = [0u8; META_LEN];
        reader.seek(SeekFrom::Start(0))?;
        reader.read_exact(&mut meta).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                corrupt("file is too short for a metadata page")
            } else {
                RpmDbError::Io(e)
            }
        })?;

        let order = if ByteOrder::Little.u32(&meta, 12) == HASH_MAGIC {
            ByteOrder::Little
        } else if ByteOrder::Big.u32(&meta, 12) == HASH_MAGIC {
            ByteOrder::Big
        } else {
            return Err(corrupt(format!(
                "not a hash database (magic {:#x})",
                ByteOrder::Little.u32(&meta, 12)
            )));
        };

        let page_size = order.u32(&meta, 20) as usize;
        if !(512..=65536).contains(&page_size) || !page_size.is_power_of_two() {
            return Err(corrupt(format!("invalid page size {page_size}")));
        }
        if meta[24] != 0 {
            return Err(corrupt("encrypted databases are not supported"));
        }
        if meta[25] != PAGE_HASH_META {
            return Err(corrupt(format!(
                "metadata page has type {}, expected hash metadata",
                meta[25]
            )));
        }

        Ok(Self {
            reader,
            order,
            page_size,
            last_page: order.u32(&meta, 32),
        })
    }

    fn read_page(&mut self, page_no: u32) -> Result<Vec<u8>, RpmDbError> {
        if page_no > self.last_page {
            return Err(corrupt(format!(
                "page {page_no} is beyond the last page {}",
                self.last_page
            )));
        }
        let mut page = vec![0u8; self.page_size];
        self.reader
            .seek(SeekFrom::Start(u64::from(page_no) * self.page_size as u64))?;
        self.reader.read_exact(&mut page).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                corrupt(format!("page {page_no} is truncated"))
            } else {
                RpmDbError::Io(e)
            }
        })?;
        Ok(page)
    }

    fn page_header(&self, page: &[u8]) -> PageHeader {
        PageHeader {
            next_page: self.order.u32(page, 16),
            entries: self.order.u16(page, 20),
            offset: self.order.u16(page, 22),
            page_type: page[25],
        }
    }

    /// Reads every off-page value of every hash page.
    pub(super) fn read_blobs(&mut self) -> Result<Vec<Vec<u8>>, RpmDbError> {
        let mut blobs = Vec::new();

        for page_no in 1..=self.last_page {
            let page = self.read_page(page_no)?;
            let header = self.page_header(&page);
            if header.page_type != PAGE_HASH && header.page_type != PAGE_HASH_UNSORTED {
                continue;
            }

            let entries = usize::from(header.entries);
            if PAGE_HEADER_LEN + entries * 2 > self.page_size {
                return Err(corrupt(format!(
                    "hash page {page_no} index of {entries} entries overruns the page"
                )));
            }

            // Entries alternate key, value; only values carry headers.
            for index in (1..entries).step_by(2) {
                let item = usize::from(self.order.u16(&page, PAGE_HEADER_LEN + index * 2));
                if item >= self.page_size {
                    return Err(corrupt(format!(
                        "hash page {page_no} item offset {item} overruns the page"
                    )));
                }
                if page[item] != ITEM_OFFPAGE {
                    continue;
                }
                if item + OFFPAGE_ITEM_LEN > self.page_size {
                    return Err(corrupt(format!(
                        "hash page {page_no} off-page item at {item} is truncated"
                    )));
                }

                let first_page = self.order.u32(&page, item + 4);
                let length = self.order.u32(&page, item + 8) as usize;
                blobs.push(self.read_overflow(first_page, length)?);
            }
        }

        Ok(blobs)
    }

    fn read_overflow(&mut self, first_page: u32, length: usize) -> Result<Vec<u8>, RpmDbError> {
        // The length field is untrusted; a chain never holds more than the
        // payload of every page in the file.
        let chain_limit = self.last_page as usize * (self.page_size - PAGE_HEADER_LEN);
        let mut value = Vec::with_capacity(length.min(chain_limit));
        let mut current = first_page;
        let mut hops = 0u32;

        while current != 0 {
            hops += 1;
            if hops > self.last_page {
                return Err(corrupt(format!(
                    "overflow chain starting at page {first_page} loops"
                )));
            }

            let page = self.read_page(current)?;
            let header = self.page_header(&page);
            if header.page_type != PAGE_OVERFLOW {
                return Err(corrupt(format!(
                    "page {current} has type {}, expected overflow",
                    header.page_type
                )));
            }

            let used = usize::from(header.offset);
            if PAGE_HEADER_LEN + used > self.page_size {
                return Err(corrupt(format!("overflow page {current} overstates its length")));
            }
            value.extend_from_slice(&page[PAGE_HEADER_LEN..PAGE_HEADER_LEN + used]);
            current = header.next_page;
        }

        if value.len() < length {
            return Err(corrupt(format!(
                "overflow value at page {first_page} has {} of {length} bytes",
                value.len()
            )));
        }
        value.truncate(length);
        Ok(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::bdb_packages_bytes;
    use std::io::Cursor;

    #[test]
    fn test_reads_values_spanning_pages() {
        let big = vec![0xAB_u8; 1500];
        let small = b"tiny value".to_vec();
        let bytes = bdb_packages_bytes(&[big.clone(), small.clone()]);

        let mut db = HashDatabase::open(Cursor::new(bytes)).unwrap();
        let blobs = db.read_blobs().unwrap();
        assert_eq!(blobs, vec![big, small]);
    }

    #[test]
    fn test_big_endian_database() {
        let mut bytes = bdb_packages_bytes(&[b"value".to_vec()]);
        // Flip the metadata page into big-endian form.
        let magic = HASH_MAGIC.to_be_bytes();
        bytes[12..16].copy_from_slice(&magic);
        let page_size = u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        bytes[20..24].copy_from_slice(&page_size.to_be_bytes());

        let db = HashDatabase::open(Cursor::new(bytes)).unwrap();
        assert_eq!(db.order, ByteOrder::Big);
        assert_eq!(db.page_size, page_size as usize);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = bdb_packages_bytes(&[b"value".to_vec()]);
        bytes[12..16].copy_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            HashDatabase::open(Cursor::new(bytes)),
            Err(RpmDbError::BerkeleyDb(_))
        ));
    }

    #[test]
    fn test_rejects_encrypted_database() {
        let mut bytes = bdb_packages_bytes(&[b"value".to_vec()]);
        bytes[24] = 1;
        let err = HashDatabase::open(Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("encrypted"));
    }

    #[test]
    fn test_rejects_truncated_file() {
        let bytes = bdb_packages_bytes(&[vec![1u8; 2000]]);
        let truncated = bytes[..bytes.len() - 100].to_vec();
        let mut db = HashDatabase::open(Cursor::new(truncated)).unwrap();
        assert!(db.read_blobs().is_err());
    }

    #[test]
    fn test_oversized_value_length_is_rejected() {
        let mut bytes = bdb_packages_bytes(&[b"value".to_vec()]);
        let page_size = u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]) as usize;
        // Second index slot of the first hash page points at the off-page item.
        let slot = page_size + PAGE_HEADER_LEN + 2;
        let item = page_size + usize::from(u16::from_le_bytes([bytes[slot], bytes[slot + 1]]));
        bytes[item + 8..item + 12].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut db = HashDatabase::open(Cursor::new(bytes)).unwrap();
        let err = db.read_blobs().unwrap_err();
        assert!(err.to_string().contains("of 4294967295 bytes"), "{err}");
    }

    #[test]
    fn test_rejects_short_file() {
        assert!(HashDatabase::open(Cursor::new(vec![0u8; 10])).is_err());
    }
}
