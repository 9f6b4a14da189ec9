use crate::buffer::PageFilter;
use crate::common::{FileHashError, PageId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID};

/// Every page except page 0 starts with a fixed prologue:
///
/// +--------+---------+-----------+-----------+-------------+----------+----------+
/// | magic  | page_id | next_page | page_type | num_entries | checksum | free_end |
/// | u32    | u32     | u32       | u16       | u16         | u32      | u32      |
/// +--------+---------+-----------+-----------+-------------+----------+----------+
///
/// All integers are little-endian. `next_page` chains overflow pages of a
/// bucket, pages of the configuration directory and the free list.
pub const PAGE_HEADER_SIZE: usize = 24;

/// Signature of an initialized data page
pub const PAGE_MAGIC: u32 = 0xe0f1_a2b9;

const MAGIC_OFFSET: usize = 0;
const PAGE_ID_OFFSET: usize = 4;
const NEXT_PAGE_OFFSET: usize = 8;
const PAGE_TYPE_OFFSET: usize = 12;
const NUM_ENTRIES_OFFSET: usize = 14;
const CHECKSUM_OFFSET: usize = 16;
const FREE_END_OFFSET: usize = 20;

/// Role of a page in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PageType {
    Bucket = 1,
    Overflow = 2,
    Free = 3,
    UserInfo = 4,
    Config = 5,
}

impl PageType {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(PageType::Bucket),
            2 => Some(PageType::Overflow),
            3 => Some(PageType::Free),
            4 => Some(PageType::UserInfo),
            5 => Some(PageType::Config),
            _ => None,
        }
    }
}

pub(crate) fn read_u16(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([data[off], data[off + 1]])
}

pub(crate) fn read_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

pub(crate) fn read_u64(data: &[u8], off: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[off..off + 8]);
    u64::from_le_bytes(bytes)
}

pub(crate) fn write_u16(data: &mut [u8], off: usize, v: u16) {
    data[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn write_u32(data: &mut [u8], off: usize, v: u32) {
    data[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn write_u64(data: &mut [u8], off: usize, v: u64) {
    data[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

/// Zeroes `data` and writes a fresh prologue.
pub fn init_page(data: &mut [u8], page_id: PageId, page_type: PageType) {
    data.fill(0);
    write_u32(data, MAGIC_OFFSET, PAGE_MAGIC);
    write_u32(data, PAGE_ID_OFFSET, page_id.as_u32());
    write_u32(data, NEXT_PAGE_OFFSET, INVALID_PAGE_ID.as_u32());
    write_u16(data, PAGE_TYPE_OFFSET, page_type as u16);
    write_u16(data, NUM_ENTRIES_OFFSET, 0);
    write_u32(data, FREE_END_OFFSET, data.len() as u32);
}

/// Read accessors shared by every page view.
pub trait PageProlog {
    fn page_bytes(&self) -> &[u8];

    fn magic(&self) -> u32 {
        read_u32(self.page_bytes(), MAGIC_OFFSET)
    }

    fn page_id(&self) -> PageId {
        PageId::new(read_u32(self.page_bytes(), PAGE_ID_OFFSET))
    }

    /// Next page of the chain, `None` at the end.
    fn next_page(&self) -> Option<PageId> {
        let pid = PageId::new(read_u32(self.page_bytes(), NEXT_PAGE_OFFSET));
        (pid != INVALID_PAGE_ID).then_some(pid)
    }

    fn page_type(&self) -> Option<PageType> {
        PageType::from_u16(read_u16(self.page_bytes(), PAGE_TYPE_OFFSET))
    }

    fn num_entries(&self) -> u16 {
        read_u16(self.page_bytes(), NUM_ENTRIES_OFFSET)
    }

    fn free_end(&self) -> usize {
        read_u32(self.page_bytes(), FREE_END_OFFSET) as usize
    }

    fn is_initialized(&self) -> bool {
        self.magic() == PAGE_MAGIC
    }
}

impl PageProlog for [u8] {
    fn page_bytes(&self) -> &[u8] {
        self
    }
}

pub(crate) fn set_next_page(data: &mut [u8], next: Option<PageId>) {
    let v = next.unwrap_or(INVALID_PAGE_ID).as_u32();
    write_u32(data, NEXT_PAGE_OFFSET, v);
}

pub(crate) fn set_num_entries(data: &mut [u8], n: u16) {
    write_u16(data, NUM_ENTRIES_OFFSET, n);
}

pub(crate) fn set_free_end(data: &mut [u8], off: usize) {
    write_u32(data, FREE_END_OFFSET, off as u32);
}

pub(crate) fn set_page_type(data: &mut [u8], page_type: PageType) {
    write_u16(data, PAGE_TYPE_OFFSET, page_type as u16);
}

/// CRC32 of the page with the checksum field taken as zero.
pub fn page_checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..CHECKSUM_OFFSET]);
    hasher.update(&[0u8; 4]);
    hasher.update(&data[CHECKSUM_OFFSET + 4..]);
    hasher.finalize()
}

/// Verifies page signatures and checksums as pages move between the file
/// and the buffer pool. Page 0 carries its own header checksum and is left
/// alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct PageChecksum;

impl PageFilter for PageChecksum {
    fn page_in(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        if page_id == HEADER_PAGE_ID {
            return Ok(());
        }
        let magic = data.magic();
        if magic == 0 && data.iter().all(|&b| b == 0) {
            // Allocated but never written.
            return Ok(());
        }
        if magic != PAGE_MAGIC {
            return Err(FileHashError::corrupt(format!(
                "{} has bad signature {:#010x}",
                page_id, magic
            )));
        }
        if data.page_id() != page_id {
            return Err(FileHashError::corrupt(format!(
                "{} claims to be {}",
                page_id,
                data.page_id()
            )));
        }
        let stored = read_u32(data, CHECKSUM_OFFSET);
        let computed = page_checksum(data);
        if stored != computed {
            return Err(FileHashError::corrupt(format!(
                "{} checksum mismatch: stored {:#010x}, computed {:#010x}",
                page_id, stored, computed
            )));
        }
        Ok(())
    }

    fn page_out(&self, page_id: PageId, data: &mut [u8]) {
        if page_id == HEADER_PAGE_ID || data.magic() != PAGE_MAGIC {
            return;
        }
        let crc = page_checksum(data);
        write_u32(data, CHECKSUM_OFFSET, crc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_page_prologue() {
        let mut data = vec![0xFFu8; 512];
        init_page(&mut data, PageId::new(9), PageType::Overflow);

        assert!(data.is_initialized());
        assert_eq!(data.page_id(), PageId::new(9));
        assert_eq!(data.page_type(), Some(PageType::Overflow));
        assert_eq!(data.next_page(), None);
        assert_eq!(data.num_entries(), 0);
        assert_eq!(data.free_end(), 512);

        set_next_page(&mut data, Some(PageId::new(3)));
        assert_eq!(data.next_page(), Some(PageId::new(3)));
    }

    #[test]
    fn test_checksum_round_trip() {
        let filter = PageChecksum;
        let mut data = vec![0u8; 512];
        init_page(&mut data, PageId::new(4), PageType::Bucket);
        data[300] = 7;

        filter.page_out(PageId::new(4), &mut data);
        assert!(filter.page_in(PageId::new(4), &mut data).is_ok());

        data[301] ^= 1;
        assert!(matches!(
            filter.page_in(PageId::new(4), &mut data),
            Err(FileHashError::Corrupt(_))
        ));
    }

    #[test]
    fn test_checksum_accepts_fresh_page_rejects_garbage() {
        let filter = PageChecksum;
        let mut zero = vec![0u8; 512];
        assert!(filter.page_in(PageId::new(2), &mut zero).is_ok());

        let mut garbage = vec![0x5Au8; 512];
        assert!(filter.page_in(PageId::new(2), &mut garbage).is_err());

        // Page stored at the wrong position.
        let mut data = vec![0u8; 512];
        init_page(&mut data, PageId::new(5), PageType::Bucket);
        filter.page_out(PageId::new(5), &mut data);
        assert!(filter.page_in(PageId::new(6), &mut data).is_err());
    }
}
