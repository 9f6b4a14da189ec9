use bytes::{Buf, BufMut, BytesMut};

use crate::common::{FileHashError, PageId, Result, INVALID_PAGE_ID, NUM_SPLIT_LEVELS};

/// Signature of a hash table file
pub const HASH_MAGIC: u32 = 0xcece_3434;

/// On-disk format version
pub const HASH_VERSION: u32 = 1;

/// Bytes reserved for one header copy
pub const HEADER_COPY_SIZE: usize = 256;

/// Bytes of page 0 that hold both copies
pub const HEADER_AREA_SIZE: usize = 2 * HEADER_COPY_SIZE;

/// Encoded length of a header, checksum included
const ENCODED_LEN: usize = 88 + 4 * NUM_SPLIT_LEVELS + 4;

/// Table parameters persisted in page 0.
///
/// Page 0 holds two copies of the header, at offsets 0 and
/// `HEADER_COPY_SIZE`. A header with generation `g` is written to copy
/// `g % 2`, so a torn write can only damage the copy being replaced and the
/// previous generation stays readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashHeader {
    pub version: u32,
    pub generation: u64,
    /// Page size
    pub bsize: u32,
    /// log2 of the page size
    pub bshift: u32,
    /// Highest bucket number in use
    pub max_bucket: u32,
    pub high_mask: u32,
    pub low_mask: u32,
    /// Highest split level with reserved pages
    pub ovfl_point: u32,
    pub ffactor: u32,
    pub nkeys: u64,
    /// Pages in use, including freed ones
    pub npages: u32,
    /// First page of the free list
    pub free_head: PageId,
    /// Pages before the first bucket page
    pub hdr_pages: u32,
    pub uinfo_len: u32,
    pub uinfo_page: PageId,
    pub uinfo_npages: u32,
    pub config_page: PageId,
    pub num_configs: u32,
    /// Hash of a fixed probe key, checked when the file is reopened
    pub h_charkey: u32,
    /// First page of each split level
    pub spares: [u32; NUM_SPLIT_LEVELS],
}

impl Default for HashHeader {
    fn default() -> Self {
        Self {
            version: HASH_VERSION,
            generation: 0,
            bsize: 0,
            bshift: 0,
            max_bucket: 0,
            high_mask: 0,
            low_mask: 0,
            ovfl_point: 0,
            ffactor: 0,
            nkeys: 0,
            npages: 0,
            free_head: INVALID_PAGE_ID,
            hdr_pages: 0,
            uinfo_len: 0,
            uinfo_page: INVALID_PAGE_ID,
            uinfo_npages: 0,
            config_page: INVALID_PAGE_ID,
            num_configs: 0,
            h_charkey: 0,
            spares: [0; NUM_SPLIT_LEVELS],
        }
    }
}

impl HashHeader {
    /// Serializes the header with a trailing CRC32.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_COPY_SIZE);
        buf.put_u32_le(HASH_MAGIC);
        buf.put_u32_le(self.version);
        buf.put_u64_le(self.generation);
        buf.put_u32_le(self.bsize);
        buf.put_u32_le(self.bshift);
        buf.put_u32_le(self.max_bucket);
        buf.put_u32_le(self.high_mask);
        buf.put_u32_le(self.low_mask);
        buf.put_u32_le(self.ovfl_point);
        buf.put_u32_le(self.ffactor);
        buf.put_u64_le(self.nkeys);
        buf.put_u32_le(self.npages);
        buf.put_u32_le(self.free_head.as_u32());
        buf.put_u32_le(self.hdr_pages);
        buf.put_u32_le(self.uinfo_len);
        buf.put_u32_le(self.uinfo_page.as_u32());
        buf.put_u32_le(self.uinfo_npages);
        buf.put_u32_le(self.config_page.as_u32());
        buf.put_u32_le(self.num_configs);
        buf.put_u32_le(self.h_charkey);
        for spare in self.spares {
            buf.put_u32_le(spare);
        }
        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);
        debug_assert_eq!(buf.len(), ENCODED_LEN);
        buf
    }

    /// Parses one header copy; `None` if its signature or checksum is bad.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < ENCODED_LEN {
            return None;
        }
        let body = &data[..ENCODED_LEN - 4];
        let mut tail = &data[ENCODED_LEN - 4..ENCODED_LEN];
        if crc32fast::hash(body) != tail.get_u32_le() {
            return None;
        }

        let mut buf = body;
        if buf.get_u32_le() != HASH_MAGIC {
            return None;
        }
        let mut hdr = HashHeader {
            version: buf.get_u32_le(),
            generation: buf.get_u64_le(),
            bsize: buf.get_u32_le(),
            bshift: buf.get_u32_le(),
            max_bucket: buf.get_u32_le(),
            high_mask: buf.get_u32_le(),
            low_mask: buf.get_u32_le(),
            ovfl_point: buf.get_u32_le(),
            ffactor: buf.get_u32_le(),
            nkeys: buf.get_u64_le(),
            npages: buf.get_u32_le(),
            free_head: PageId::new(buf.get_u32_le()),
            hdr_pages: buf.get_u32_le(),
            uinfo_len: buf.get_u32_le(),
            uinfo_page: PageId::new(buf.get_u32_le()),
            uinfo_npages: buf.get_u32_le(),
            config_page: PageId::new(buf.get_u32_le()),
            num_configs: buf.get_u32_le(),
            h_charkey: buf.get_u32_le(),
            spares: [0; NUM_SPLIT_LEVELS],
        };
        for spare in hdr.spares.iter_mut() {
            *spare = buf.get_u32_le();
        }
        Some(hdr)
    }
}

/// Reads and writes the two header copies of page 0.
pub struct HeaderPage;

impl HeaderPage {
    /// Returns the valid copy with the highest generation.
    pub fn read(data: &[u8]) -> Result<HashHeader> {
        if data.len() < HEADER_AREA_SIZE {
            return Err(FileHashError::corrupt("header page is truncated"));
        }
        let a = HashHeader::decode(&data[..HEADER_COPY_SIZE]);
        let b = HashHeader::decode(&data[HEADER_COPY_SIZE..HEADER_AREA_SIZE]);
        let hdr = match (a, b) {
            (Some(a), Some(b)) => {
                if a.generation >= b.generation {
                    a
                } else {
                    b
                }
            }
            (Some(h), None) | (None, Some(h)) => h,
            (None, None) => return Err(FileHashError::corrupt("no valid header copy")),
        };
        if hdr.version != HASH_VERSION {
            return Err(FileHashError::corrupt(format!(
                "unsupported format version {}",
                hdr.version
            )));
        }
        Ok(hdr)
    }

    /// Writes `hdr` into the copy selected by its generation.
    pub fn write(data: &mut [u8], hdr: &HashHeader) {
        let encoded = hdr.encode();
        let start = (hdr.generation % 2) as usize * HEADER_COPY_SIZE;
        data[start..start + HEADER_COPY_SIZE].fill(0);
        data[start..start + encoded.len()].copy_from_slice(&encoded);
    }
}
