use crate::common::{FileHashError, PageId, Result, SlotId};

use super::page_layout::{
    init_page, read_u32, set_free_end, set_next_page, set_num_entries, set_page_type, write_u32,
    PageProlog, PageType, PAGE_HEADER_SIZE,
};

/// Bucket and overflow page layout:
///
/// +------------------+
/// | Page Prologue    |  (PAGE_HEADER_SIZE bytes)
/// +------------------+
/// | Entry Array      |  (grows toward the end of the page)
/// | [entry 0]        |
/// | [entry 1]        |
/// | ...              |
/// +------------------+
/// | Free Space       |
/// +------------------+  <- free_end
/// | Records          |  (grow toward the start of the page)
/// | [record n-1]     |
/// | ...              |
/// | [record 0]       |
/// +------------------+
///
/// Each entry holds the offset of its record plus the key and value
/// lengths. A record is the key bytes immediately followed by the value
/// bytes. The record area is kept dense: deleting a record slides the
/// records below it up, so `page_len - free_end` is always the sum of the
/// record lengths.
pub const ENTRY_SIZE: usize = 12;

const KEY_OFF: usize = 0;
const KEY_LEN: usize = 4;
const VAL_LEN: usize = 8;

/// Largest key plus value that fits in an empty page of `page_size` bytes.
pub fn max_record_size(page_size: usize) -> usize {
    page_size - PAGE_HEADER_SIZE - ENTRY_SIZE
}

/// One entry of the entry array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordEntry {
    pub offset: usize,
    pub key_len: usize,
    pub value_len: usize,
}

impl RecordEntry {
    pub fn record_len(&self) -> usize {
        self.key_len + self.value_len
    }
}

fn entry_pos(slot: usize) -> usize {
    PAGE_HEADER_SIZE + slot * ENTRY_SIZE
}

/// Read-only view of a bucket or overflow page.
#[derive(Clone, Copy)]
pub struct BucketPageRef<'a> {
    data: &'a [u8],
}

impl PageProlog for BucketPageRef<'_> {
    fn page_bytes(&self) -> &[u8] {
        self.data
    }
}

impl<'a> BucketPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn entries_end(&self) -> usize {
        entry_pos(self.num_entries() as usize)
    }

    /// Bytes available for a new entry and its record.
    pub fn free_space(&self) -> usize {
        self.free_end().saturating_sub(self.entries_end())
    }

    pub fn can_insert(&self, key_len: usize, value_len: usize) -> bool {
        self.free_space() >= ENTRY_SIZE + key_len + value_len
    }

    /// Whether the record at `slot` can be swapped for one of the given
    /// size without leaving this page.
    pub fn can_replace(&self, slot: SlotId, key_len: usize, value_len: usize) -> bool {
        self.entry(slot)
            .map_or(false, |e| self.free_space() + e.record_len() >= key_len + value_len)
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries() == 0
    }

    /// Bytes taken by entries and records.
    pub fn used_bytes(&self) -> usize {
        self.num_entries() as usize * ENTRY_SIZE + (self.data.len() - self.free_end())
    }

    pub fn entry(&self, slot: SlotId) -> Option<RecordEntry> {
        if slot.as_u16() >= self.num_entries() {
            return None;
        }
        let pos = entry_pos(slot.as_usize());
        Some(RecordEntry {
            offset: read_u32(self.data, pos + KEY_OFF) as usize,
            key_len: read_u32(self.data, pos + KEY_LEN) as usize,
            value_len: read_u32(self.data, pos + VAL_LEN) as usize,
        })
    }

    pub fn key(&self, slot: SlotId) -> Option<&'a [u8]> {
        self.record(slot).map(|(k, _)| k)
    }

    pub fn value(&self, slot: SlotId) -> Option<&'a [u8]> {
        self.record(slot).map(|(_, v)| v)
    }

    /// Key and value of the record at `slot`.
    pub fn record(&self, slot: SlotId) -> Option<(&'a [u8], &'a [u8])> {
        let e = self.entry(slot)?;
        let data: &'a [u8] = self.data;
        let key = data.get(e.offset..e.offset + e.key_len)?;
        let value = data.get(e.offset + e.key_len..e.offset + e.record_len())?;
        Some((key, value))
    }

    /// Slot holding exactly `key`.
    pub fn find(&self, key: &[u8]) -> Option<SlotId> {
        (0..self.num_entries())
            .map(SlotId::new)
            .find(|&slot| self.key(slot) == Some(key))
    }

    /// Records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        let page = *self;
        (0..page.num_entries()).filter_map(move |i| page.record(SlotId::new(i)))
    }

    /// Checks the free-space bookkeeping.
    pub fn validate(&self) -> Result<()> {
        let len = self.data.len();
        let pid = self.page_id();
        let free_end = self.free_end();
        if free_end > len || free_end < self.entries_end() {
            return Err(FileHashError::corrupt(format!(
                "{}: free space end {} outside [{}, {}]",
                pid,
                free_end,
                self.entries_end(),
                len
            )));
        }

        let mut total = 0usize;
        for i in 0..self.num_entries() {
            let e = self.entry(SlotId::new(i)).ok_or_else(|| {
                FileHashError::corrupt(format!("{}: missing entry {}", pid, i))
            })?;
            if e.offset < free_end || e.offset + e.record_len() > len {
                return Err(FileHashError::corrupt(format!(
                    "{}: record {} at {}+{} outside record area",
                    pid,
                    i,
                    e.offset,
                    e.record_len()
                )));
            }
            total += e.record_len();
        }
        if total != len - free_end {
            return Err(FileHashError::corrupt(format!(
                "{}: records use {} bytes, record area is {}",
                pid,
                total,
                len - free_end
            )));
        }
        Ok(())
    }
}

/// Mutable view of a bucket or overflow page.
pub struct BucketPage<'a> {
    data: &'a mut [u8],
}

impl PageProlog for BucketPage<'_> {
    fn page_bytes(&self) -> &[u8] {
        self.data
    }
}

impl<'a> BucketPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    /// Formats an empty page.
    pub fn init(&mut self, page_id: PageId, page_type: PageType) {
        init_page(self.data, page_id, page_type);
    }

    pub fn view(&self) -> BucketPageRef<'_> {
        BucketPageRef::new(self.data)
    }

    pub fn set_next_page(&mut self, next: Option<PageId>) {
        set_next_page(self.data, next);
    }

    pub fn set_page_type(&mut self, page_type: PageType) {
        set_page_type(self.data, page_type);
    }

    /// Appends a record and returns its slot.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<SlotId> {
        let page = self.view();
        if !page.can_insert(key.len(), value.len()) {
            return Err(FileHashError::Invariant(format!(
                "{} has {} free bytes, record needs {}",
                page.page_id(),
                page.free_space(),
                ENTRY_SIZE + key.len() + value.len()
            )));
        }
        let n = page.num_entries();
        let offset = page.free_end() - key.len() - value.len();

        self.data[offset..offset + key.len()].copy_from_slice(key);
        self.data[offset + key.len()..offset + key.len() + value.len()].copy_from_slice(value);

        let pos = entry_pos(n as usize);
        write_u32(self.data, pos + KEY_OFF, offset as u32);
        write_u32(self.data, pos + KEY_LEN, key.len() as u32);
        write_u32(self.data, pos + VAL_LEN, value.len() as u32);

        set_num_entries(self.data, n + 1);
        set_free_end(self.data, offset);
        Ok(SlotId::new(n))
    }

    /// Removes the record at `slot` and compacts the record area. Later
    /// slots shift down by one.
    pub fn delete(&mut self, slot: SlotId) -> Result<()> {
        let page = self.view();
        let n = page.num_entries() as usize;
        let e = page.entry(slot).ok_or_else(|| {
            FileHashError::Invariant(format!("{} has no slot {}", page.page_id(), slot.as_u16()))
        })?;
        let free_end = page.free_end();
        let rec_len = e.record_len();

        if rec_len > 0 {
            self.data
                .copy_within(free_end..e.offset, free_end + rec_len);
            self.data[free_end..free_end + rec_len].fill(0);
            for i in 0..n {
                let pos = entry_pos(i);
                let off = read_u32(self.data, pos + KEY_OFF) as usize;
                if i != slot.as_usize() && off < e.offset {
                    write_u32(self.data, pos + KEY_OFF, (off + rec_len) as u32);
                }
            }
        }

        let start = entry_pos(slot.as_usize() + 1);
        let end = entry_pos(n);
        self.data.copy_within(start..end, start - ENTRY_SIZE);
        self.data[end - ENTRY_SIZE..end].fill(0);

        set_num_entries(self.data, (n - 1) as u16);
        set_free_end(self.data, free_end + rec_len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 512;

    fn new_page(data: &mut [u8]) -> BucketPage<'_> {
        let mut page = BucketPage::new(data);
        page.init(PageId::new(3), PageType::Bucket);
        page
    }

    #[test]
    fn test_insert_and_find() {
        let mut data = vec![0u8; PAGE];
        let mut page = new_page(&mut data);

        let s0 = page.insert(b"alpha", b"one").unwrap();
        let s1 = page.insert(b"beta", b"").unwrap();
        assert_eq!(s0, SlotId::new(0));
        assert_eq!(s1, SlotId::new(1));

        let r = page.view();
        assert_eq!(r.find(b"beta"), Some(s1));
        assert_eq!(r.value(s0), Some(&b"one"[..]));
        assert_eq!(r.value(s1), Some(&b""[..]));
        assert_eq!(r.find(b"gamma"), None);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_delete_compacts() {
        let mut data = vec![0u8; PAGE];
        let mut page = new_page(&mut data);
        let before = page.view().free_space();

        page.insert(b"a", b"1111").unwrap();
        page.insert(b"b", b"22").unwrap();
        page.insert(b"c", b"333").unwrap();

        page.delete(SlotId::new(1)).unwrap();
        let r = page.view();
        assert_eq!(r.num_entries(), 2);
        assert_eq!(r.record(SlotId::new(0)), Some((&b"a"[..], &b"1111"[..])));
        assert_eq!(r.record(SlotId::new(1)), Some((&b"c"[..], &b"333"[..])));
        assert!(r.validate().is_ok());

        page.delete(SlotId::new(0)).unwrap();
        page.delete(SlotId::new(0)).unwrap();
        assert!(page.view().is_empty());
        assert_eq!(page.view().free_space(), before);
    }

    #[test]
    fn test_can_replace_counts_the_old_record() {
        let mut data = vec![0u8; PAGE];
        let mut page = new_page(&mut data);
        let slot = page.insert(b"k", &[1u8; 400]).unwrap();
        let r = page.view();
        assert_eq!(r.free_space(), 75);
        assert!(!r.can_insert(1, 100));
        assert!(r.can_replace(slot, 1, 475));
        assert!(!r.can_replace(slot, 1, 476));
        assert!(!r.can_replace(SlotId::new(1), 1, 1));
    }

    #[test]
    fn test_fill_to_capacity() {
        let mut data = vec![0u8; PAGE];
        let mut page = new_page(&mut data);
        let value = vec![7u8; max_record_size(PAGE) - 1];

        page.insert(b"k", &value).unwrap();
        assert_eq!(page.view().free_space(), 0);
        assert!(!page.view().can_insert(0, 0));
        assert!(page.insert(b"", b"").is_err());
    }

    #[test]
    fn test_validate_detects_bad_free_end() {
        let mut data = vec![0u8; PAGE];
        {
            let mut page = new_page(&mut data);
            page.insert(b"key", b"value").unwrap();
        }
        set_free_end(&mut data, PAGE - 1);
        assert!(matches!(
            BucketPageRef::new(&data).validate(),
            Err(FileHashError::Corrupt(_))
        ));
    }
}
