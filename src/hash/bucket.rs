use bytes::Bytes;
use tracing::trace;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{FileHashError, PageId, Result};
use crate::storage::page::{BucketPage, BucketPageRef, PageProlog, PageType};

/// Views `data` as a bucket or overflow page after checking its type and
/// free-space bookkeeping.
pub(crate) fn checked_page(page_id: PageId, data: &[u8]) -> Result<BucketPageRef<'_>> {
    let page = BucketPageRef::new(data);
    let is_bucket = matches!(
        page.page_type(),
        Some(PageType::Bucket) | Some(PageType::Overflow)
    );
    if !page.is_initialized() || !is_bucket {
        return Err(FileHashError::corrupt(format!(
            "{} is not a bucket page",
            page_id
        )));
    }
    page.validate()?;
    Ok(page)
}

/// A bucket's primary page and its overflow chain.
pub(crate) struct BucketChain<'a> {
    pool: &'a BufferPoolManager,
    head: PageId,
}

impl<'a> BucketChain<'a> {
    pub fn new(pool: &'a BufferPoolManager, head: PageId) -> Self {
        Self { pool, head }
    }

    /// Formats an empty primary page.
    pub fn init(&self) -> Result<()> {
        let mut guard = self.pool.new_page(self.head)?;
        BucketPage::new(guard.data_mut()).init(self.head, PageType::Bucket);
        Ok(())
    }

    /// Advances a chain walk. A chain longer than the file means a cycle.
    fn step(&self, hops: &mut u32, next: Option<PageId>) -> Result<Option<PageId>> {
        *hops += 1;
        if *hops > self.pool.alloc_state().npages.max(1) {
            return Err(FileHashError::corrupt(format!(
                "overflow chain of {} does not terminate",
                self.head
            )));
        }
        Ok(next)
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let mut hops = 0;
        let mut next = Some(self.head);
        while let Some(pid) = next {
            let guard = self.pool.read_page(pid)?;
            let page = checked_page(pid, guard.data())?;
            if let Some(slot) = page.find(key) {
                return Ok(page.value(slot).map(Bytes::copy_from_slice));
            }
            next = self.step(&mut hops, page.next_page())?;
        }
        Ok(None)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Stores a record whose key is not in the chain. Uses the first page
    /// with room, else links a new overflow page at the end. Returns
    /// whether an overflow page was added.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.insert_skipping(key, value, None)
    }

    /// `insert` while the caller holds `held`. That page is walked through
    /// but never receives the record.
    fn insert_skipping(
        &self,
        key: &[u8],
        value: &[u8],
        mut held: Option<&mut WritePageGuard<'a>>,
    ) -> Result<bool> {
        let mut hops = 0;
        let mut pid = self.head;
        loop {
            let mut pinned;
            let (guard, skip) = match held.as_deref_mut() {
                Some(g) if g.page_id() == pid => (g, true),
                _ => {
                    pinned = self.pool.write_page(pid)?;
                    (&mut pinned, false)
                }
            };
            let (fits, next) = {
                let page = checked_page(pid, guard.data())?;
                (
                    !skip && page.can_insert(key.len(), value.len()),
                    page.next_page(),
                )
            };
            if fits {
                BucketPage::new(guard.data_mut()).insert(key, value)?;
                return Ok(false);
            }

            match self.step(&mut hops, next)? {
                Some(n) => pid = n,
                None => {
                    let new_pid = self.pool.allocate_page()?;
                    {
                        let mut new_guard = self.pool.new_page(new_pid)?;
                        let mut page = BucketPage::new(new_guard.data_mut());
                        page.init(new_pid, PageType::Overflow);
                        page.insert(key, value)?;
                    }
                    BucketPage::new(guard.data_mut()).set_next_page(Some(new_pid));
                    trace!(head = %self.head, overflow = %new_pid, "linked overflow page");
                    return Ok(true);
                }
            }
        }
    }

    /// Overwrites the value of `key`. Returns `None` when the chain does
    /// not hold the key, else whether an overflow page was added.
    ///
    /// The new record goes into the old one's page when it fits there.
    /// Otherwise it is stored elsewhere before the old record is deleted,
    /// so a failed replace leaves the old value readable.
    pub fn replace(&self, key: &[u8], value: &[u8]) -> Result<Option<bool>> {
        let mut hops = 0;
        let mut prev: Option<PageId> = None;
        let mut pid = self.head;
        loop {
            let mut guard = self.pool.write_page(pid)?;
            let (slot, in_place, next) = {
                let page = checked_page(pid, guard.data())?;
                let slot = page.find(key);
                let in_place =
                    slot.map_or(false, |s| page.can_replace(s, key.len(), value.len()));
                (slot, in_place, page.next_page())
            };

            let Some(slot) = slot else {
                match self.step(&mut hops, next)? {
                    Some(n) => {
                        prev = Some(pid);
                        pid = n;
                        continue;
                    }
                    None => return Ok(None),
                }
            };

            if in_place {
                let mut page = BucketPage::new(guard.data_mut());
                page.delete(slot)?;
                page.insert(key, value)?;
                return Ok(Some(false));
            }

            let overflowed = self.insert_skipping(key, value, Some(&mut guard))?;
            let (emptied, next) = {
                let mut page = BucketPage::new(guard.data_mut());
                page.delete(slot)?;
                let view = page.view();
                (view.is_empty(), view.next_page())
            };
            drop(guard);
            if let (true, Some(prev)) = (emptied, prev) {
                self.unlink(prev, pid, next)?;
            }
            return Ok(Some(overflowed));
        }
    }

    /// Unlinks the empty overflow page `pid` that follows `prev` and frees it.
    fn unlink(&self, prev: PageId, pid: PageId, next: Option<PageId>) -> Result<()> {
        {
            let mut prev_guard = self.pool.write_page(prev)?;
            BucketPage::new(prev_guard.data_mut()).set_next_page(next);
        }
        self.pool.free_page(pid)?;
        trace!(head = %self.head, overflow = %pid, "released empty overflow page");
        Ok(())
    }

    /// Deletes `key`. An overflow page left empty is unlinked and freed.
    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        Ok(self.remove_in(key, None)?.is_some())
    }

    /// Deletes `key` from the first page holding it, or only from `target`.
    /// Returns `None` when nothing was deleted, else whether the page was
    /// released.
    fn remove_in(&self, key: &[u8], target: Option<PageId>) -> Result<Option<bool>> {
        let mut hops = 0;
        let mut prev: Option<PageId> = None;
        let mut pid = self.head;
        loop {
            let mut guard = self.pool.write_page(pid)?;
            let (slot, next, count) = {
                let page = checked_page(pid, guard.data())?;
                let slot = match target {
                    Some(t) if t != pid => None,
                    _ => page.find(key),
                };
                (slot, page.next_page(), page.num_entries())
            };

            if let Some(slot) = slot {
                BucketPage::new(guard.data_mut()).delete(slot)?;
                drop(guard);
                if let (true, Some(prev)) = (count == 1, prev) {
                    self.unlink(prev, pid, next)?;
                    return Ok(Some(true));
                }
                return Ok(Some(false));
            }
            if target == Some(pid) {
                return Ok(None);
            }

            match self.step(&mut hops, next)? {
                Some(n) => {
                    prev = Some(pid);
                    pid = n;
                }
                None => return Ok(None),
            }
        }
    }

    /// Every record of the chain, primary page first.
    pub fn records(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut records = Vec::new();
        for pid in self.page_ids()? {
            let guard = self.pool.read_page(pid)?;
            let page = checked_page(pid, guard.data())?;
            records.extend(page.iter().map(|(k, v)| (k.to_vec(), v.to_vec())));
        }
        Ok(records)
    }

    /// First page of `pages` with room for a record.
    fn room_in(&self, pages: &[PageId], key_len: usize, value_len: usize) -> Result<Option<PageId>> {
        for &pid in pages {
            let guard = self.pool.read_page(pid)?;
            if checked_page(pid, guard.data())?.can_insert(key_len, value_len) {
                return Ok(Some(pid));
            }
        }
        Ok(None)
    }

    /// Moves records from the tail of the chain into free space nearer the
    /// head, releasing the overflow pages this empties. A record is stored
    /// in its new page before it leaves the old one. Returns the number of
    /// pages released.
    pub fn compact(&self) -> Result<usize> {
        let pages = self.page_ids()?;
        let mut released = 0;
        for (i, &src) in pages.iter().enumerate().skip(1).rev() {
            let records = {
                let guard = self.pool.read_page(src)?;
                let page = checked_page(src, guard.data())?;
                page.iter()
                    .map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .collect::<Vec<_>>()
            };
            for (key, value) in records {
                let Some(dst) = self.room_in(&pages[..i], key.len(), value.len())? else {
                    continue;
                };
                {
                    let mut guard = self.pool.write_page(dst)?;
                    BucketPage::new(guard.data_mut()).insert(&key, &value)?;
                }
                if self.remove_in(&key, Some(src))? == Some(true) {
                    released += 1;
                }
            }
        }
        Ok(released)
    }

    /// Page IDs of the chain, primary first.
    pub fn page_ids(&self) -> Result<Vec<PageId>> {
        let mut hops = 0;
        let mut ids = Vec::new();
        let mut next = Some(self.head);
        while let Some(pid) = next {
            let guard = self.pool.read_page(pid)?;
            let page = checked_page(pid, guard.data())?;
            ids.push(pid);
            next = self.step(&mut hops, page.next_page())?;
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::OpenFlags;
    use crate::storage::disk::DiskManager;
    use crate::storage::page::{max_record_size, PageChecksum};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    const PAGE: usize = 512;

    fn create_pool(frames: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::open(temp_file.path(), &OpenFlags::default(), PAGE).unwrap();
        let pool = BufferPoolManager::with_filter(frames, Arc::new(dm), Box::new(PageChecksum));
        (pool, temp_file)
    }

    fn new_chain(pool: &BufferPoolManager) -> BucketChain<'_> {
        let head = pool.allocate_page().unwrap();
        let chain = BucketChain::new(pool, head);
        chain.init().unwrap();
        chain
    }

    #[test]
    fn test_get_insert_remove() {
        let (pool, _temp) = create_pool(8);
        let chain = new_chain(&pool);

        assert!(!chain.insert(b"k1", b"v1").unwrap());
        assert_eq!(chain.get(b"k1").unwrap(), Some(Bytes::from_static(b"v1")));
        assert_eq!(chain.get(b"k2").unwrap(), None);

        assert!(chain.remove(b"k1").unwrap());
        assert!(!chain.remove(b"k1").unwrap());
        assert!(!chain.contains(b"k1").unwrap());
    }

    #[test]
    fn test_overflow_chain_grows_and_shrinks() {
        let (pool, _temp) = create_pool(8);
        let chain = new_chain(&pool);
        let value = vec![1u8; 200];

        let mut overflowed = 0;
        for i in 0..6u8 {
            if chain.insert(&[i], &value).unwrap() {
                overflowed += 1;
            }
        }
        // Two 201-byte records fit a 512-byte page.
        assert_eq!(overflowed, 2);
        assert_eq!(chain.page_ids().unwrap().len(), 3);
        assert_eq!(chain.records().unwrap().len(), 6);

        // Emptying the last overflow page unlinks it.
        chain.remove(&[4]).unwrap();
        chain.remove(&[5]).unwrap();
        assert_eq!(chain.page_ids().unwrap().len(), 2);
        assert!(pool.alloc_state().free_head.is_some());
        for i in 0..4u8 {
            assert_eq!(chain.get(&[i]).unwrap().unwrap().len(), 200);
        }
    }

    #[test]
    fn test_replace_in_place_and_across_pages() {
        let (pool, _temp) = create_pool(8);
        let chain = new_chain(&pool);
        assert_eq!(chain.replace(b"k", b"v").unwrap(), None);

        chain.insert(b"k", &[1u8; 100]).unwrap();
        chain.insert(b"other", &[2u8; 250]).unwrap();
        assert_eq!(chain.replace(b"k", &[3u8; 50]).unwrap(), Some(false));
        assert_eq!(chain.page_ids().unwrap().len(), 1);

        // Too big for the primary page: moves to a new overflow page.
        assert_eq!(chain.replace(b"k", &[4u8; 300]).unwrap(), Some(true));
        assert_eq!(chain.get(b"k").unwrap().unwrap(), Bytes::from(vec![4u8; 300]));
        assert_eq!(chain.records().unwrap().len(), 2);
        assert_eq!(chain.page_ids().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_replace_keeps_old_value() {
        let (pool, _temp) = create_pool(3);
        let chain = new_chain(&pool);
        chain.insert(b"k", &[1u8; 100]).unwrap();
        chain.insert(b"other", &[2u8; 250]).unwrap();

        let a = pool.allocate_page().unwrap();
        let b = pool.allocate_page().unwrap();
        drop(pool.new_page(a).unwrap());
        drop(pool.new_page(b).unwrap());
        let pin_a = pool.read_page(a).unwrap();
        let pin_b = pool.read_page(b).unwrap();

        assert!(matches!(
            chain.replace(b"k", &[3u8; 300]),
            Err(FileHashError::PoolExhausted)
        ));
        drop(pin_a);
        drop(pin_b);

        assert_eq!(chain.get(b"k").unwrap().unwrap(), Bytes::from(vec![1u8; 100]));
        assert_eq!(chain.records().unwrap().len(), 2);
    }

    #[test]
    fn test_compact_moves_records_forward() {
        let (pool, _temp) = create_pool(8);
        let chain = new_chain(&pool);
        let value = vec![2u8; 200];
        for i in 0..6u8 {
            chain.insert(&[i], &value).unwrap();
        }
        // Leave holes in every page.
        for i in [0u8, 2, 4] {
            chain.remove(&[i]).unwrap();
        }
        assert_eq!(chain.page_ids().unwrap().len(), 3);

        assert_eq!(chain.compact().unwrap(), 1);
        assert_eq!(chain.page_ids().unwrap().len(), 2);
        assert_eq!(chain.records().unwrap().len(), 3);
        for i in [1u8, 3, 5] {
            assert!(chain.contains(&[i]).unwrap());
        }
        assert_eq!(chain.compact().unwrap(), 0);
    }

    #[test]
    fn test_largest_record_fits_empty_page() {
        let (pool, _temp) = create_pool(8);
        let chain = new_chain(&pool);
        let value = vec![9u8; max_record_size(PAGE) - 3];
        assert!(!chain.insert(b"key", &value).unwrap());
        assert_eq!(chain.get(b"key").unwrap().unwrap().len(), value.len());
    }

    #[test]
    fn test_non_bucket_page_is_corrupt() {
        let (pool, _temp) = create_pool(8);
        let head = pool.allocate_page().unwrap();
        drop(pool.new_page(head).unwrap());
        let chain = BucketChain::new(&pool, head);
        assert!(matches!(chain.get(b"x"), Err(FileHashError::Corrupt(_))));
    }
}
