use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::buffer::{AllocState, BufferPoolManager, PoolStats};
use crate::common::{
    BucketId, FileHashError, HashFn, HashOptions, OpenFlags, PageId, Result, HEADER_PAGE_ID,
    INVALID_PAGE_ID, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
use crate::storage::disk::DiskManager;
use crate::storage::page::{
    config_pages, max_record_size, set_next_page, user_info_pages, ConfigInfo, ConfigPage,
    FreePage, HashHeader, HeaderPage, PageChecksum, PageProlog, UserInfoPage, HEADER_AREA_SIZE,
};

use super::bucket::BucketChain;
use super::directory::{Expansion, HashDirectory};
use super::hash_func::CHARKEY;

/// Space and cache figures of an open table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub num_keys: u64,
    pub num_buckets: u32,
    pub split_pointer: u32,
    pub split_level: u32,
    pub page_size: usize,
    /// Pages allocated in the file, header and free pages included
    pub num_pages: u32,
    pub overflow_pages: u32,
    pub free_pages: u32,
    pub pool: PoolStats,
}

/// Pages given back by `rearrange_pages`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rearranged {
    /// Overflow pages emptied by compaction and put on the free list
    pub released: u32,
    /// Free pages cut from the end of the file
    pub truncated: u32,
}

/// A linear hash table stored in one file.
///
/// Every page goes through the buffer pool. The header lives in memory
/// while the table is open and is written to page 0 by `sync`, after all
/// other dirty pages.
pub struct HashTable {
    pub(super) pool: BufferPoolManager,
    pub(super) hdr: HashHeader,
    pub(super) dir: HashDirectory,
    hash_fn: HashFn,
    read_only: bool,
    rearrange: bool,
}

impl HashTable {
    /// Opens the table at `path`, creating it when the file is empty or
    /// `flags.truncate` is set.
    pub fn open<P: AsRef<Path>>(path: P, flags: &OpenFlags, opts: &HashOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut dm = DiskManager::open(path, flags, opts.bucket_size)?;
        if dm.file_len()? == 0 {
            if flags.read_only {
                return Err(FileHashError::Open(format!(
                    "{} is empty and opened read-only",
                    path.display()
                )));
            }
            return Self::create(dm, opts);
        }

        let mut area = vec![0u8; HEADER_AREA_SIZE];
        dm.read_at(0, &mut area)?;
        let hdr = HeaderPage::read(&area)
            .map_err(|e| FileHashError::Open(format!("{}: {}", path.display(), e)))?;

        let bsize = hdr.bsize as usize;
        if !bsize.is_power_of_two()
            || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&bsize)
            || 1usize << hdr.bshift != bsize
        {
            return Err(FileHashError::Open(format!(
                "{}: bad page size {} in header",
                path.display(),
                hdr.bsize
            )));
        }
        if hdr.h_charkey != (opts.hash_fn)(CHARKEY) {
            return Err(FileHashError::Open(format!(
                "{}: file was built with a different hash function",
                path.display()
            )));
        }
        dm.set_page_size(bsize)?;

        let dir = HashDirectory::from_header(&hdr);
        dir.validate(hdr.npages)?;

        let pool = BufferPoolManager::with_filter(
            opts.pool_frames(bsize),
            Arc::new(dm),
            Box::new(PageChecksum),
        );
        pool.set_alloc_state(AllocState {
            npages: hdr.npages,
            free_head: (hdr.free_head != INVALID_PAGE_ID).then_some(hdr.free_head),
        });

        info!(
            path = %path.display(),
            buckets = dir.num_buckets(),
            keys = hdr.nkeys,
            page_size = bsize,
            read_only = flags.read_only,
            "opened hash table"
        );
        Ok(Self {
            pool,
            hdr,
            dir,
            hash_fn: opts.hash_fn,
            read_only: flags.read_only,
            rearrange: opts.rearrange_pages,
        })
    }

    /// Lays out a new table: header page, user info pages, configuration
    /// pages, then one page per initial bucket.
    fn create(dm: DiskManager, opts: &HashOptions) -> Result<Self> {
        opts.validate()?;
        let bsize = opts.bucket_size;
        let uinfo_npages = user_info_pages(opts.user_info_len, bsize);
        let cfg_npages = config_pages(opts.num_configs as usize, bsize);
        let hdr_pages = 1 + uinfo_npages + cfg_npages;
        let dir = HashDirectory::new(opts.nbuckets, hdr_pages);

        let path = dm.get_db_path().to_path_buf();
        let pool = BufferPoolManager::with_filter(
            opts.pool_frames(bsize),
            Arc::new(dm),
            Box::new(PageChecksum),
        );
        pool.set_alloc_state(AllocState {
            npages: hdr_pages + dir.num_buckets(),
            free_head: None,
        });

        let hdr = HashHeader {
            bsize: bsize as u32,
            bshift: bsize.trailing_zeros(),
            ffactor: opts.fill_factor,
            hdr_pages,
            uinfo_len: opts.user_info_len as u32,
            uinfo_page: PageId::new(1),
            uinfo_npages,
            config_page: PageId::new(1 + uinfo_npages),
            num_configs: 0,
            h_charkey: (opts.hash_fn)(CHARKEY),
            ..Default::default()
        };

        let mut table = Self {
            pool,
            hdr,
            dir,
            hash_fn: opts.hash_fn,
            read_only: false,
            rearrange: opts.rearrange_pages,
        };

        for i in 0..uinfo_npages {
            let pid = PageId::new(1 + i);
            let mut guard = table.pool.new_page(pid)?;
            UserInfoPage::init(guard.data_mut(), pid);
        }
        // Chain the reserved configuration pages before the slots are written.
        let first_cfg = table.hdr.config_page.as_u32();
        for i in 0..cfg_npages {
            let pid = PageId::new(first_cfg + i);
            let next = (i + 1 < cfg_npages).then(|| PageId::new(pid.as_u32() + 1));
            let mut guard = table.pool.new_page(pid)?;
            ConfigPage::init(guard.data_mut(), pid);
            set_next_page(guard.data_mut(), next);
        }
        let slots: Vec<_> = (0..opts.num_configs)
            .map(|i| ConfigInfo::new(i, ""))
            .collect();
        table.write_configs(&slots)?;
        for b in 0..table.dir.num_buckets() {
            let page = table.dir.bucket_page(BucketId::new(b));
            BucketChain::new(&table.pool, page).init()?;
        }

        table.sync()?;
        info!(
            path = %path.display(),
            buckets = table.dir.num_buckets(),
            page_size = bsize,
            "created hash table"
        );
        Ok(table)
    }

    pub(super) fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(FileHashError::ReadOnly);
        }
        Ok(())
    }

    fn check_record(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let size = key.len() + value.len();
        let max = max_record_size(self.page_size());
        if size > max {
            return Err(FileHashError::RecordTooLarge { size, max });
        }
        Ok(())
    }

    fn chain_for(&self, key: &[u8]) -> BucketChain<'_> {
        let bucket = self.dir.bucket_for_hash((self.hash_fn)(key));
        BucketChain::new(&self.pool, self.dir.bucket_page(bucket))
    }

    /// Value stored under `key`, `None` when absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.chain_for(key).get(key)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.check_record(key, value)?;

        let chain = self.chain_for(key);
        let overflowed = match chain.replace(key, value)? {
            Some(overflowed) => overflowed,
            None => {
                let overflowed = chain.insert(key, value)?;
                self.hdr.nkeys += 1;
                overflowed
            }
        };
        self.maybe_split(overflowed)
    }

    /// Stores `value` under `key` only if the key is absent.
    pub fn put_new(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.check_record(key, value)?;

        let chain = self.chain_for(key);
        if chain.contains(key)? {
            return Err(FileHashError::KeyExists);
        }
        let overflowed = chain.insert(key, value)?;
        self.hdr.nkeys += 1;
        self.maybe_split(overflowed)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.check_writable()?;
        if !self.chain_for(key).remove(key)? {
            return Err(FileHashError::KeyNotFound);
        }
        self.hdr.nkeys = self.hdr.nkeys.saturating_sub(1);
        Ok(())
    }

    /// Splits one bucket when an insert linked an overflow page or the
    /// table is above its fill factor.
    fn maybe_split(&mut self, overflowed: bool) -> Result<()> {
        let limit = self.hdr.ffactor as u64 * self.dir.num_buckets() as u64;
        if overflowed || self.hdr.nkeys > limit {
            self.split()?;
        }
        Ok(())
    }

    /// Adds one bucket and moves the records of the bucket it replaces
    /// whose hash now selects the new one.
    fn split(&mut self) -> Result<()> {
        let e = self.dir.expand()?;
        if let Some((level, count)) = e.new_level {
            let first = self.pool.reserve_pages(count);
            self.dir.set_level_start(level, first);
            debug!(level, pages = count, %first, "reserved pages for split level");
        }

        self.redistribute(&e)?;

        if e.new_level.is_some() {
            // A new level changes where buckets live on disk.
            self.sync()?;
        }
        Ok(())
    }

    /// Fills the bucket created by `e`. The directory has already grown, so
    /// a failure leaves keys routed to a bucket that may not hold them and
    /// is reported as fatal.
    fn redistribute(&self, e: &Expansion) -> Result<()> {
        self.move_split_records(e).map_err(|err| {
            if err.is_fatal() {
                err
            } else {
                FileHashError::Invariant(format!(
                    "split of {} into {} failed: {}",
                    e.old_bucket, e.new_bucket, err
                ))
            }
        })
    }

    /// Copies each record that now hashes to the new bucket, then deletes
    /// it from the old one.
    fn move_split_records(&self, e: &Expansion) -> Result<()> {
        let old = BucketChain::new(&self.pool, self.dir.bucket_page(e.old_bucket));
        let new = BucketChain::new(&self.pool, self.dir.bucket_page(e.new_bucket));
        new.init()?;

        let records = old.records()?;
        let mut moved = 0usize;
        for (key, value) in &records {
            if self.dir.bucket_for_hash((self.hash_fn)(key)) == e.new_bucket {
                new.insert(key, value)?;
                old.remove(key)?;
                moved += 1;
            }
        }
        debug!(
            old = %e.old_bucket,
            new = %e.new_bucket,
            moved,
            kept = records.len() - moved,
            "split bucket"
        );
        Ok(())
    }

    /// Copies the directory and allocation state into the in-memory header.
    fn store_header(&mut self) {
        self.dir.store(&mut self.hdr);
        let alloc = self.pool.alloc_state();
        self.hdr.npages = alloc.npages;
        self.hdr.free_head = alloc.free_head.unwrap_or(INVALID_PAGE_ID);
    }

    /// Writes every dirty page, then the header with the next generation,
    /// and syncs the file.
    pub fn sync(&mut self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.store_header();
        self.pool.flush_all_pages()?;

        self.hdr.generation += 1;
        {
            let mut guard = self.pool.write_page(HEADER_PAGE_ID)?;
            HeaderPage::write(guard.data_mut(), &self.hdr);
        }
        self.pool.flush_page(HEADER_PAGE_ID)?;
        self.pool.disk_manager().sync()?;
        debug!(generation = self.hdr.generation, "header flushed");
        Ok(())
    }

    /// Syncs and, if requested at open, compacts the file first.
    pub fn close(mut self) -> Result<()> {
        if !self.read_only {
            if self.rearrange {
                self.rearrange_pages()?;
            }
            self.sync()?;
        }
        info!(
            path = %self.pool.disk_manager().get_db_path().display(),
            keys = self.hdr.nkeys,
            "closed hash table"
        );
        Ok(())
    }

    /// Repacks every bucket chain and truncates free pages at the end of
    /// the file.
    pub fn rearrange_pages(&mut self) -> Result<Rearranged> {
        self.check_writable()?;
        let mut released = 0u32;
        for b in 0..self.dir.num_buckets() {
            let page = self.dir.bucket_page(BucketId::new(b));
            released += BucketChain::new(&self.pool, page).compact()? as u32;
        }
        let truncated = self.trim_free_tail()?;
        info!(released, truncated, "rearranged pages");
        Ok(Rearranged {
            released,
            truncated,
        })
    }

    /// Free list in link order.
    pub(super) fn free_list(&self) -> Result<Vec<PageId>> {
        let npages = self.pool.alloc_state().npages;
        let mut pages = Vec::new();
        let mut next = self.pool.alloc_state().free_head;
        while let Some(pid) = next {
            if pages.len() as u32 >= npages {
                return Err(FileHashError::corrupt("free list does not terminate"));
            }
            let guard = self.pool.read_page(pid)?;
            if !FreePage::is_free(guard.data()) {
                return Err(FileHashError::Invariant(format!(
                    "{} is on the free list but not free",
                    pid
                )));
            }
            pages.push(pid);
            next = guard.data().next_page();
        }
        Ok(pages)
    }

    fn trim_free_tail(&mut self) -> Result<u32> {
        let alloc = self.pool.alloc_state();
        let free = self.free_list()?;
        let mut free_set: HashSet<u32> = free.iter().map(|p| p.as_u32()).collect();

        let mut npages = alloc.npages;
        while npages > self.hdr.hdr_pages && free_set.remove(&(npages - 1)) {
            npages -= 1;
        }
        if npages == alloc.npages {
            return Ok(0);
        }

        for pid in npages..alloc.npages {
            self.pool.discard_page(PageId::new(pid))?;
        }
        let kept: Vec<PageId> = free.into_iter().filter(|p| p.as_u32() < npages).collect();
        for (i, &pid) in kept.iter().enumerate() {
            let mut guard = self.pool.write_page(pid)?;
            set_next_page(guard.data_mut(), kept.get(i + 1).copied());
        }
        self.pool.set_alloc_state(AllocState {
            npages,
            free_head: kept.first().copied(),
        });
        // The header must stop naming the tail before the file loses it.
        self.sync()?;
        self.pool.disk_manager().truncate(npages)?;
        Ok(alloc.npages - npages)
    }

    /// Drops every cached page without writing anything back.
    pub fn discard(&self) {
        self.pool.discard_all();
    }

    pub fn num_keys(&self) -> u64 {
        self.hdr.nkeys
    }

    pub fn num_buckets(&self) -> u32 {
        self.dir.num_buckets()
    }

    pub fn split_pointer(&self) -> BucketId {
        self.dir.split_pointer()
    }

    pub fn page_size(&self) -> usize {
        self.pool.page_size()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Largest key plus value length accepted by `put`.
    pub fn max_record_size(&self) -> usize {
        max_record_size(self.page_size())
    }

    /// Walks every chain and the free list.
    pub fn stats(&self) -> Result<TableStats> {
        let mut overflow_pages = 0u32;
        for b in 0..self.dir.num_buckets() {
            let page = self.dir.bucket_page(BucketId::new(b));
            let len = BucketChain::new(&self.pool, page).page_ids()?.len() as u32;
            overflow_pages += len.saturating_sub(1);
        }
        Ok(TableStats {
            num_keys: self.hdr.nkeys,
            num_buckets: self.dir.num_buckets(),
            split_pointer: self.dir.split_pointer().as_u32(),
            split_level: self.dir.level(),
            page_size: self.page_size(),
            num_pages: self.pool.alloc_state().npages,
            overflow_pages,
            free_pages: self.free_list()?.len() as u32,
            pool: self.pool.stats(),
        })
    }
}
