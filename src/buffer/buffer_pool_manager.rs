use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::common::{FileHashError, FrameId, PageId, Result, INVALID_PAGE_ID};
use crate::list::SList;
use crate::storage::disk::DiskManager;
use crate::storage::page::{FreePage, PageProlog};

use super::{
    FrameHeader, FrameMeta, FreeLinks, LruReplacer, NoFilter, PageFilter, PageTable,
    ReadPageGuard, WritePageGuard,
};

/// Page allocation state, persisted by the owner in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocState {
    /// Number of pages handed out so far (the next fresh page number)
    pub npages: u32,
    /// Head of the on-disk free page list
    pub free_head: Option<PageId>,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub write_backs: u64,
}

/// Bookkeeping guarded by the pool mutex
struct PoolState {
    /// One entry per frame; the nodes of every intrusive list below
    meta: Vec<FrameMeta>,
    /// Page table: maps page IDs to frame IDs
    page_table: PageTable,
    /// Free list: frames that hold no page
    free_list: SList<FreeLinks>,
    /// LRU order of unpinned frames
    replacer: LruReplacer,
    alloc: AllocState,
    stats: PoolStats,
}

/// BufferPoolManager caches file pages in a fixed number of frames.
///
/// Every page access goes through a guard that pins the frame. Pinned
/// frames are never evicted; when all frames are pinned a request fails
/// with `PoolExhausted` instead of blocking. A page can have any number of
/// readers or a single writer; a conflicting request fails with `PageBusy`.
/// Dirty pages are written back when they are evicted or flushed.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    page_size: usize,
    frames: Vec<FrameHeader>,
    state: Mutex<PoolState>,
    disk_manager: Arc<DiskManager>,
    filter: Box<dyn PageFilter>,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames over the given disk manager.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_filter(pool_size, disk_manager, Box::new(NoFilter))
    }

    /// Creates a pool that runs `filter` on every page read and write.
    pub fn with_filter(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        filter: Box<dyn PageFilter>,
    ) -> Self {
        let pool_size = pool_size.max(1);
        let frames = (0..pool_size)
            .map(|i| FrameHeader::new(FrameId::new(i as u32)))
            .collect();

        let mut meta = vec![FrameMeta::default(); pool_size];
        let mut free_list = SList::new();
        for i in (0..pool_size).rev() {
            free_list.insert_head(&mut meta, i);
        }

        let npages = disk_manager.get_num_pages();
        Self {
            pool_size,
            page_size: disk_manager.page_size(),
            frames,
            state: Mutex::new(PoolState {
                meta,
                page_table: PageTable::new(pool_size),
                free_list,
                replacer: LruReplacer::new(),
                alloc: AllocState {
                    npages,
                    free_head: None,
                },
                stats: PoolStats::default(),
            }),
            disk_manager,
            filter,
        }
    }

    /// Pins a page for reading.
    pub fn read_page(&self, page_id: PageId) -> Result<ReadPageGuard<'_>> {
        let frame_id = self.pin(page_id, false, false)?;
        let frame = &self.frames[frame_id.as_usize()];
        match frame.data.try_read() {
            Some(data) => Ok(ReadPageGuard::new(self, page_id, frame_id, data)),
            None => {
                self.unpin(frame_id, false, false);
                Err(FileHashError::PageBusy(page_id))
            }
        }
    }

    /// Pins a page for writing.
    pub fn write_page(&self, page_id: PageId) -> Result<WritePageGuard<'_>> {
        let frame_id = self.pin(page_id, true, false)?;
        self.write_guard(page_id, frame_id, false)
    }

    /// Pins a page for writing without reading it from the file. The
    /// returned buffer is zeroed and the page is already dirty.
    pub fn new_page(&self, page_id: PageId) -> Result<WritePageGuard<'_>> {
        let frame_id = self.pin(page_id, true, true)?;
        self.write_guard(page_id, frame_id, true)
    }

    fn write_guard(
        &self,
        page_id: PageId,
        frame_id: FrameId,
        fresh: bool,
    ) -> Result<WritePageGuard<'_>> {
        let frame = &self.frames[frame_id.as_usize()];
        match frame.data.try_write() {
            Some(mut data) => {
                if fresh {
                    data.clear();
                    data.resize(self.page_size, 0);
                }
                Ok(WritePageGuard::new(self, page_id, frame_id, data, fresh))
            }
            None => {
                self.unpin(frame_id, false, true);
                Err(FileHashError::PageBusy(page_id))
            }
        }
    }

    /// Makes the page resident and takes one pin on it.
    fn pin(&self, page_id: PageId, for_write: bool, fresh: bool) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(FileHashError::InvalidPageId(page_id));
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let frame_id = match state.page_table.lookup(&state.meta, page_id) {
            Some(frame_id) => {
                let meta = &state.meta[frame_id.as_usize()];
                if meta.write_pinned || (for_write && meta.pin_count > 0) {
                    return Err(FileHashError::PageBusy(page_id));
                }
                state.stats.hits += 1;
                frame_id
            }
            None => {
                state.stats.misses += 1;
                let frame_id = self.get_free_frame(state)?;
                if let Err(e) = self.load_frame(state, frame_id, page_id, fresh) {
                    state.meta[frame_id.as_usize()].reset();
                    state.free_list.insert_head(&mut state.meta, frame_id.as_usize());
                    return Err(e);
                }
                frame_id
            }
        };

        state
            .replacer
            .set_evictable(&mut state.meta, frame_id, false);
        let meta = &mut state.meta[frame_id.as_usize()];
        meta.pin_count += 1;
        meta.write_pinned = for_write;
        if fresh {
            meta.is_dirty = true;
        }
        Ok(frame_id)
    }

    /// Reads `page_id` into an empty frame and registers it.
    fn load_frame(
        &self,
        state: &mut PoolState,
        frame_id: FrameId,
        page_id: PageId,
        fresh: bool,
    ) -> Result<()> {
        if !fresh {
            let mut data = self.frames[frame_id.as_usize()].data.write();
            data.resize(self.page_size, 0);
            self.disk_manager.read_page(page_id, &mut data)?;
            self.filter.page_in(page_id, &mut data)?;
            trace!(%page_id, %frame_id, "page read into frame");
        }
        let meta = &mut state.meta[frame_id.as_usize()];
        meta.page_id = page_id;
        meta.is_dirty = false;
        state.page_table.insert(&mut state.meta, frame_id);
        Ok(())
    }

    /// Releases one pin. Called from guard drops.
    pub(crate) fn unpin(&self, frame_id: FrameId, is_dirty: bool, was_writer: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let meta = &mut state.meta[frame_id.as_usize()];
        if meta.pin_count == 0 {
            // Frame was discarded while the guard was alive.
            return;
        }
        meta.pin_count -= 1;
        if was_writer {
            meta.write_pinned = false;
        }
        if is_dirty {
            meta.is_dirty = true;
        }
        if meta.pin_count == 0 {
            state.replacer.set_evictable(&mut state.meta, frame_id, true);
        }
    }

    /// Gets a free frame, either from the free list or by evicting a page.
    fn get_free_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(i) = state.free_list.remove_head(&mut state.meta) {
            return Ok(FrameId::new(i as u32));
        }

        let frame_id = state
            .replacer
            .evict(&mut state.meta)
            .ok_or(FileHashError::PoolExhausted)?;
        let meta = &state.meta[frame_id.as_usize()];
        let old_page_id = meta.page_id;

        if meta.is_dirty {
            let frame = &self.frames[frame_id.as_usize()];
            let written = self.write_back(old_page_id, &frame.data.read());
            if let Err(e) = written {
                state.replacer.restore(&mut state.meta, frame_id);
                return Err(e);
            }
            state.stats.write_backs += 1;
        }

        trace!(page_id = %old_page_id, %frame_id, "evicted page");
        state.stats.evictions += 1;
        state.page_table.remove(&mut state.meta, frame_id);
        state.meta[frame_id.as_usize()].reset();
        Ok(frame_id)
    }

    /// Runs the page-out filter on a copy and writes it.
    fn write_back(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        let mut out = data.to_vec();
        self.filter.page_out(page_id, &mut out);
        self.disk_manager.write_page(page_id, &out)
    }

    /// Writes a page back if it is resident and dirty.
    /// Returns whether the page was resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(FileHashError::InvalidPageId(page_id));
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(frame_id) = state.page_table.lookup(&state.meta, page_id) else {
            return Ok(false);
        };
        let meta = &state.meta[frame_id.as_usize()];
        if meta.is_dirty {
            if meta.write_pinned {
                return Err(FileHashError::PageBusy(page_id));
            }
            let data = self.frames[frame_id.as_usize()]
                .data
                .try_read()
                .ok_or(FileHashError::PageBusy(page_id))?;
            self.write_back(page_id, &data)?;
            state.meta[frame_id.as_usize()].is_dirty = false;
            state.stats.write_backs += 1;
        }
        Ok(true)
    }

    /// Writes back every dirty page, coalescing runs of consecutive page
    /// numbers into single writes.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut dirty: Vec<(PageId, FrameId)> = state
            .page_table
            .entries(&state.meta)
            .into_iter()
            .filter(|(_, fid)| state.meta[fid.as_usize()].is_dirty)
            .collect();
        if dirty.is_empty() {
            return Ok(());
        }
        dirty.sort();

        let mut start = 0;
        while start < dirty.len() {
            let mut end = start + 1;
            while end < dirty.len() && dirty[end].0.as_u32() == dirty[end - 1].0.as_u32() + 1 {
                end += 1;
            }

            let run = &dirty[start..end];
            let mut buf = Vec::with_capacity(run.len() * self.page_size);
            for &(page_id, frame_id) in run {
                if state.meta[frame_id.as_usize()].write_pinned {
                    return Err(FileHashError::PageBusy(page_id));
                }
                let data = self.frames[frame_id.as_usize()]
                    .data
                    .try_read()
                    .ok_or(FileHashError::PageBusy(page_id))?;
                let at = buf.len();
                buf.extend_from_slice(&data);
                self.filter.page_out(page_id, &mut buf[at..]);
            }
            self.disk_manager
                .write_pages(run[0].0, run.len() as u32, &buf)?;
            for &(_, frame_id) in run {
                state.meta[frame_id.as_usize()].is_dirty = false;
            }
            state.stats.write_backs += run.len() as u64;
            start = end;
        }
        debug!(pages = dirty.len(), "flushed dirty pages");
        Ok(())
    }

    /// Drops a resident page without writing it back.
    pub fn discard_page(&self, page_id: PageId) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(frame_id) = state.page_table.lookup(&state.meta, page_id) else {
            return Ok(());
        };
        if state.meta[frame_id.as_usize()].pin_count > 0 {
            return Err(FileHashError::PageBusy(page_id));
        }
        state.replacer.set_evictable(&mut state.meta, frame_id, false);
        state.page_table.remove(&mut state.meta, frame_id);
        state.meta[frame_id.as_usize()].reset();
        state.free_list.insert_head(&mut state.meta, frame_id.as_usize());
        Ok(())
    }

    /// Forgets every cached page, dirty or pinned, without writing anything.
    pub fn discard_all(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.replacer.clear(&mut state.meta);
        for (_, frame_id) in state.page_table.entries(&state.meta) {
            state.page_table.remove(&mut state.meta, frame_id);
        }
        while state.free_list.remove_head(&mut state.meta).is_some() {}
        for i in (0..self.pool_size).rev() {
            state.meta[i].reset();
            state.free_list.insert_head(&mut state.meta, i);
        }
        debug!("discarded all cached pages");
    }

    /// Returns a fresh page number, reusing a freed page when one exists.
    /// The caller formats the page through `new_page`.
    pub fn allocate_page(&self) -> Result<PageId> {
        let free_head = self.state.lock().alloc.free_head;
        if let Some(page_id) = free_head {
            let next = {
                let guard = self.read_page(page_id)?;
                if !FreePage::is_free(guard.data()) {
                    return Err(FileHashError::Invariant(format!(
                        "free list head {} is not a free page",
                        page_id
                    )));
                }
                guard.data().next_page()
            };
            self.state.lock().alloc.free_head = next;
            trace!(%page_id, "reused free page");
            return Ok(page_id);
        }

        let mut state = self.state.lock();
        let page_id = PageId::new(state.alloc.npages);
        state.alloc.npages += 1;
        Ok(page_id)
    }

    /// Reserves `count` consecutive fresh pages at the end of the file and
    /// returns the first. Never draws from the free list.
    pub fn reserve_pages(&self, count: u32) -> PageId {
        let mut state = self.state.lock();
        let first = PageId::new(state.alloc.npages);
        state.alloc.npages += count;
        first
    }

    /// Puts a page on the free list. Its old contents are gone.
    pub fn free_page(&self, page_id: PageId) -> Result<()> {
        let next = self.state.lock().alloc.free_head;
        {
            let mut guard = self.new_page(page_id)?;
            FreePage::init(guard.data_mut(), page_id, next);
        }
        self.state.lock().alloc.free_head = Some(page_id);
        trace!(%page_id, "freed page");
        Ok(())
    }

    pub fn alloc_state(&self) -> AllocState {
        self.state.lock().alloc
    }

    pub fn set_alloc_state(&self, alloc: AllocState) {
        self.state.lock().alloc = alloc;
    }

    /// Returns the pin count for a page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .lookup(&state.meta, page_id)
            .map(|fid| state.meta[fid.as_usize()].pin_count)
    }

    /// Whether a resident page has unwritten changes.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.state.lock();
        state
            .page_table
            .lookup(&state.meta, page_id)
            .map(|fid| state.meta[fid.as_usize()].is_dirty)
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        let state = self.state.lock();
        state.free_list.iter(&state.meta).count()
    }

    /// Resident page IDs from least to most recently used, pinned pages
    /// excluded.
    pub fn lru_order(&self) -> Vec<PageId> {
        let state = self.state.lock();
        state
            .replacer
            .order(&state.meta)
            .into_iter()
            .map(|fid| state.meta[fid.as_usize()].page_id)
            .collect()
    }

    pub fn stats(&self) -> PoolStats {
        self.state.lock().stats
    }

    pub fn disk_manager(&self) -> &DiskManager {
        &self.disk_manager
    }
}
