use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};

use super::BufferPoolManager;

/// RAII guard for read-only access to a page.
/// Holds one pin and the frame's shared latch; both are released on drop.
pub struct ReadPageGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    frame_id: FrameId,
    data: Option<RwLockReadGuard<'a, Vec<u8>>>,
}

impl<'a> ReadPageGuard<'a> {
    pub(crate) fn new(
        pool: &'a BufferPoolManager,
        page_id: PageId,
        frame_id: FrameId,
        data: RwLockReadGuard<'a, Vec<u8>>,
    ) -> Self {
        Self {
            pool,
            page_id,
            frame_id,
            data: Some(data),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        // Release the latch before the pin.
        self.data.take();
        self.pool.unpin(self.frame_id, false, false);
    }
}

/// RAII guard for exclusive access to a page.
/// Marks the frame dirty on release if `data_mut` was ever called.
pub struct WritePageGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    frame_id: FrameId,
    is_dirty: bool,
    data: Option<RwLockWriteGuard<'a, Vec<u8>>>,
}

impl<'a> WritePageGuard<'a> {
    pub(crate) fn new(
        pool: &'a BufferPoolManager,
        page_id: PageId,
        frame_id: FrameId,
        data: RwLockWriteGuard<'a, Vec<u8>>,
        is_dirty: bool,
    ) -> Self {
        Self {
            pool,
            page_id,
            frame_id,
            is_dirty,
            data: Some(data),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns a mutable reference to the page data.
    /// Automatically marks the page as dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        match self.data.as_deref_mut() {
            Some(v) => v.as_mut_slice(),
            None => &mut [],
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }
}

impl Deref for WritePageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        self.data.take();
        self.pool.unpin(self.frame_id, self.is_dirty, true);
    }
}
