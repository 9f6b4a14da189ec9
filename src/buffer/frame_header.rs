use parking_lot::RwLock;

use crate::common::{FrameId, PageId, INVALID_PAGE_ID};
use crate::list::{Adapter, DoubleLink, SingleLink};

/// FrameHeader owns the bytes of one buffer frame.
///
/// The buffer is allocated on first use, so a large pool that is never
/// filled costs only its bookkeeping. Page guards hold the data latch for
/// their lifetime.
pub struct FrameHeader {
    /// The frame ID (index in the buffer pool)
    frame_id: FrameId,
    /// The page bytes (pub(crate) for page guard access)
    pub(crate) data: RwLock<Vec<u8>>,
}

impl FrameHeader {
    /// Creates a new FrameHeader for the given frame ID.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            data: RwLock::new(Vec::new()),
        }
    }

    /// Returns the frame ID.
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

/// Per-frame bookkeeping, guarded by the pool mutex.
///
/// A frame is threaded through the intrusive lists of the pool: the free
/// list while it holds no page, its page-table hash chain while it does,
/// and the LRU queue while it holds a page nobody has pinned.
#[derive(Debug, Clone)]
pub struct FrameMeta {
    /// The page ID stored in this frame (INVALID_PAGE_ID if empty)
    pub page_id: PageId,
    /// Number of guards currently holding this frame
    pub pin_count: u32,
    /// Whether one of those guards is a writer
    pub write_pinned: bool,
    /// Whether the page has been modified since being read from disk
    pub is_dirty: bool,
    pub(crate) lru: DoubleLink,
    pub(crate) chain: DoubleLink,
    pub(crate) free: SingleLink,
}

impl Default for FrameMeta {
    fn default() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            write_pinned: false,
            is_dirty: false,
            lru: DoubleLink::new(),
            chain: DoubleLink::new(),
            free: SingleLink::new(),
        }
    }
}

impl FrameMeta {
    /// Forgets the page; list membership is the caller's job.
    pub fn reset(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.pin_count = 0;
        self.write_pinned = false;
        self.is_dirty = false;
    }
}

/// Threads frames through the LRU queue.
pub struct LruLinks;

impl Adapter for LruLinks {
    type Node = FrameMeta;
    type Link = DoubleLink;

    fn link(node: &FrameMeta) -> &DoubleLink {
        &node.lru
    }

    fn link_mut(node: &mut FrameMeta) -> &mut DoubleLink {
        &mut node.lru
    }
}

/// Threads frames through a page-table hash chain.
pub struct ChainLinks;

impl Adapter for ChainLinks {
    type Node = FrameMeta;
    type Link = DoubleLink;

    fn link(node: &FrameMeta) -> &DoubleLink {
        &node.chain
    }

    fn link_mut(node: &mut FrameMeta) -> &mut DoubleLink {
        &mut node.chain
    }
}

/// Threads empty frames through the free list.
pub struct FreeLinks;

impl Adapter for FreeLinks {
    type Node = FrameMeta;
    type Link = SingleLink;

    fn link(node: &FrameMeta) -> &SingleLink {
        &node.free
    }

    fn link_mut(node: &mut FrameMeta) -> &mut SingleLink {
        &mut node.free
    }
}
