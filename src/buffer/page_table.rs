use crate::common::{FrameId, PageId};
use crate::list::CircleQueue;

use super::{ChainLinks, FrameMeta};

/// Maps resident page IDs to frames.
///
/// Open hashing over circular chains threaded through each frame's `chain`
/// link. A lookup walks one chain until it comes back around to the head.
#[derive(Debug)]
pub struct PageTable {
    chains: Vec<CircleQueue<ChainLinks>>,
    len: usize,
}

impl PageTable {
    pub fn new(num_chains: usize) -> Self {
        let num_chains = num_chains.max(1);
        Self {
            chains: (0..num_chains).map(|_| CircleQueue::new()).collect(),
            len: 0,
        }
    }

    fn chain_of(&self, page_id: PageId) -> usize {
        page_id.as_u32() as usize % self.chains.len()
    }

    pub fn lookup(&self, frames: &[FrameMeta], page_id: PageId) -> Option<FrameId> {
        self.chains[self.chain_of(page_id)]
            .find(frames, |meta| meta.page_id == page_id)
            .map(|i| FrameId::new(i as u32))
    }

    /// Registers the frame under the page ID it currently holds.
    pub fn insert(&mut self, frames: &mut [FrameMeta], frame_id: FrameId) {
        let chain = self.chain_of(frames[frame_id.as_usize()].page_id);
        self.chains[chain].insert_head(frames, frame_id.as_usize());
        self.len += 1;
    }

    pub fn remove(&mut self, frames: &mut [FrameMeta], frame_id: FrameId) {
        let i = frame_id.as_usize();
        if !frames[i].chain.is_linked() {
            return;
        }
        let chain = self.chain_of(frames[i].page_id);
        self.chains[chain].remove(frames, i);
        self.len -= 1;
    }

    /// Resident page IDs with their frames.
    pub fn entries(&self, frames: &[FrameMeta]) -> Vec<(PageId, FrameId)> {
        self.chains
            .iter()
            .flat_map(|chain| chain.iter(frames))
            .map(|i| (frames[i].page_id, FrameId::new(i as u32)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_page(pid: u32) -> FrameMeta {
        FrameMeta {
            page_id: PageId::new(pid),
            ..Default::default()
        }
    }

    #[test]
    fn test_lookup_through_colliding_chain() {
        // Two chains: pages 1, 3, 5 all land in chain 1.
        let mut frames: Vec<_> = [1, 3, 5, 2].into_iter().map(frame_with_page).collect();
        let mut table = PageTable::new(2);
        for i in 0..4 {
            table.insert(&mut frames, FrameId::new(i));
        }
        assert_eq!(table.len(), 4);
        assert_eq!(table.lookup(&frames, PageId::new(3)), Some(FrameId::new(1)));
        assert_eq!(table.lookup(&frames, PageId::new(2)), Some(FrameId::new(3)));
        assert_eq!(table.lookup(&frames, PageId::new(7)), None);

        table.remove(&mut frames, FrameId::new(1));
        assert_eq!(table.lookup(&frames, PageId::new(3)), None);
        assert_eq!(table.lookup(&frames, PageId::new(5)), Some(FrameId::new(2)));
        assert_eq!(table.entries(&frames).len(), 3);
    }

    #[test]
    fn test_remove_unlinked_is_noop() {
        let mut frames = vec![frame_with_page(4)];
        let mut table = PageTable::new(8);
        table.remove(&mut frames, FrameId::new(0));
        assert!(table.is_empty());
    }
}
