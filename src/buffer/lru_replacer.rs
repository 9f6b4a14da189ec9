use crate::common::FrameId;
use crate::list::TailQueue;

use super::{FrameMeta, LruLinks};

/// Strict LRU replacement policy.
///
/// Evictable frames sit in a tail queue threaded through their `lru` link:
/// the head is the least recently used frame, the tail the most recently
/// used. A frame is in the queue iff it holds a page and its pin count is
/// zero, so pinning removes it and the last unpin appends it at the tail.
#[derive(Debug, Default)]
pub struct LruReplacer {
    queue: TailQueue<LruLinks>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            queue: TailQueue::new(),
        }
    }

    /// Removes and returns the least recently used frame.
    pub fn evict(&mut self, frames: &mut [FrameMeta]) -> Option<FrameId> {
        self.queue
            .remove_head(frames)
            .map(|i| FrameId::new(i as u32))
    }

    /// Adds the frame at the MRU end, or takes it out of the queue.
    pub fn set_evictable(&mut self, frames: &mut [FrameMeta], frame_id: FrameId, evictable: bool) {
        let i = frame_id.as_usize();
        let linked = frames[i].lru.is_linked();
        match (evictable, linked) {
            (true, false) => self.queue.insert_tail(frames, i),
            (false, true) => self.queue.remove(frames, i),
            _ => {}
        }
    }

    /// Puts back a frame whose eviction had to be abandoned, keeping it
    /// first in line.
    pub fn restore(&mut self, frames: &mut [FrameMeta], frame_id: FrameId) {
        let i = frame_id.as_usize();
        if !frames[i].lru.is_linked() {
            self.queue.insert_head(frames, i);
        }
    }

    /// Frames from least to most recently used.
    pub fn order(&self, frames: &[FrameMeta]) -> Vec<FrameId> {
        self.queue
            .iter(frames)
            .map(|i| FrameId::new(i as u32))
            .collect()
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.queue.len()
    }

    /// Empties the queue, unlinking every frame.
    pub fn clear(&mut self, frames: &mut [FrameMeta]) {
        while self.queue.remove_head(frames).is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<FrameMeta> {
        vec![FrameMeta::default(); n]
    }

    #[test]
    fn test_lru_replacer_evict_empty() {
        let mut f = frames(3);
        let mut replacer = LruReplacer::new();
        assert_eq!(replacer.evict(&mut f), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_replacer_basic() {
        let mut f = frames(4);
        let mut replacer = LruReplacer::new();
        for i in [2, 0, 3] {
            replacer.set_evictable(&mut f, FrameId::new(i), true);
        }
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.evict(&mut f), Some(FrameId::new(2)));
        assert_eq!(replacer.evict(&mut f), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(&mut f), Some(FrameId::new(3)));
        assert_eq!(replacer.evict(&mut f), None);
    }

    #[test]
    fn test_lru_replacer_repin_moves_to_mru() {
        let mut f = frames(3);
        let mut replacer = LruReplacer::new();
        for i in 0..3 {
            replacer.set_evictable(&mut f, FrameId::new(i), true);
        }
        // Pin then unpin frame 0: it becomes most recently used.
        replacer.set_evictable(&mut f, FrameId::new(0), false);
        assert_eq!(replacer.size(), 2);
        replacer.set_evictable(&mut f, FrameId::new(0), true);

        assert_eq!(
            replacer.order(&f),
            vec![FrameId::new(1), FrameId::new(2), FrameId::new(0)]
        );
    }

    #[test]
    fn test_lru_replacer_idempotent_and_restore() {
        let mut f = frames(2);
        let mut replacer = LruReplacer::new();
        replacer.set_evictable(&mut f, FrameId::new(0), true);
        replacer.set_evictable(&mut f, FrameId::new(0), true);
        replacer.set_evictable(&mut f, FrameId::new(1), true);
        assert_eq!(replacer.size(), 2);

        let victim = replacer.evict(&mut f).unwrap();
        assert_eq!(victim, FrameId::new(0));
        replacer.restore(&mut f, victim);
        assert_eq!(replacer.evict(&mut f), Some(FrameId::new(0)));

        replacer.clear(&mut f);
        assert_eq!(replacer.size(), 0);
        assert!(!f[1].lru.is_linked());
    }
}
