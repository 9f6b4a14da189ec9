use std::fmt;
use std::marker::PhantomData;

use super::{Adapter, DoubleLink};

/// Circular doubly linked queue threaded through `A`'s link field.
///
/// The last node links forward to the head and the head links back to the
/// last node. Traversal stops when it comes back around to the head.
pub struct CircleQueue<A> {
    head: Option<usize>,
    len: usize,
    _adapter: PhantomData<A>,
}

impl<A> fmt::Debug for CircleQueue<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircleQueue")
            .field("head", &self.head)
            .field("len", &self.len)
            .finish()
    }
}

impl<A> Default for CircleQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> CircleQueue<A> {
    pub const fn new() -> Self {
        Self {
            head: None,
            len: 0,
            _adapter: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> Option<usize> {
        self.head
    }
}

impl<A: Adapter<Link = DoubleLink>> CircleQueue<A> {
    pub fn last(&self, nodes: &[A::Node]) -> Option<usize> {
        self.head.and_then(|h| A::link(&nodes[h]).prev)
    }

    /// Splices `id` between `prev` and `next`, which are adjacent.
    fn splice(nodes: &mut [A::Node], id: usize, prev: usize, next: usize) {
        {
            let link = A::link_mut(&mut nodes[id]);
            debug_assert!(!link.linked, "node {} already on a circle queue", id);
            link.prev = Some(prev);
            link.next = Some(next);
            link.linked = true;
        }
        A::link_mut(&mut nodes[prev]).next = Some(id);
        A::link_mut(&mut nodes[next]).prev = Some(id);
    }

    fn insert_first(&mut self, nodes: &mut [A::Node], id: usize) {
        let link = A::link_mut(&mut nodes[id]);
        debug_assert!(!link.linked, "node {} already on a circle queue", id);
        link.prev = Some(id);
        link.next = Some(id);
        link.linked = true;
        self.head = Some(id);
        self.len = 1;
    }

    pub fn insert_head(&mut self, nodes: &mut [A::Node], id: usize) {
        match self.head {
            None => self.insert_first(nodes, id),
            Some(h) => {
                let last = A::link(&nodes[h]).prev.unwrap_or(h);
                Self::splice(nodes, id, last, h);
                self.head = Some(id);
                self.len += 1;
            }
        }
    }

    pub fn insert_tail(&mut self, nodes: &mut [A::Node], id: usize) {
        match self.head {
            None => self.insert_first(nodes, id),
            Some(h) => {
                let last = A::link(&nodes[h]).prev.unwrap_or(h);
                Self::splice(nodes, id, last, h);
                self.len += 1;
            }
        }
    }

    /// Links `id` right after `after`, which must be on the queue.
    pub fn insert_after(&mut self, nodes: &mut [A::Node], after: usize, id: usize) {
        let next = A::link(&nodes[after]).next.unwrap_or(after);
        Self::splice(nodes, id, after, next);
        self.len += 1;
    }

    /// Links `id` right before `before`, which must be on the queue.
    pub fn insert_before(&mut self, nodes: &mut [A::Node], before: usize, id: usize) {
        let prev = A::link(&nodes[before]).prev.unwrap_or(before);
        Self::splice(nodes, id, prev, before);
        if self.head == Some(before) {
            self.head = Some(id);
        }
        self.len += 1;
    }

    pub fn remove(&mut self, nodes: &mut [A::Node], id: usize) {
        let DoubleLink { prev, next, linked } = *A::link(&nodes[id]);
        debug_assert!(linked, "node {} not on a circle queue", id);

        if self.len == 1 {
            self.head = None;
        } else {
            let prev = prev.unwrap_or(id);
            let next = next.unwrap_or(id);
            A::link_mut(&mut nodes[prev]).next = Some(next);
            A::link_mut(&mut nodes[next]).prev = Some(prev);
            if self.head == Some(id) {
                self.head = Some(next);
            }
        }
        *A::link_mut(&mut nodes[id]) = DoubleLink::new();
        self.len -= 1;
    }

    /// Successor of `id`, or `None` when the walk wraps to the head.
    pub fn next(&self, nodes: &[A::Node], id: usize) -> Option<usize> {
        A::link(&nodes[id]).next.filter(|n| Some(*n) != self.head)
    }

    /// Predecessor of `id`, or `None` when `id` is the head.
    pub fn prev(&self, nodes: &[A::Node], id: usize) -> Option<usize> {
        if Some(id) == self.head {
            return None;
        }
        A::link(&nodes[id]).prev
    }

    /// Iterates once around the ring starting at the head.
    pub fn iter<'a>(&self, nodes: &'a [A::Node]) -> CircleQueueIter<'a, A> {
        CircleQueueIter {
            nodes,
            head: self.head,
            cursor: self.head,
            _adapter: PhantomData,
        }
    }

    /// First node satisfying `pred`, walking from the head.
    pub fn find<F>(&self, nodes: &[A::Node], mut pred: F) -> Option<usize>
    where
        F: FnMut(&A::Node) -> bool,
    {
        self.iter(nodes).find(|&id| pred(&nodes[id]))
    }
}

pub struct CircleQueueIter<'a, A: Adapter> {
    nodes: &'a [A::Node],
    head: Option<usize>,
    cursor: Option<usize>,
    _adapter: PhantomData<A>,
}

impl<'a, A: Adapter<Link = DoubleLink>> Iterator for CircleQueueIter<'a, A> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let id = self.cursor?;
        self.cursor = A::link(&self.nodes[id]).next.filter(|n| Some(*n) != self.head);
        Some(id)
    }
}
