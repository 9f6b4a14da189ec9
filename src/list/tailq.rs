use std::fmt;
use std::marker::PhantomData;

use super::{Adapter, DoubleLink};

/// Doubly linked tail queue threaded through `A`'s link field.
pub struct TailQueue<A> {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    _adapter: PhantomData<A>,
}

impl<A> fmt::Debug for TailQueue<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TailQueue")
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("len", &self.len)
            .finish()
    }
}

impl<A> Default for TailQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> TailQueue<A> {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
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

    pub fn last(&self) -> Option<usize> {
        self.tail
    }
}

impl<A: Adapter<Link = DoubleLink>> TailQueue<A> {
    fn attach(nodes: &mut [A::Node], id: usize, prev: Option<usize>, next: Option<usize>) {
        let link = A::link_mut(&mut nodes[id]);
        debug_assert!(!link.linked, "node {} already on a tail queue", id);
        link.prev = prev;
        link.next = next;
        link.linked = true;
    }

    pub fn insert_head(&mut self, nodes: &mut [A::Node], id: usize) {
        let old = self.head;
        Self::attach(nodes, id, None, old);
        match old {
            Some(h) => A::link_mut(&mut nodes[h]).prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
    }

    pub fn insert_tail(&mut self, nodes: &mut [A::Node], id: usize) {
        let old = self.tail;
        Self::attach(nodes, id, old, None);
        match old {
            Some(t) => A::link_mut(&mut nodes[t]).next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    /// Links `id` right after `after`, which must be on the queue.
    pub fn insert_after(&mut self, nodes: &mut [A::Node], after: usize, id: usize) {
        let next = A::link(&nodes[after]).next;
        Self::attach(nodes, id, Some(after), next);
        A::link_mut(&mut nodes[after]).next = Some(id);
        match next {
            Some(n) => A::link_mut(&mut nodes[n]).prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
    }

    /// Links `id` right before `before`, which must be on the queue.
    pub fn insert_before(&mut self, nodes: &mut [A::Node], before: usize, id: usize) {
        let prev = A::link(&nodes[before]).prev;
        Self::attach(nodes, id, prev, Some(before));
        A::link_mut(&mut nodes[before]).prev = Some(id);
        match prev {
            Some(p) => A::link_mut(&mut nodes[p]).next = Some(id),
            None => self.head = Some(id),
        }
        self.len += 1;
    }

    pub fn remove(&mut self, nodes: &mut [A::Node], id: usize) {
        let DoubleLink { prev, next, linked } = *A::link(&nodes[id]);
        debug_assert!(linked, "node {} not on a tail queue", id);

        match prev {
            Some(p) => A::link_mut(&mut nodes[p]).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => A::link_mut(&mut nodes[n]).prev = prev,
            None => self.tail = prev,
        }
        *A::link_mut(&mut nodes[id]) = DoubleLink::new();
        self.len -= 1;
    }

    pub fn remove_head(&mut self, nodes: &mut [A::Node]) -> Option<usize> {
        let id = self.head?;
        self.remove(nodes, id);
        Some(id)
    }

    pub fn next(&self, nodes: &[A::Node], id: usize) -> Option<usize> {
        A::link(&nodes[id]).next
    }

    pub fn prev(&self, nodes: &[A::Node], id: usize) -> Option<usize> {
        A::link(&nodes[id]).prev
    }

    /// Iterates from head to tail.
    pub fn iter<'a>(&self, nodes: &'a [A::Node]) -> TailQueueIter<'a, A> {
        TailQueueIter {
            nodes,
            cursor: self.head,
            forward: true,
            _adapter: PhantomData,
        }
    }

    /// Iterates from tail to head.
    pub fn iter_rev<'a>(&self, nodes: &'a [A::Node]) -> TailQueueIter<'a, A> {
        TailQueueIter {
            nodes,
            cursor: self.tail,
            forward: false,
            _adapter: PhantomData,
        }
    }
}

pub struct TailQueueIter<'a, A: Adapter> {
    nodes: &'a [A::Node],
    cursor: Option<usize>,
    forward: bool,
    _adapter: PhantomData<A>,
}

impl<'a, A: Adapter<Link = DoubleLink>> Iterator for TailQueueIter<'a, A> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let id = self.cursor?;
        let link = A::link(&self.nodes[id]);
        self.cursor = if self.forward { link.next } else { link.prev };
        Some(id)
    }
}
