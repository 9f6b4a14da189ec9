use std::fmt;
use std::marker::PhantomData;

use super::{Adapter, SingleLink};

/// Singly linked list threaded through `A`'s link field.
pub struct SList<A> {
    head: Option<usize>,
    _adapter: PhantomData<A>,
}

impl<A> fmt::Debug for SList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SList").field("head", &self.head).finish()
    }
}

impl<A> Default for SList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> SList<A> {
    pub const fn new() -> Self {
        Self {
            head: None,
            _adapter: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn first(&self) -> Option<usize> {
        self.head
    }
}

impl<A: Adapter<Link = SingleLink>> SList<A> {
    /// Pushes `id` at the head.
    pub fn insert_head(&mut self, nodes: &mut [A::Node], id: usize) {
        let link = A::link_mut(&mut nodes[id]);
        debug_assert!(!link.linked, "node {} already on an slist", id);
        link.next = self.head;
        link.linked = true;
        self.head = Some(id);
    }

    /// Links `id` right after `after`, which must be on the list.
    pub fn insert_after(&mut self, nodes: &mut [A::Node], after: usize, id: usize) {
        let next = A::link(&nodes[after]).next;
        {
            let link = A::link_mut(&mut nodes[id]);
            debug_assert!(!link.linked, "node {} already on an slist", id);
            link.next = next;
            link.linked = true;
        }
        A::link_mut(&mut nodes[after]).next = Some(id);
    }

    /// Pops the head node.
    pub fn remove_head(&mut self, nodes: &mut [A::Node]) -> Option<usize> {
        let id = self.head?;
        let link = A::link_mut(&mut nodes[id]);
        self.head = link.next;
        *link = SingleLink::new();
        Some(id)
    }

    /// Unlinks `id` from anywhere in the list. Walks from the head.
    pub fn remove(&mut self, nodes: &mut [A::Node], id: usize) {
        debug_assert!(A::link(&nodes[id]).linked, "node {} not on an slist", id);
        if self.head == Some(id) {
            self.remove_head(nodes);
            return;
        }

        let mut cursor = self.head;
        while let Some(cur) = cursor {
            let next = A::link(&nodes[cur]).next;
            if next == Some(id) {
                let after = A::link(&nodes[id]).next;
                A::link_mut(&mut nodes[cur]).next = after;
                *A::link_mut(&mut nodes[id]) = SingleLink::new();
                return;
            }
            cursor = next;
        }
    }

    pub fn next(&self, nodes: &[A::Node], id: usize) -> Option<usize> {
        A::link(&nodes[id]).next
    }

    /// Iterates node indices from the head.
    pub fn iter<'a>(&self, nodes: &'a [A::Node]) -> SListIter<'a, A> {
        SListIter {
            nodes,
            cursor: self.head,
            _adapter: PhantomData,
        }
    }
}

pub struct SListIter<'a, A: Adapter> {
    nodes: &'a [A::Node],
    cursor: Option<usize>,
    _adapter: PhantomData<A>,
}

impl<'a, A: Adapter<Link = SingleLink>> Iterator for SListIter<'a, A> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let id = self.cursor?;
        self.cursor = A::link(&self.nodes[id]).next;
        Some(id)
    }
}
