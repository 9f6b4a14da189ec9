//! Intrusive list kit.
//!
//! Nodes live in a caller-owned slice (for example the frame table of the
//! buffer pool) and carry their link fields inline. A list only stores the
//! indices of its ends, so insertion and removal never allocate. An
//! [`Adapter`] names which link field of the node a given list threads
//! through, which lets one record sit on several lists at once:
//!
//! - [`SList`]: singly linked, O(1) at the head, O(n) interior removal.
//! - [`TailQueue`]: doubly linked with head and tail, O(1) everywhere.
//! - [`CircleQueue`]: doubly linked ring, the head closes the cycle.
//!
//! Operations assume valid node state. Inserting a node that is already
//! linked, or removing one that is not on the list, is a caller bug; debug
//! builds assert on it.

mod circleq;
mod slist;
mod tailq;

pub use circleq::*;
pub use slist::*;
pub use tailq::*;

/// Selects the link field a list threads through.
pub trait Adapter {
    /// The record type holding the link
    type Node;
    /// `SingleLink` or `DoubleLink`
    type Link;

    fn link(node: &Self::Node) -> &Self::Link;
    fn link_mut(node: &mut Self::Node) -> &mut Self::Link;
}

/// Link field for [`SList`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleLink {
    pub(crate) next: Option<usize>,
    pub(crate) linked: bool,
}

impl SingleLink {
    pub const fn new() -> Self {
        Self {
            next: None,
            linked: false,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }
}

/// Link field for [`TailQueue`] and [`CircleQueue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoubleLink {
    pub(crate) prev: Option<usize>,
    pub(crate) next: Option<usize>,
    pub(crate) linked: bool,
}

impl DoubleLink {
    pub const fn new() -> Self {
        Self {
            prev: None,
            next: None,
            linked: false,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{Adapter, DoubleLink, SingleLink};

    /// A node sitting on two lists at once.
    #[derive(Debug, Default)]
    pub struct Node {
        pub value: u32,
        pub a: DoubleLink,
        pub b: DoubleLink,
        pub s: SingleLink,
    }

    pub fn nodes(n: u32) -> Vec<Node> {
        (0..n)
            .map(|value| Node {
                value,
                ..Default::default()
            })
            .collect()
    }

    pub struct ByA;
    impl Adapter for ByA {
        type Node = Node;
        type Link = DoubleLink;
        fn link(node: &Node) -> &DoubleLink {
            &node.a
        }
        fn link_mut(node: &mut Node) -> &mut DoubleLink {
            &mut node.a
        }
    }

    pub struct ByB;
    impl Adapter for ByB {
        type Node = Node;
        type Link = DoubleLink;
        fn link(node: &Node) -> &DoubleLink {
            &node.b
        }
        fn link_mut(node: &mut Node) -> &mut DoubleLink {
            &mut node.b
        }
    }

    pub struct ByS;
    impl Adapter for ByS {
        type Node = Node;
        type Link = SingleLink;
        fn link(node: &Node) -> &SingleLink {
            &node.s
        }
        fn link_mut(node: &mut Node) -> &mut SingleLink {
            &mut node.s
        }
    }
}
