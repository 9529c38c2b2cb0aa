//! Graph Nodes
//!
//! This module defines the records stored in the graph arena: nodes (which
//! play the dependency role, the subscriber role, or both) and the links
//! between them.

use std::fmt;
use std::rc::Weak;

use crate::reactive::{Notify, Recompute};

/// Index of a node in the graph arena.
///
/// Slots are recycled once a node is disposed and no link refers to it any
/// more, so an id is only meaningful while its owner is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the raw slot index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Index of a link in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u32);

impl LinkId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the raw slot index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// What a node does when propagation reaches it.
///
/// Dispatch in the scheduler matches on this tag instead of probing the
/// subscriber for capabilities, so every kind is handled explicitly.
pub(crate) enum NodeKind {
    /// A plain dependency (ref cell, proxy key). Never a subscriber.
    Source,

    /// A derived value: a dependency for its readers and a subscriber of
    /// whatever its getter reads.
    Computed(Weak<dyn Recompute>),

    /// A side-effecting subscriber. Leaves of the graph.
    Effect(Weak<dyn Notify>),
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Source => f.write_str("Source"),
            NodeKind::Computed(_) => f.write_str("Computed"),
            NodeKind::Effect(_) => f.write_str("Effect"),
        }
    }
}

/// A node in the dependency graph.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,

    /// Head of the subscriber list (links whose `dep` is this node).
    pub(crate) subs: Option<LinkId>,
    /// Tail of the subscriber list, for O(1) append.
    pub(crate) subs_tail: Option<LinkId>,

    /// Head of the dependency list (links whose `sub` is this node).
    pub(crate) deps: Option<LinkId>,
    /// Last dependency confirmed during the current run. `None` right after
    /// `start_track`, which makes every existing link provisionally stale.
    pub(crate) deps_tail: Option<LinkId>,

    /// True while the subscriber is executing and re-establishing its links.
    pub(crate) tracking: bool,
    /// True once notified and until the next run completes.
    pub(crate) dirty: bool,

    /// The owning handle was dropped; the slot is kept only until every
    /// subscriber has let go of it.
    pub(crate) disposed: bool,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        // Computeds start dirty so the first read evaluates the getter.
        let dirty = matches!(kind, NodeKind::Computed(_));
        Self {
            kind,
            subs: None,
            subs_tail: None,
            deps: None,
            deps_tail: None,
            tracking: false,
            dirty,
            disposed: false,
        }
    }

    pub(crate) fn has_subscribers(&self) -> bool {
        self.subs.is_some()
    }
}

/// An edge from one dependency to one subscriber.
///
/// A pooled link has `dep` and `sub` cleared and reuses `next_dep` as the
/// free-list pointer.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Link {
    pub(crate) dep: Option<NodeId>,
    pub(crate) sub: Option<NodeId>,
    pub(crate) prev_sub: Option<LinkId>,
    pub(crate) next_sub: Option<LinkId>,
    pub(crate) next_dep: Option<LinkId>,
}

impl Link {
    pub(crate) fn is_pooled(&self) -> bool {
        self.dep.is_none() && self.sub.is_none()
    }
}
