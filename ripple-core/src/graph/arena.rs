//! Link Arena
//!
//! [`Graph`] owns every node and every link. It implements the list surgery
//! behind dependency tracking:
//!
//! 1. `start_track` clears a subscriber's `deps_tail`, so all of its existing
//!    links look stale.
//!
//! 2. Each read calls `link`, which re-confirms the link under the cursor if
//!    it already points at the same dependency, and otherwise splices in a
//!    pooled or fresh link.
//!
//! 3. `end_track` reclaims everything after the last confirmed link. Those
//!    are the dependencies the run no longer read.

use smallvec::SmallVec;
use tracing::trace;

use super::node::{Link, LinkId, Node, NodeId, NodeKind};

/// Snapshot of arena occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Live nodes, including disposed nodes still referenced by links.
    pub nodes: usize,
    /// Links currently connecting a dependency to a subscriber.
    pub live_links: usize,
    /// Links parked in the pool, waiting to be reused.
    pub pooled_links: usize,
}

/// Arena of nodes and links.
#[derive(Debug, Default)]
pub(crate) struct Graph {
    nodes: Vec<Option<Node>>,
    free_nodes: Vec<NodeId>,
    links: Vec<Link>,
    /// Head of the free list threaded through `Link::next_dep`.
    link_pool: Option<LinkId>,
    pooled: usize,
}

impl Graph {
    pub(crate) fn with_capacity(links: usize) -> Self {
        Self {
            links: Vec::with_capacity(links),
            ..Self::default()
        }
    }

    pub(crate) fn reserve_links(&mut self, additional: usize) {
        self.links.reserve(additional);
    }

    /// Add a node and return its id.
    pub(crate) fn insert(&mut self, kind: NodeKind) -> NodeId {
        let node = Node::new(kind);
        match self.free_nodes.pop() {
            Some(id) => {
                debug_assert!(self.nodes[id.index()].is_none(), "free slot {id:?} is occupied");
                self.nodes[id.index()] = Some(node);
                id
            }
            None => {
                let id = NodeId::from_index(self.nodes.len());
                self.nodes.push(Some(node));
                id
            }
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn link_at(&self, id: LinkId) -> &Link {
        &self.links[id.index()]
    }

    fn link_at_mut(&mut self, id: LinkId) -> &mut Link {
        &mut self.links[id.index()]
    }

    /// Record that `sub` read `dep` during its current run.
    pub(crate) fn link(&mut self, dep: NodeId, sub: NodeId) {
        if dep == sub {
            return;
        }
        let Some(node) = self.node(sub) else {
            debug_assert!(false, "link to a missing subscriber {sub:?}");
            return;
        };
        let tail = node.deps_tail;
        let head = node.deps;

        // Reading the same dependency twice in a row needs no second edge.
        if let Some(tail) = tail {
            if self.link_at(tail).dep == Some(dep) {
                return;
            }
        }

        let cursor = match tail {
            Some(tail) => self.link_at(tail).next_dep,
            None => head,
        };

        if let Some(cursor) = cursor {
            if self.link_at(cursor).dep == Some(dep) {
                trace!(?dep, ?sub, link = cursor.index(), "link reused");
                if let Some(node) = self.node_mut(sub) {
                    node.deps_tail = Some(cursor);
                }
                return;
            }
        }

        let id = self.allocate_link(dep, sub, cursor);

        let dep_tail = self.node(dep).and_then(|node| node.subs_tail);
        match dep_tail {
            Some(dep_tail) => {
                self.link_at_mut(dep_tail).next_sub = Some(id);
                self.link_at_mut(id).prev_sub = Some(dep_tail);
            }
            None => {
                if let Some(node) = self.node_mut(dep) {
                    node.subs = Some(id);
                }
            }
        }
        if let Some(node) = self.node_mut(dep) {
            node.subs_tail = Some(id);
        }

        match tail {
            Some(tail) => self.link_at_mut(tail).next_dep = Some(id),
            None => {
                if let Some(node) = self.node_mut(sub) {
                    node.deps = Some(id);
                }
            }
        }
        if let Some(node) = self.node_mut(sub) {
            node.deps_tail = Some(id);
        }

        trace!(?dep, ?sub, link = id.index(), "link created");
    }

    fn allocate_link(&mut self, dep: NodeId, sub: NodeId, next_dep: Option<LinkId>) -> LinkId {
        let fresh = Link {
            dep: Some(dep),
            sub: Some(sub),
            prev_sub: None,
            next_sub: None,
            next_dep,
        };

        match self.link_pool {
            Some(id) => {
                debug_assert!(self.link_at(id).is_pooled(), "pool head {id:?} is still linked");
                self.link_pool = self.link_at(id).next_dep;
                self.pooled -= 1;
                *self.link_at_mut(id) = fresh;
                id
            }
            None => {
                let id = LinkId::from_index(self.links.len());
                self.links.push(fresh);
                id
            }
        }
    }

    pub(crate) fn start_track(&mut self, sub: NodeId) {
        if let Some(node) = self.node_mut(sub) {
            node.tracking = true;
            node.deps_tail = None;
        }
    }

    pub(crate) fn end_track(&mut self, sub: NodeId) {
        let Some(node) = self.node_mut(sub) else {
            return;
        };
        node.tracking = false;
        node.dirty = false;
        let tail = node.deps_tail;

        match tail {
            Some(tail) => {
                if let Some(stale) = self.link_at(tail).next_dep {
                    self.link_at_mut(tail).next_dep = None;
                    self.clear_tracking(stale);
                }
            }
            None => {
                // Nothing was read this run: every previous link is stale.
                let head = self.node_mut(sub).and_then(|node| node.deps.take());
                if let Some(head) = head {
                    self.clear_tracking(head);
                }
            }
        }
    }

    /// Unlink `start` and every link after it in its dependency list, and
    /// return them to the pool.
    fn clear_tracking(&mut self, start: LinkId) {
        let mut cursor = Some(start);

        while let Some(id) = cursor {
            let link = *self.link_at(id);
            debug_assert!(!link.is_pooled(), "link {id:?} reclaimed twice");

            if let Some(dep) = link.dep {
                match link.prev_sub {
                    Some(prev) => self.link_at_mut(prev).next_sub = link.next_sub,
                    None => {
                        if let Some(node) = self.node_mut(dep) {
                            node.subs = link.next_sub;
                        }
                    }
                }
                match link.next_sub {
                    Some(next) => self.link_at_mut(next).prev_sub = link.prev_sub,
                    None => {
                        if let Some(node) = self.node_mut(dep) {
                            node.subs_tail = link.prev_sub;
                        }
                    }
                }
                self.release_if_orphaned(dep);
            }

            *self.link_at_mut(id) = Link {
                next_dep: self.link_pool,
                ..Link::default()
            };
            self.link_pool = Some(id);
            self.pooled += 1;
            trace!(link = id.index(), "link reclaimed");

            cursor = link.next_dep;
        }
    }

    /// Drop every dependency link of `sub` without disposing it.
    pub(crate) fn detach_dependencies(&mut self, sub: NodeId) {
        let Some(node) = self.node_mut(sub) else {
            return;
        };
        node.deps_tail = None;
        node.dirty = false;
        if let Some(head) = node.deps.take() {
            self.clear_tracking(head);
        }
    }

    /// Called when the handle owning `id` is dropped.
    ///
    /// The node stops being a subscriber immediately. Its slot is freed once
    /// no subscriber links to it any more.
    pub(crate) fn dispose(&mut self, id: NodeId) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        node.kind = NodeKind::Source;
        node.disposed = true;
        node.tracking = false;
        self.detach_dependencies(id);
        self.release_if_orphaned(id);
    }

    fn release_if_orphaned(&mut self, id: NodeId) {
        let orphaned = self
            .node(id)
            .is_some_and(|node| node.disposed && node.subs.is_none() && node.deps.is_none());
        if orphaned {
            self.nodes[id.index()] = None;
            self.free_nodes.push(id);
        }
    }

    /// Subscribers of `dep` in subscription order.
    pub(crate) fn subscribers(&self, dep: NodeId) -> SmallVec<[NodeId; 8]> {
        let mut subs = SmallVec::new();
        let mut cursor = self.node(dep).and_then(|node| node.subs);
        while let Some(id) = cursor {
            let link = self.link_at(id);
            if let Some(sub) = link.sub {
                subs.push(sub);
            }
            cursor = link.next_sub;
        }
        subs
    }

    /// Dependencies of `sub` in the order they were last read.
    pub(crate) fn dependencies(&self, sub: NodeId) -> SmallVec<[NodeId; 8]> {
        let mut deps = SmallVec::new();
        let mut cursor = self.node(sub).and_then(|node| node.deps);
        while let Some(id) = cursor {
            let link = self.link_at(id);
            if let Some(dep) = link.dep {
                deps.push(dep);
            }
            cursor = link.next_dep;
        }
        deps
    }

    pub(crate) fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.nodes.iter().filter(|slot| slot.is_some()).count(),
            live_links: self.links.len() - self.pooled,
            pooled_links: self.pooled,
        }
    }
}
