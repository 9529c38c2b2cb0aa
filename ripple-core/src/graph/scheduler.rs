//! Update Scheduler
//!
//! The scheduler walks subscriber lists when a dependency changes and
//! decides what runs, and when.
//!
//! # Algorithm
//!
//! 1. For every subscriber of the changed dependency, skip it if it is
//!    currently tracking (a re-entrant write from its own body) or already
//!    dirty (already reached in this pass, e.g. through a diamond).
//!
//! 2. Mark it dirty. A computed with subscribers of its own recomputes
//!    immediately and, only if its value actually changed, its subscriber
//!    list is walked the same way. A computed nobody reads stays dirty and
//!    recomputes on its next read.
//!
//! 3. An effect is queued. The queue is drained after the outermost walk
//!    returns, breadth-first, so no effect runs while a list is being
//!    iterated and every effect sees every computed already settled.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{error, trace};

use super::node::{NodeId, NodeKind};
use crate::reactive::{Notify, Recompute, Runtime};

/// What the walk decided for one subscriber, resolved after the graph
/// borrow is released.
enum Visit {
    Recompute(Rc<dyn Recompute>),
    Enqueue,
}

/// Propagation state for one thread.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    queue: RefCell<VecDeque<NodeId>>,
    /// Nesting level of `propagate` calls.
    depth: Cell<usize>,
    /// True while the queue is being drained.
    flushing: Cell<bool>,
}

/// Restores a counter or flag when a walk or flush unwinds.
struct Restore<'a, T: Copy> {
    cell: &'a Cell<T>,
    value: T,
}

impl<T: Copy> Drop for Restore<'_, T> {
    fn drop(&mut self) {
        self.cell.set(self.value);
    }
}

impl Scheduler {
    /// Notify every subscriber of `deps`, then run queued effects unless an
    /// outer walk or flush will.
    pub(crate) fn propagate(&self, rt: &Runtime, deps: &[NodeId]) {
        {
            let depth = self.depth.get();
            let _restore = Restore { cell: &self.depth, value: depth };
            self.depth.set(depth + 1);
            for &dep in deps {
                self.walk(rt, dep);
            }
        }

        if self.depth.get() == 0 && !self.flushing.get() {
            self.flush(rt);
        }
    }

    fn walk(&self, rt: &Runtime, dep: NodeId) {
        let subs = rt.graph.borrow().subscribers(dep);
        trace!(?dep, subscribers = subs.len(), "propagate");

        for sub in subs {
            let visit = {
                let mut graph = rt.graph.borrow_mut();
                let Some(node) = graph.node_mut(sub) else {
                    continue;
                };
                if node.tracking || node.dirty {
                    continue;
                }
                node.dirty = true;

                match &node.kind {
                    NodeKind::Computed(computed) if node.has_subscribers() => {
                        computed.upgrade().map(Visit::Recompute)
                    }
                    // Lazy: recomputed on its next read.
                    NodeKind::Computed(_) => None,
                    NodeKind::Effect(_) => Some(Visit::Enqueue),
                    NodeKind::Source => {
                        debug_assert!(false, "source node {sub:?} linked as a subscriber");
                        None
                    }
                }
            };

            match visit {
                Some(Visit::Recompute(computed)) => {
                    if computed.update() {
                        self.walk(rt, sub);
                    }
                }
                Some(Visit::Enqueue) => self.queue.borrow_mut().push_back(sub),
                None => {}
            }
        }
    }

    fn flush(&self, rt: &Runtime) {
        let _restore = Restore { cell: &self.flushing, value: false };
        self.flushing.set(true);

        let limit = rt.config().max_flush_iterations;
        let mut drained = 0usize;

        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(id) = next else {
                break;
            };

            drained += 1;
            if drained > limit {
                error!(
                    limit,
                    pending = self.queue.borrow().len() + 1,
                    "effect flush exceeded its iteration limit; discarding queued effects"
                );
                self.abandon(rt, id);
                break;
            }

            let effect = effect_handle(rt, id);
            if let Some(effect) = effect {
                effect.notify();
            }
        }
    }

    /// Drop `first` and everything still queued, clearing their dirty flags
    /// so later writes can reach them again.
    fn abandon(&self, rt: &Runtime, first: NodeId) {
        let rest: Vec<NodeId> = self.queue.borrow_mut().drain(..).collect();
        let mut graph = rt.graph.borrow_mut();
        for id in std::iter::once(first).chain(rest) {
            if let Some(node) = graph.node_mut(id) {
                node.dirty = false;
            }
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

/// A queued effect that is no longer dirty already ran (or its slot was
/// reused) and is skipped.
fn effect_handle(rt: &Runtime, id: NodeId) -> Option<Rc<dyn Notify>> {
    let graph = rt.graph.borrow();
    let node = graph.node(id)?;
    match &node.kind {
        NodeKind::Effect(effect) if node.dirty => effect.upgrade(),
        _ => None,
    }
}
