//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects refs, computeds,
//! effects and proxies. It owns the dependency graph and the scheduler, and
//! it is the only place the graph is reachable from.
//!
//! # How It Works
//!
//! 1. When a ref, computed or effect is created, it allocates a node in the
//!    graph and keeps the [`NodeId`].
//!
//! 2. When a tracked value is read while a subscriber is active, the runtime
//!    links the value's node to the active subscriber.
//!
//! 3. When a tracked value changes, the runtime hands its node to the
//!    scheduler, which marks subscribers dirty, recomputes computeds that are
//!    being observed and runs the affected effects.
//!
//! # Thread Safety
//!
//! The graph is mutated in place and is confined to the thread that created
//! it: every thread gets its own runtime through thread-local storage. Handles
//! are `!Send`, so a value can never be observed from a thread whose runtime
//! does not know about it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::context::ReactiveContext;
use super::subscriber::Notify;
use crate::graph::{Graph, GraphStats, NodeId, NodeKind, Scheduler};
use crate::store::Registry;

/// Per-thread runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on effect notifications drained in one flush. Effects
    /// that keep re-triggering each other are cut off once it is reached.
    pub max_flush_iterations: usize,

    /// Initial capacity of the link arena.
    pub link_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: 10_000,
            link_capacity: 64,
        }
    }
}

/// The reactive runtime for one thread.
pub(crate) struct Runtime {
    pub(crate) graph: RefCell<Graph>,
    pub(crate) scheduler: Scheduler,
    pub(crate) store: Registry,
    /// Effects kept alive by the graph while they still have dependencies,
    /// even if the caller dropped every handle.
    effects: RefCell<HashMap<NodeId, Rc<dyn Notify>>>,
    config: Cell<RuntimeConfig>,
}

thread_local! {
    static RUNTIME: Runtime = Runtime::new(RuntimeConfig::default());
}

impl Runtime {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            graph: RefCell::new(Graph::with_capacity(config.link_capacity)),
            scheduler: Scheduler::default(),
            store: Registry::default(),
            effects: RefCell::new(HashMap::new()),
            config: Cell::new(config),
        }
    }

    /// Run `f` with this thread's runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Like [`Runtime::with`], but returns `None` once the thread-local has
    /// been torn down. Used from `Drop` impls.
    pub(crate) fn try_with<R>(f: impl FnOnce(&Runtime) -> R) -> Option<R> {
        RUNTIME.try_with(f).ok()
    }

    pub(crate) fn config(&self) -> RuntimeConfig {
        self.config.get()
    }

    /// Allocate a graph node.
    pub(crate) fn insert(kind: NodeKind) -> NodeId {
        Self::with(|rt| rt.graph.borrow_mut().insert(kind))
    }

    /// Release a node whose owning handle was dropped.
    pub(crate) fn dispose(node: NodeId) {
        Self::try_with(|rt| rt.graph.borrow_mut().dispose(node));
    }

    /// Link `dep` to the active subscriber, if there is one.
    pub(crate) fn track(dep: NodeId) {
        if let Some(sub) = ReactiveContext::current_subscriber() {
            Self::with(|rt| rt.graph.borrow_mut().link(dep, sub));
        }
    }

    /// Notify the subscribers of every node in `deps` in a single pass.
    pub(crate) fn trigger(deps: &[NodeId]) {
        if deps.is_empty() {
            return;
        }
        Self::with(|rt| rt.scheduler.propagate(rt, deps));
    }

    /// `(dirty, tracking)` flags of a node.
    pub(crate) fn flags(node: NodeId) -> (bool, bool) {
        Self::with(|rt| {
            rt.graph
                .borrow()
                .node(node)
                .map_or((false, false), |n| (n.dirty, n.tracking))
        })
    }

    pub(crate) fn clear_dirty(node: NodeId) {
        Self::with(|rt| {
            if let Some(node) = rt.graph.borrow_mut().node_mut(node) {
                node.dirty = false;
            }
        });
    }

    pub(crate) fn has_dependencies(node: NodeId) -> bool {
        Self::with(|rt| rt.graph.borrow().node(node).is_some_and(|n| n.deps.is_some()))
    }

    /// Keep `effect` alive while it has dependencies; let it go otherwise.
    pub(crate) fn retain_effect(node: NodeId, effect: Rc<dyn Notify>) {
        let subscribed = Self::has_dependencies(node);
        let released = Self::with(|rt| {
            let mut effects = rt.effects.borrow_mut();
            if subscribed {
                effects.insert(node, effect);
                None
            } else {
                effects.remove(&node)
            }
        });
        drop(released);
    }

    pub(crate) fn release_effect(node: NodeId) {
        let released = Self::try_with(|rt| rt.effects.borrow_mut().remove(&node)).flatten();
        drop(released);
    }
}

/// Replace this thread's runtime configuration.
pub fn configure(config: RuntimeConfig) {
    Runtime::with(|rt| {
        let previous = rt.config.replace(config);
        if config.link_capacity > previous.link_capacity {
            rt.graph
                .borrow_mut()
                .reserve_links(config.link_capacity - previous.link_capacity);
        }
        debug!(?config, "runtime configured");
    });
}

/// This thread's runtime configuration.
pub fn config() -> RuntimeConfig {
    Runtime::with(|rt| rt.config())
}

/// Current occupancy of this thread's dependency graph.
pub fn graph_stats() -> GraphStats {
    Runtime::with(|rt| rt.graph.borrow().stats())
}

/// Number of effects waiting in the scheduler queue.
pub fn pending_effects() -> usize {
    Runtime::with(|rt| rt.scheduler.pending())
}

/// Run `f` without an active subscriber: nothing it reads is tracked.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter(None);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_flush_iterations, 10_000);
        assert_eq!(config.link_capacity, 64);
    }

    #[test]
    fn config_loads_from_json_with_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{ "max_flush_iterations": 50 }"#).unwrap();
        assert_eq!(config.max_flush_iterations, 50);
        assert_eq!(config.link_capacity, 64);
    }

    #[test]
    fn configure_is_per_thread() {
        configure(RuntimeConfig {
            max_flush_iterations: 7,
            link_capacity: 128,
        });
        assert_eq!(config().max_flush_iterations, 7);

        let other = std::thread::spawn(config).join().unwrap();
        assert_eq!(other, RuntimeConfig::default());
    }

    #[test]
    fn track_without_subscriber_is_a_no_op() {
        let dep = Runtime::insert(NodeKind::Source);
        let before = graph_stats();
        Runtime::track(dep);
        assert_eq!(graph_stats().live_links, before.live_links);
    }

    #[test]
    fn untracked_hides_the_active_subscriber() {
        let sub = Runtime::insert(NodeKind::Source);
        let _ctx = ReactiveContext::enter(Some(sub));
        assert_eq!(ReactiveContext::current_subscriber(), Some(sub));
        untracked(|| assert_eq!(ReactiveContext::current_subscriber(), None));
        assert_eq!(ReactiveContext::current_subscriber(), Some(sub));
    }
}
