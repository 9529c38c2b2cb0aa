//! Per-target bookkeeping for proxies.
//!
//! Two maps keyed by the address of a raw target:
//!
//! - `deps`: one graph node per observed key, created on first tracked read
//! - `proxies`: the live proxy for the target, so wrapping twice returns the
//!   same proxy
//!
//! A proxy removes its own entry when dropped. A target removes both of its
//! entries, and disposes its key nodes, when it is dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Weak;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::proxy::ProxyInner;
use super::value::DepKey;
use crate::graph::{NodeId, NodeKind};
use crate::reactive::{ReactiveContext, Runtime};

#[derive(Default)]
pub(crate) struct Registry {
    deps: RefCell<HashMap<usize, IndexMap<DepKey, NodeId>>>,
    proxies: RefCell<HashMap<usize, Weak<ProxyInner>>>,
}

impl Registry {
    /// Link `(target, key)` to the active subscriber, creating the key's node
    /// on first use.
    pub(crate) fn track(target: usize, key: DepKey) {
        if !ReactiveContext::is_active() {
            return;
        }
        let node = Runtime::with(|rt| {
            let existing = rt
                .store
                .deps
                .borrow()
                .get(&target)
                .and_then(|keys| keys.get(&key).copied());
            match existing {
                Some(node) => node,
                None => {
                    let node = rt.graph.borrow_mut().insert(NodeKind::Source);
                    rt.store
                        .deps
                        .borrow_mut()
                        .entry(target)
                        .or_default()
                        .insert(key, node);
                    node
                }
            }
        });
        Runtime::track(node);
    }

    /// Notify every key of `target` selected by `filter`, in one pass.
    pub(crate) fn trigger(target: usize, filter: impl Fn(&DepKey) -> bool) {
        let nodes: SmallVec<[NodeId; 8]> = Runtime::with(|rt| {
            rt.store.deps.borrow().get(&target).map_or_else(SmallVec::new, |keys| {
                keys.iter()
                    .filter(|(key, _)| filter(key))
                    .map(|(_, node)| *node)
                    .collect()
            })
        });
        Runtime::trigger(&nodes);
    }

    pub(crate) fn proxy(&self, target: usize) -> Option<Weak<ProxyInner>> {
        self.proxies.borrow().get(&target).cloned()
    }

    pub(crate) fn register_proxy(&self, target: usize, proxy: Weak<ProxyInner>) {
        self.proxies.borrow_mut().insert(target, proxy);
    }

    /// Drop the proxy entry for `target` once its proxy is gone.
    pub(crate) fn release_proxy(&self, target: usize) {
        let mut proxies = self.proxies.borrow_mut();
        if proxies.get(&target).is_some_and(|proxy| proxy.strong_count() == 0) {
            proxies.remove(&target);
        }
    }

    /// Called when a raw target is dropped.
    pub(crate) fn forget(&self, target: usize) {
        self.proxies.borrow_mut().remove(&target);
        let keys = self.deps.borrow_mut().remove(&target);
        if let Some(keys) = keys {
            for node in keys.into_values() {
                Runtime::dispose(node);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_targets(&self) -> usize {
        self.deps.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect;
    use crate::store::{reactive, Value};

    #[test]
    fn keys_get_nodes_only_when_read_under_a_subscriber() {
        let state = reactive(Value::map([("a", 1), ("b", 2)]));
        let proxy = state.as_reactive().unwrap().clone();
        let target = proxy.raw().addr();

        proxy.get("a");
        let tracked = Runtime::with(|rt| rt.store.deps.borrow().get(&target).map(IndexMap::len));
        assert_eq!(tracked, None);

        let _runner = effect({
            let proxy = proxy.clone();
            move || {
                proxy.get("a");
            }
        });
        let tracked = Runtime::with(|rt| rt.store.deps.borrow().get(&target).map(IndexMap::len));
        assert_eq!(tracked, Some(1));
    }

    #[test]
    fn dropping_the_target_forgets_it() {
        let before = Runtime::with(|rt| rt.store.tracked_targets());
        {
            let state = reactive(Value::array([1, 2, 3]));
            let proxy = state.as_reactive().unwrap().clone();
            let runner = effect(move || {
                proxy.len();
            });
            runner.stop();
            assert_eq!(Runtime::with(|rt| rt.store.tracked_targets()), before + 1);
        }
        assert_eq!(Runtime::with(|rt| rt.store.tracked_targets()), before);
    }
}
