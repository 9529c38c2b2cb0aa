//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently running. This
//! enables automatic dependency tracking: when a ref is read, the runtime
//! links it to whatever subscriber sits on top of the stack.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running an effect or recomputing a computed
//! pushes its node; the guard pops it again when dropped. Because the guard
//! is dropped during unwinding too, a panicking user function can never leave
//! a stale subscriber installed.
//!
//! This design supports nested contexts (a computed reading another computed
//! reading a ref), and `None` entries for untracked sections.

use std::cell::RefCell;

use super::runtime::Runtime;
use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<NodeId>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber: Option<NodeId>,
}

impl ReactiveContext {
    /// Install `subscriber` as the active subscriber until the guard drops.
    ///
    /// `None` suspends tracking for the guard's lifetime.
    pub(crate) fn enter(subscriber: Option<NodeId>) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(subscriber));
        Self { subscriber }
    }

    /// Check if a subscriber is active.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// The node of the active subscriber, if any.
    pub(crate) fn current_subscriber() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().copied().flatten())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            debug_assert_eq!(
                popped,
                Some(self.subscriber),
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber,
                popped
            );
        });
    }
}

/// Brackets one run of a subscriber: `start_track` and context entry on
/// creation, `end_track` and context exit on drop.
///
/// `end_track` runs on unwind too, so a subscriber whose function panicked is
/// left clean and is reached by the next write like any other.
pub(crate) struct TrackScope {
    node: NodeId,
    _context: ReactiveContext,
}

impl TrackScope {
    pub(crate) fn begin(node: NodeId) -> Self {
        Runtime::with(|rt| rt.graph.borrow_mut().start_track(node));
        Self {
            node,
            _context: ReactiveContext::enter(Some(node)),
        }
    }
}

impl Drop for TrackScope {
    fn drop(&mut self) {
        Runtime::try_with(|rt| rt.graph.borrow_mut().end_track(self.node));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    #[test]
    fn context_tracks_subscriber() {
        let id = Runtime::insert(NodeKind::Source);

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(Some(id));

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn nested_contexts() {
        let id1 = Runtime::insert(NodeKind::Source);
        let id2 = Runtime::insert(NodeKind::Source);

        {
            let _ctx1 = ReactiveContext::enter(Some(id1));
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(Some(id2));
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));

                {
                    let _paused = ReactiveContext::enter(None);
                    assert!(!ReactiveContext::is_active());
                }
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn track_scope_restores_context_on_panic() {
        let id = Runtime::insert(NodeKind::Source);

        let result = std::panic::catch_unwind(|| {
            let _scope = TrackScope::begin(id);
            panic!("boom");
        });

        assert!(result.is_err());
        assert!(ReactiveContext::current_subscriber().is_none());
        assert_eq!(Runtime::flags(id), (false, false));
    }

    #[test]
    fn track_scope_clears_dirty_on_panic() {
        let id = Runtime::insert(NodeKind::Source);
        Runtime::with(|rt| {
            if let Some(node) = rt.graph.borrow_mut().node_mut(id) {
                node.dirty = true;
            }
        });

        let result = std::panic::catch_unwind(|| {
            let _scope = TrackScope::begin(id);
            panic!("boom");
        });

        assert!(result.is_err());
        assert_eq!(Runtime::flags(id), (false, false));
    }
}
