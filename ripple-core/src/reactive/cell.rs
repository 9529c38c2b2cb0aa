//! Ref Implementation
//!
//! A [`Ref`] is the fundamental reactive primitive. It holds one value and
//! is a dependency in the graph.
//!
//! # How Refs Work
//!
//! 1. When a ref is read while a subscriber is active (an effect or a
//!    computed), the ref links that subscriber.
//!
//! 2. When a ref is written with a value that differs from the current one,
//!    every linked subscriber is notified.
//!
//! 3. Writing the same value again notifies nobody.
//!
//! # Memory Layout
//!
//! Each ref consists of:
//! - A graph node (its subscriber list lives in the arena, not in the ref)
//! - The value, behind a `RefCell` shared by every clone of the handle

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::trace;

use super::runtime::Runtime;
use super::trackable::Trackable;
use crate::graph::{NodeId, NodeKind};

struct RefInner<T> {
    node: NodeId,
    value: RefCell<T>,
}

impl<T> Drop for RefInner<T> {
    fn drop(&mut self) {
        Runtime::dispose(self.node);
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Cloning a `Ref` creates a new handle to the **same** cell.
///
/// # Example
///
/// ```rust
/// use ripple_core::Ref;
///
/// let count = Ref::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Ref<T: Trackable> {
    inner: Rc<RefInner<T>>,
}

impl<T: Trackable> Ref<T> {
    /// Create a new ref with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefInner {
                node: Runtime::insert(NodeKind::Source),
                value: RefCell::new(value.into_reactive()),
            }),
        }
    }

    /// Get the current value.
    ///
    /// If called while a subscriber is running, this also registers the
    /// subscriber as dependent on this ref.
    pub fn get(&self) -> T {
        Runtime::track(self.inner.node);
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read.
    ///
    /// `f` must not write to this same ref.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track(self.inner.node);
        f(&self.inner.value.borrow())
    }

    /// Borrow the current value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers if it changed.
    pub fn set(&self, value: T) {
        let value = value.into_reactive();
        if self.inner.value.borrow().same_value(&value) {
            return;
        }

        // Replace before notifying so subscribers read the new value. The
        // previous value is dropped after the borrow ends.
        let previous = self.inner.value.replace(value);
        drop(previous);

        trace!(node = ?self.inner.node, "ref changed");
        Runtime::trigger(&[self.inner.node]);
    }

    /// Update the value using a function of the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of subscribers currently linked to this ref.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with(|rt| rt.graph.borrow().subscribers(self.inner.node).len())
    }
}

impl<T: Trackable> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Refs compare by identity, like object references.
impl<T: Trackable> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Debug for Ref<T>
where
    T: Trackable + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("node", &self.inner.node)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect;
    use std::cell::Cell;

    #[test]
    fn ref_get_and_set() {
        let cell = Ref::new(0);
        assert_eq!(cell.get(), 0);

        cell.set(42);
        assert_eq!(cell.get(), 42);
    }

    #[test]
    fn ref_update() {
        let cell = Ref::new(10);
        cell.update(|v| v + 5);
        assert_eq!(cell.get(), 15);
    }

    #[test]
    fn ref_clone_shares_state() {
        let cell1 = Ref::new(0);
        let cell2 = cell1.clone();

        cell1.set(42);
        assert_eq!(cell2.get(), 42);

        cell2.set(100);
        assert_eq!(cell1.get(), 100);
        assert_eq!(cell1, cell2);
        assert_ne!(cell1, Ref::new(100));
    }

    #[test]
    fn ref_notifies_on_change_only() {
        let cell = Ref::new(1);
        let runs = Rc::new(Cell::new(0));

        let _runner = effect({
            let cell = cell.clone();
            let runs = runs.clone();
            move || {
                cell.get();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 1);

        cell.set(2);
        assert_eq!(runs.get(), 2);

        cell.set(2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn nan_write_is_not_a_change() {
        let cell = Ref::new(f64::NAN);
        let runs = Rc::new(Cell::new(0));

        let _runner = effect({
            let cell = cell.clone();
            let runs = runs.clone();
            move || {
                cell.get();
                runs.set(runs.get() + 1);
            }
        });

        cell.set(f64::NAN);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let cell = Ref::new(1);
        let runs = Rc::new(Cell::new(0));

        let _runner = effect({
            let cell = cell.clone();
            let runs = runs.clone();
            move || {
                cell.get_untracked();
                runs.set(runs.get() + 1);
            }
        });

        assert_eq!(cell.subscriber_count(), 0);
        cell.set(2);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn dropping_a_ref_frees_its_node() {
        let before = crate::graph_stats().nodes;
        let cell = Ref::new(String::from("x"));
        assert_eq!(crate::graph_stats().nodes, before + 1);
        drop(cell);
        assert_eq!(crate::graph_stats().nodes, before);
    }
}
