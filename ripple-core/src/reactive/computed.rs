//! Computed Implementation
//!
//! A [`Computed`] is a cached derived value. It is a subscriber of whatever
//! its getter reads and a dependency for whoever reads it.
//!
//! # How Computeds Work
//!
//! 1. The getter does not run until the value is first read.
//!
//! 2. When read again and nothing it depends on has changed, the cached
//!    value is returned without running the getter.
//!
//! 3. When a dependency changes, the computed is marked dirty. If nobody is
//!    subscribed to it, that is all: it recomputes on its next read. If it
//!    has subscribers, the scheduler recomputes it right away and only
//!    notifies them when the new value differs from the old one.
//!
//! # Why This Matters
//!
//! - A ref changes
//! - 10 computeds depend on it
//! - Only the computeds that are read (or observed) recompute
//! - A computed whose output did not change stops the cascade there

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use super::context::TrackScope;
use super::runtime::Runtime;
use super::subscriber::Recompute;
use super::trackable::Trackable;
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, NodeKind};

type Getter<T> = Box<dyn Fn() -> T>;
type Setter<T> = Box<dyn Fn(T)>;

struct ComputedInner<T> {
    node: NodeId,
    getter: Getter<T>,
    setter: Option<Setter<T>>,
    /// The cached value (None until the first successful evaluation).
    value: RefCell<Option<T>>,
}

impl<T: Trackable> Recompute for ComputedInner<T> {
    fn update(&self) -> bool {
        let _scope = TrackScope::begin(self.node);
        let guard = InvalidateOnUnwind { value: &self.value };

        let next = (self.getter)();
        std::mem::forget(guard);

        let mut slot = self.value.borrow_mut();
        let changed = slot.as_ref().map_or(true, |previous| !previous.same_value(&next));
        let previous = slot.replace(next);
        drop(slot);
        drop(previous);

        debug!(node = ?self.node, changed, "computed updated");
        changed
    }
}

/// Drops the cached value if the getter unwinds, so the next read or write
/// recomputes instead of serving a value from before the failure.
struct InvalidateOnUnwind<'a, T> {
    value: &'a RefCell<Option<T>>,
}

impl<T> Drop for InvalidateOnUnwind<'_, T> {
    fn drop(&mut self) {
        let stale = self.value.borrow_mut().take();
        drop(stale);
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::dispose(self.node);
    }
}

/// A lazily evaluated, memoized value derived from other reactive values.
///
/// Cloning a `Computed` creates a new handle to the **same** cached value.
///
/// # Example
///
/// ```rust
/// use ripple_core::{computed, Ref};
///
/// let count = Ref::new(2);
/// let doubled = computed({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: Trackable> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Trackable> Computed<T> {
    /// Create a read-only computed from a getter.
    ///
    /// The getter is not run until the first read.
    pub fn new(getter: impl Fn() -> T + 'static) -> Self {
        Self::build(Box::new(getter), None)
    }

    /// Create a writable computed. Writes are forwarded to `setter`, which
    /// is expected to update the values the getter reads.
    pub fn with_setter(getter: impl Fn() -> T + 'static, setter: impl Fn(T) + 'static) -> Self {
        Self::build(Box::new(getter), Some(Box::new(setter)))
    }

    fn build(getter: Getter<T>, setter: Option<Setter<T>>) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let handle: Weak<dyn Recompute> = weak.clone();
            ComputedInner {
                node: Runtime::insert(NodeKind::Computed(handle)),
                getter,
                setter,
                value: RefCell::new(None),
            }
        });
        Self { inner }
    }

    /// Get the current value, recomputing first if a dependency changed.
    ///
    /// If called while a subscriber is running, that subscriber becomes
    /// dependent on this computed.
    ///
    /// # Panics
    ///
    /// Panics if the getter reads this same computed before its first
    /// evaluation finished, since there is no value to return yet. Use
    /// [`Computed::try_get`] where that can happen.
    pub fn get(&self) -> T {
        match self.try_get() {
            Some(value) => value,
            None => panic!("computed read itself before its first evaluation finished"),
        }
    }

    /// Like [`Computed::get`], but returns `None` instead of panicking when
    /// the getter reads this computed before producing a first value.
    pub fn try_get(&self) -> Option<T> {
        let (dirty, tracking) = Runtime::flags(self.inner.node);
        // A computed reading itself gets its previous value, if any.
        if (dirty || !self.has_value()) && !tracking {
            self.inner.update();
        }

        Runtime::track(self.inner.node);
        self.inner.value.borrow().clone()
    }

    /// Write through the setter.
    ///
    /// A computed without a setter is read-only: the write is ignored and a
    /// warning is logged.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            warn!(node = ?self.inner.node, %err, "write to computed ignored");
        }
    }

    /// Write through the setter, reporting read-only computeds as an error.
    pub fn try_set(&self, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(ReactiveError::ReadOnlyComputed),
        }
    }

    /// Whether a setter was supplied.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Whether the cached value is stale.
    pub fn is_dirty(&self) -> bool {
        Runtime::flags(self.inner.node).0
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Whether two handles refer to the same computed.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Create a read-only computed from a getter.
pub fn computed<T: Trackable>(getter: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(getter)
}

/// Create a writable computed from a getter and a setter.
pub fn computed_with<T: Trackable>(
    getter: impl Fn() -> T + 'static,
    setter: impl Fn(T) + 'static,
) -> Computed<T> {
    Computed::with_setter(getter, setter)
}

impl<T: Trackable> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Computeds compare by identity.
impl<T: Trackable> PartialEq for Computed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Debug for Computed<T>
where
    T: Trackable + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("node", &self.inner.node)
            .field("dirty", &self.is_dirty())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
