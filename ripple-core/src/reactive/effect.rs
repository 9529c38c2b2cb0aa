//! Effect Implementation
//!
//! An effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. [`effect`] runs the function immediately to establish the initial
//!    dependencies. [`ReactiveEffect::new`] builds one without running it.
//!
//! 2. When any dependency changes, the scheduler queues the effect and
//!    notifies it once the write has finished propagating.
//!
//! 3. Notifying calls the effect's custom scheduler if it has one, and
//!    re-runs it otherwise. Each run re-tracks from scratch: links that are
//!    read again are reused, links that are not are reclaimed.
//!
//! # Differences from Computed
//!
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results. An effect hands its function's result back
//!   from an explicit [`ReactiveEffect::run`] and keeps nothing.
//!
//! # Lifetime
//!
//! An effect with dependencies is kept alive by the runtime even after the
//! runner is dropped, the way a subscription stays registered until it is
//! cancelled. [`ReactiveEffect::stop`] detaches it for good.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use super::context::TrackScope;
use super::runtime::{untracked, Runtime};
use super::subscriber::Notify;
use crate::graph::{NodeId, NodeKind};

/// Custom notification handler. Receives the effect and decides when (or
/// whether) to call [`ReactiveEffect::run`].
pub type EffectScheduler<R = ()> = Rc<dyn Fn(&ReactiveEffect<R>)>;

struct EffectInner<R> {
    node: NodeId,
    func: Box<dyn Fn() -> R>,
    scheduler: RefCell<Option<EffectScheduler<R>>>,
    stopped: Cell<bool>,
    runs: Cell<usize>,
}

impl<R: 'static> Notify for EffectInner<R> {
    fn notify(self: Rc<Self>) {
        ReactiveEffect { inner: self }.notify();
    }
}

impl<R> Drop for EffectInner<R> {
    fn drop(&mut self) {
        Runtime::dispose(self.node);
    }
}

/// A re-runnable unit of work that tracks what it reads.
///
/// `R` is what the function returns; [`ReactiveEffect::run`] hands it back.
/// Cloning a `ReactiveEffect` creates a new handle to the same effect.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::{ReactiveEffect, Ref};
///
/// let count = Ref::new(0);
/// let seen = Rc::new(Cell::new(0));
///
/// let effect = ReactiveEffect::new({
///     let count = count.clone();
///     let seen = seen.clone();
///     move || seen.set(count.get())
/// });
///
/// effect.run();
/// count.set(3);
/// assert_eq!(seen.get(), 3);
/// ```
pub struct ReactiveEffect<R = ()> {
    inner: Rc<EffectInner<R>>,
}

impl<R: 'static> ReactiveEffect<R> {
    /// Create an effect without running it.
    pub fn new(func: impl Fn() -> R + 'static) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<EffectInner<R>>| {
            let handle: Weak<dyn Notify> = weak.clone();
            EffectInner {
                node: Runtime::insert(NodeKind::Effect(handle)),
                func: Box::new(func),
                scheduler: RefCell::new(None),
                stopped: Cell::new(false),
                runs: Cell::new(0),
            }
        });
        Self { inner }
    }

    /// Run the function, re-tracking its dependencies, and return its result.
    ///
    /// A stopped effect still runs its function, but without tracking. So
    /// does an effect that calls `run` from inside its own run.
    pub fn run(&self) -> R {
        let inner = &self.inner;

        if inner.stopped.get() {
            warn!(node = ?inner.node, "running a stopped effect without tracking");
            return untracked(|| (inner.func)());
        }

        if Runtime::flags(inner.node).1 {
            warn!(node = ?inner.node, "effect re-entered its own run; running untracked");
            return untracked(|| (inner.func)());
        }

        let result = {
            let _scope = TrackScope::begin(inner.node);
            (inner.func)()
        };

        inner.runs.set(inner.runs.get() + 1);
        debug!(node = ?inner.node, runs = inner.runs.get(), "effect ran");

        if inner.stopped.get() {
            // Stopped from inside its own run: drop whatever the run linked.
            self.detach();
        } else {
            Runtime::retain_effect(inner.node, Rc::clone(&self.inner) as Rc<dyn Notify>);
        }
        result
    }

    /// React to a dependency change: call the scheduler if one is set,
    /// otherwise re-run and discard the result.
    pub fn notify(&self) {
        if self.inner.stopped.get() {
            return;
        }

        let scheduler = self.inner.scheduler.borrow().clone();
        match scheduler {
            Some(scheduler) => {
                // The scheduler may defer the run; later writes must still
                // reach this effect.
                Runtime::clear_dirty(self.inner.node);
                scheduler(self);
            }
            None => {
                self.run();
            }
        }
    }

    /// Install (or remove) the custom scheduler.
    pub fn set_scheduler(&self, scheduler: Option<EffectScheduler<R>>) {
        *self.inner.scheduler.borrow_mut() = scheduler;
    }

    /// Detach the effect from all of its dependencies. It will not be
    /// notified again.
    pub fn stop(&self) {
        if self.inner.stopped.replace(true) {
            return;
        }
        debug!(node = ?self.inner.node, "effect stopped");
        self.detach();
    }

    fn detach(&self) {
        Runtime::with(|rt| rt.graph.borrow_mut().detach_dependencies(self.inner.node));
        Runtime::release_effect(self.inner.node);
    }
}

impl<R> ReactiveEffect<R> {
    /// Check if the effect has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    /// Get the number of times the effect has run under tracking.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Get the number of dependencies linked by the last run.
    pub fn dependency_count(&self) -> usize {
        Runtime::with(|rt| rt.graph.borrow().dependencies(self.inner.node).len())
    }

    /// Whether two handles refer to the same effect.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<R> Clone for ReactiveEffect<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for ReactiveEffect<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("node", &self.inner.node)
            .field("run_count", &self.run_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Options for [`effect_with`].
pub struct EffectOptions<R = ()> {
    /// Called instead of re-running when a dependency changes.
    pub scheduler: Option<EffectScheduler<R>>,
}

impl<R> EffectOptions<R> {
    pub fn scheduler(mut self, scheduler: impl Fn(&ReactiveEffect<R>) + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }
}

impl<R> Default for EffectOptions<R> {
    fn default() -> Self {
        Self { scheduler: None }
    }
}

impl<R> Clone for EffectOptions<R> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
        }
    }
}

/// Handle returned by [`effect`]: re-run on demand, or reach the effect.
#[derive(Debug)]
pub struct EffectRunner<R = ()> {
    effect: ReactiveEffect<R>,
}

impl<R: 'static> EffectRunner<R> {
    /// Run the effect now and return what its function returned.
    pub fn run(&self) -> R {
        self.effect.run()
    }

    /// The underlying effect, for installing a scheduler or stopping it.
    pub fn effect(&self) -> &ReactiveEffect<R> {
        &self.effect
    }

    /// Shorthand for `runner.effect().stop()`.
    pub fn stop(&self) {
        self.effect.stop();
    }
}

impl<R> Clone for EffectRunner<R> {
    fn clone(&self) -> Self {
        Self {
            effect: self.effect.clone(),
        }
    }
}

/// Create an effect and run it immediately.
pub fn effect<R: 'static>(func: impl Fn() -> R + 'static) -> EffectRunner<R> {
    effect_with(func, EffectOptions::default())
}

/// Create an effect with options and run it immediately. The first run's
/// result is discarded; call [`EffectRunner::run`] to get one.
pub fn effect_with<R: 'static>(
    func: impl Fn() -> R + 'static,
    options: EffectOptions<R>,
) -> EffectRunner<R> {
    let effect = ReactiveEffect::new(func);
    effect.set_scheduler(options.scheduler);
    effect.run();
    EffectRunner { effect }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
