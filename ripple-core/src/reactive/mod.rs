//! Reactive Primitives
//!
//! This module implements the core reactive system: refs, computeds,
//! effects and watchers. These primitives sit on top of the dependency
//! graph in [`crate::graph`].
//!
//! # Concepts
//!
//! ## Refs
//!
//! A [`Ref`] is a container for mutable state. When a ref's value is read
//! within a tracking context (such as a computed or effect), the ref
//! automatically registers that context as a dependent. When the ref's value
//! changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changed, and only when somebody needs
//! the result. It is both a subscriber and a dependency.
//!
//! ## Effects
//!
//! A [`ReactiveEffect`] is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as a renderer or a log.
//!
//! ## Watchers
//!
//! [`watch`] is an effect that compares: it calls back with the new and the
//! previous value of its source.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a ref is read, we check if there is an active
//! tracking context and, if so, link the ref to it.
//!
//! Values stored in refs and computeds implement [`Trackable`], which decides
//! what counts as a change.

mod cell;
mod computed;
mod context;
mod effect;
mod runtime;
mod subscriber;
mod trackable;
mod watch;

pub use cell::Ref;
pub use computed::{computed, computed_with, Computed};
pub use context::ReactiveContext;
pub use effect::{effect, effect_with, EffectOptions, EffectRunner, EffectScheduler, ReactiveEffect};
pub use runtime::{config, configure, graph_stats, pending_effects, untracked, RuntimeConfig};
pub use trackable::Trackable;
pub use watch::{watch, WatchHandle, WatchOptions, WatchSource};

pub(crate) use context::TrackScope;
pub(crate) use runtime::Runtime;
pub(crate) use subscriber::{Notify, Recompute};
