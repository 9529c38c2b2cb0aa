//! Ripple Core
//!
//! This crate provides the dependency-tracking runtime behind Ripple's
//! fine-grained reactivity. It implements:
//!
//! - Reactive primitives (refs, computeds, effects, watchers)
//! - Deep observation of dynamic objects and arrays through proxies
//! - A link graph with pooled edges and synchronous, glitch-free propagation
//!
//! Rendering is not part of this crate. A renderer is just another consumer
//! that wraps its render function in an effect or a computed.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node and link arena, and the propagation scheduler
//! - `reactive`: tracking context, runtime, and the public primitives
//! - `store`: dynamic values, proxies, and per-key dependency bookkeeping
//! - `error`: the crate's error type
//!
//! Everything is single-threaded: each thread has its own runtime, and the
//! handles are neither `Send` nor `Sync`.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use ripple_core::{computed, effect, Ref};
//!
//! // Create a ref
//! let count = Ref::new(0);
//!
//! // Create a derived value
//! let doubled = computed({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _runner = effect({
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     move || log.borrow_mut().push(format!("{} {}", count.get(), doubled.get()))
//! });
//!
//! // Update the ref
//! count.set(5);
//! // Effect automatically ran again
//! assert_eq!(*log.borrow(), vec!["0 0", "5 10"]);
//! ```

pub mod error;
pub mod graph;
pub mod reactive;
pub mod store;

pub use error::{ReactiveError, Result};
pub use graph::GraphStats;
pub use reactive::{
    computed, computed_with, config, configure, effect, effect_with, graph_stats, pending_effects,
    untracked, watch, Computed, EffectOptions, EffectRunner, EffectScheduler, ReactiveContext,
    ReactiveEffect, Ref, RuntimeConfig, Trackable, WatchHandle, WatchOptions, WatchSource,
};
pub use store::{reactive, Key, Object, Reactive, Value, MAX_ARRAY_LENGTH};
