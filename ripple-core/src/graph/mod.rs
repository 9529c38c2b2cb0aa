//! Dependency Graph
//!
//! This module implements the subscription graph that connects observable
//! values (dependencies) to the computations that read them (subscribers).
//!
//! # Overview
//!
//! Every edge is a `Link` that lives in two lists at once:
//!
//! - the dependency's subscriber list, doubly linked through
//!   `prev_sub`/`next_sub` so a link can be removed in O(1)
//! - the subscriber's dependency list, singly linked through `next_dep`
//!   because re-tracking only ever walks it forward
//!
//! # Design Decisions
//!
//! 1. Links and nodes live in an arena ([`Graph`]) and refer to each other by
//!    index. There are no owning pointers between nodes, so the cyclic
//!    dependency/subscriber structure never fights the borrow checker.
//!
//! 2. Reclaimed links are pushed onto an intrusive free list (the pool) and
//!    handed out again before the arena grows. A subscriber that re-runs and
//!    reads the same dependencies in the same order allocates nothing.
//!
//! 3. Propagation is synchronous. Effects reached during a walk are queued
//!    and drained breadth-first once the outermost walk finishes, which
//!    keeps list iteration free of re-entrant mutation and runs each effect
//!    at most once per write.

mod arena;
mod node;
mod scheduler;

pub use arena::GraphStats;
pub(crate) use arena::Graph;
pub use node::{LinkId, NodeId};
pub(crate) use node::NodeKind;
pub(crate) use scheduler::Scheduler;
