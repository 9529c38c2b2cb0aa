//! Subscriber capabilities.
//!
//! A subscriber is any computation that reads dependencies and can be
//! re-run when they change. The graph stores a weak handle to each one,
//! tagged by kind, and calls back through these traits during propagation.

use std::rc::Rc;

/// A derived value that can be re-evaluated in place.
pub(crate) trait Recompute {
    /// Re-run the getter under tracking. Returns whether the cached value
    /// changed, which decides whether propagation cascades further.
    fn update(&self) -> bool;
}

/// A side-effecting subscriber that is told when its dependencies changed.
pub(crate) trait Notify {
    /// Run the subscriber's scheduler, or re-run it if it has none.
    fn notify(self: Rc<Self>);
}
