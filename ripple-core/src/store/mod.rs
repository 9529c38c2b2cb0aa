//! Deep Proxy Store
//!
//! Dynamic objects whose property reads and writes take part in the graph.
//!
//! # Concepts
//!
//! ## Values
//!
//! A [`Value`] is a dynamically typed tree: primitives, maps, arrays and
//! nested refs. Maps and arrays are [`Object`]s, shared by reference and
//! compared by identity.
//!
//! ## Proxies
//!
//! [`reactive`] wraps an object in a [`Reactive`] proxy. Reading a key through
//! the proxy links the key to the active subscriber; writing a key notifies
//! the subscribers of that key only. Nested objects are wrapped as they are
//! read, so observation reaches as deep as the code actually looks.
//!
//! # Implementation Notes
//!
//! Each key gets its own graph node, created on its first tracked read and
//! kept in a per-target map owned by the runtime. Proxies are registered
//! weakly by target, which is what makes `reactive` return the same proxy
//! for the same object.

mod proxy;
mod registry;
mod value;

pub use proxy::{reactive, Reactive};
pub(crate) use registry::Registry;
pub use value::{Key, Object, Value, MAX_ARRAY_LENGTH};
