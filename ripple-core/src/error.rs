//! Error types for the reactive runtime.
//!
//! Steady-state graph operations never fail: a malformed link list is an
//! invariant violation and is caught by `debug_assert!` instead of being
//! surfaced here. The errors below are the recoverable conditions a caller
//! can actually run into when writing through the public API.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Errors produced by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A write was attempted on a computed value that has no setter.
    #[error("computed value is read-only")]
    ReadOnlyComputed,

    /// An array length was set to something that is not a non-negative integer.
    #[error("invalid array length: {0}")]
    InvalidArrayLength(String),

    /// A key that the target cannot hold (e.g. a named property on an array).
    #[error("key `{key}` is not valid for {kind}")]
    InvalidKey { key: String, kind: &'static str },

    /// A proxy operation was attempted on a value that is not an object.
    #[error("value is not an object")]
    NotAnObject,

    /// Snapshotting a value to JSON failed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
