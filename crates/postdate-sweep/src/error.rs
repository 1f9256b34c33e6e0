//! Sweep-level error type.
//!
//! Per-item failures never surface here: a rejected send becomes a `failed`
//! item, a transient store error leaves the item pending. Only a failure to
//! reach the store at all aborts a sweep.

use postdate_core::CoreError;
use thiserror::Error;

/// Result type alias using `SweepError`.
pub type Result<T> = std::result::Result<T, SweepError>;

/// Errors that abort an entire sweep invocation.
#[derive(Debug, Error)]
pub enum SweepError {
    /// The item store could not even list due items.
    #[error("item store unavailable: {0}")]
    Store(#[from] CoreError),
}
