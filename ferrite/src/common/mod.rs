//! Common types and utilities shared across the crate.

mod constants;
pub mod value;

pub use constants::*;
pub use value::Value;

use parking_lot::RwLock;
use std::sync::Arc;

/// Shared mutable cell used across threads.
pub type Atomic<T> = Arc<RwLock<T>>;

/// Wraps a value in an [Atomic] cell.
pub fn atomic<T>(t: T) -> Atomic<T> {
    Arc::new(RwLock::new(t))
}
