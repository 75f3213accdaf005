//! Short-lived response caching.
//!
//! This module provides an upstream-agnostic caching mechanism that:
//! - Stores values under stable hashed keys
//! - Expires entries lazily once they outlive the TTL
//! - Takes its clock as a dependency so expiry is testable

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, CachedEntry, MemoryStorage, NoopStorage};
pub use traits::{CacheResult, CacheSource, Clock, QueryKey, SystemClock};
