//! Session-local caching: the value-equality cache key and the per-session
//! key/value store with its in-progress sentinel.

pub mod key;
pub mod local;

pub use key::CacheKey;
pub use local::{CacheEntry, LocalCache};
