//! The index page cache.
//!
//! Caches the fully rendered global listing for a fixed time-to-live.
//! Writes do not invalidate entries; staleness within the TTL window is
//! the intended tradeoff. Only the index route is wired through this
//! layer.

mod config;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use middleware::{CacheState, page_cache_layer};
pub use store::{CachedPage, Clock, PageCache, PageKey, SystemClock, hash_query};
