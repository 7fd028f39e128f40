//! TTL-stamped storage for rendered index pages.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use time::{Duration, OffsetDateTime};

use super::config::CacheConfig;

/// Source of "now" for expiry checks. Injected so tests can drive time
/// deterministically instead of sleeping through the TTL.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Cache key: request path plus a hash of the query string, so `/` and
/// `/?page=2` are cached independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub path: String,
    pub query_hash: u64,
}

pub fn hash_query(query: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    query.hash(&mut hasher);
    hasher.finish()
}

/// A rendered response held until its deadline passes.
#[derive(Clone)]
pub struct CachedPage {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    expires_at: OffsetDateTime,
}

/// LRU map of rendered pages with per-entry deadlines.
///
/// Entries expire by deadline only; nothing invalidates them on writes.
/// `clear` is the explicit escape hatch.
pub struct PageCache {
    ttl: Duration,
    entries: RwLock<LruCache<PageKey, CachedPage>>,
}

impl PageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: Duration::seconds(config.index_ttl_seconds.min(i64::MAX as u64) as i64),
            entries: RwLock::new(LruCache::new(config.entry_limit_non_zero())),
        }
    }

    /// Look up a live entry. An expired entry is dropped and counts as a
    /// miss, so the caller repopulates it.
    pub fn get(&self, key: &PageKey, now: OffsetDateTime) -> Option<CachedPage> {
        let mut entries = self.write_entries();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.clone()),
            Some(_) => {
                entries.pop(key);
                counter!("verso_page_cache_expired_total").increment(1);
                None
            }
            None => None,
        }
    }

    pub fn insert(
        &self,
        key: PageKey,
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
        now: OffsetDateTime,
    ) {
        let entry = CachedPage {
            status,
            headers,
            body,
            expires_at: now + self.ttl,
        };
        self.write_entries().put(key, entry);
    }

    /// Drop every cached page immediately.
    pub fn clear(&self) {
        self.write_entries().clear();
        counter!("verso_page_cache_cleared_total").increment(1);
    }

    pub fn len(&self) -> usize {
        self.write_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panicked writer leaves entries structurally intact, so the
    // poison flag carries no information worth propagating.
    fn write_entries(&self) -> RwLockWriteGuard<'_, LruCache<PageKey, CachedPage>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
