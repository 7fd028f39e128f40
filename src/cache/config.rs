//! Page cache configuration.

use std::num::NonZeroUsize;

const DEFAULT_INDEX_TTL_SECONDS: u64 = 20;
const DEFAULT_ENTRY_LIMIT: usize = 64;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Disabling removes the cache layer entirely; every index request
    /// then reads through to storage.
    pub enabled: bool,
    /// Seconds a cached index page stays servable.
    pub index_ttl_seconds: u64,
    /// Maximum number of cached pages held at once (one per distinct
    /// path + query combination).
    pub entry_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            index_ttl_seconds: DEFAULT_INDEX_TTL_SECONDS,
            entry_limit: DEFAULT_ENTRY_LIMIT,
        }
    }
}

impl CacheConfig {
    /// Entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.entry_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            index_ttl_seconds: settings.index_ttl_seconds.get(),
            entry_limit: settings.entry_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.index_ttl_seconds, 20);
        assert_eq!(config.entry_limit, 64);
    }

    #[test]
    fn entry_limit_clamps_to_min() {
        let config = CacheConfig {
            entry_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.entry_limit_non_zero().get(), 1);
    }
}
