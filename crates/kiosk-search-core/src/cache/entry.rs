//! Cache entry and statistics types.

use serde::{Deserialize, Serialize};

/// A cached value with the time it was stored and how long it lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    /// When the entry was stored, in milliseconds since the epoch.
    pub timestamp: u64,
    /// Time-to-live in milliseconds.
    pub ttl: u64,
    /// Insertion order, breaks timestamp ties during eviction.
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl<V> CacheEntry<V> {
    /// An entry is expired once strictly more than `ttl` has passed.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis.saturating_sub(self.timestamp) > self.ttl
    }
}

/// Counters for one cache instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_strict() {
        let entry = CacheEntry {
            key: "k".to_string(),
            value: 1,
            timestamp: 1_000,
            ttl: 100,
            sequence: 0,
        };
        assert!(!entry.is_expired(1_050));
        assert!(!entry.is_expired(1_100));
        assert!(entry.is_expired(1_101));
        assert!(!entry.is_expired(500));
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
