//! Bounded in-memory cache with per-entry TTL.

use super::entry::{CacheEntry, CacheStats};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::Result;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Key → value cache with TTL expiry, oldest-first eviction and
/// coalesced population.
///
/// Thread-safe: entries live behind a mutex that is never held across an
/// await point. Concurrent [`get_or_set`](Self::get_or_set) callers for the
/// same missing key share one factory invocation.
pub struct ResultCache<V> {
    name: String,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<V>>>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V> ResultCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache with default configuration and the wall clock.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CacheConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(name: impl Into<String>, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            config,
            clock,
            sequence: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get an unexpired value. Expired entries are removed on sight.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.lookup(key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    fn lookup(&self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Whether an unexpired value exists. Does not touch hit/miss counters.
    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Store a value with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, None);
    }

    /// Store a value. Inserting a new key into a full cache evicts the entry
    /// with the oldest timestamp.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let entry = CacheEntry {
            key: key.clone(),
            value,
            timestamp: self.clock.now_millis(),
            ttl: ttl.as_millis() as u64,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };

        let mut entries = lock(&self.entries);
        if !entries.contains_key(&key) {
            while entries.len() >= self.config.max_entries.max(1) {
                if !self.evict_oldest(&mut entries) {
                    break;
                }
            }
        }
        entries.insert(key, entry);
    }

    fn evict_oldest(&self, entries: &mut HashMap<String, CacheEntry<V>>) -> bool {
        let oldest = entries
            .values()
            .min_by_key(|e| (e.timestamp, e.sequence))
            .map(|e| e.key.clone());

        match oldest {
            Some(key) => {
                entries.remove(&key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("Cache {} evicted {}", self.name, key);
                true
            }
            None => false,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        lock(&self.entries).remove(key).is_some()
    }

    /// Return the cached value, or run `factory` once, store and return its
    /// result.
    ///
    /// Concurrent callers for the same missing key wait for the first
    /// caller's factory instead of running their own. A failed factory is not
    /// cached; a waiter still holding the slot then runs its own factory, and
    /// the slot is released either way.
    pub async fn get_or_set<F, Fut>(&self, key: &str, ttl: Option<Duration>, factory: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let cell = {
            let mut in_flight = lock(&self.in_flight);
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let this = self;
        let result = cell
            .get_or_try_init(|| async move {
                if let Some(value) = this.lookup(key) {
                    return Ok(value);
                }
                let value = factory().await?;
                this.set_with_ttl(key, value.clone(), ttl);
                Ok(value)
            })
            .await
            .cloned();

        // Waiters already hold the cell; later callers start fresh.
        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.get(key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                in_flight.remove(key);
            }
        }

        result
    }

    /// Delete every key matching `pattern`. Returns the number removed.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|key, _| !pattern.is_match(key));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(
                "Cache {} invalidated {} entries matching {}",
                self.name,
                removed,
                pattern.as_str()
            );
        }
        removed
    }

    /// Delete every key under `namespace:`.
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        let pattern = format!("^{}:", regex::escape(namespace));
        match Regex::new(&pattern) {
            Ok(re) => self.invalidate_pattern(&re),
            Err(e) => {
                warn!("Invalid namespace pattern {}: {}", pattern, e);
                0
            }
        }
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
        lock(&self.in_flight).clear();
    }

    /// Number of stored entries, expired ones included until pruned.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries.
    ///
    /// Expired keys are collected in one scan under the lock; each removal
    /// then takes the lock on its own.
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let expired: Vec<String> = lock(&self.entries)
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            let mut entries = lock(&self.entries);
            if entries
                .get(&key)
                .is_some_and(|e| e.is_expired(self.clock.now_millis()))
            {
                entries.remove(&key);
                removed += 1;
            }
        }

        if removed > 0 {
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Cache {} pruned {} expired entries", self.name, removed);
        }
        removed
    }

    /// Run [`prune_expired`](Self::prune_expired) every
    /// `config.prune_interval` until the cache is dropped.
    pub fn spawn_pruner(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let period = self.config.prune_interval;
        let name = self.name.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    info!("Cache {} dropped, stopping pruner", name);
                    break;
                };
                cache.prune_expired();
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            max_entries: self.config.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of unexpired entries, oldest first.
    pub fn export(&self) -> Vec<CacheEntry<V>> {
        let now = self.clock.now_millis();
        let mut live: Vec<CacheEntry<V>> = lock(&self.entries)
            .values()
            .filter(|e| !e.is_expired(now))
            .cloned()
            .collect();
        live.sort_by_key(|e| (e.timestamp, e.sequence));
        live
    }
}

impl<V> ResultCache<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.export())?)
    }

    /// Restore entries from [`export_json`](Self::export_json) output.
    ///
    /// Malformed or already-expired entries are skipped. Returns the number
    /// of entries restored.
    pub fn import_json(&self, payload: &str) -> usize {
        let items = match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(serde_json::Value::Array(items)) => items,
            Ok(_) => {
                warn!("Cache {} import payload is not a list, ignoring", self.name);
                return 0;
            }
            Err(e) => {
                warn!("Cache {} import payload is not JSON: {}", self.name, e);
                return 0;
            }
        };

        let now = self.clock.now_millis();
        let mut restored = 0;
        for (i, item) in items.into_iter().enumerate() {
            let mut entry: CacheEntry<V> = match serde_json::from_value(item) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cache {} skipping malformed entry {}: {}", self.name, i, e);
                    continue;
                }
            };
            if entry.is_expired(now) {
                continue;
            }
            entry.sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

            let mut entries = lock(&self.entries);
            if !entries.contains_key(&entry.key) {
                while entries.len() >= self.config.max_entries.max(1) {
                    if !self.evict_oldest(&mut entries) {
                        break;
                    }
                }
            }
            entries.insert(entry.key.clone(), entry);
            restored += 1;
        }
        restored
    }
}
