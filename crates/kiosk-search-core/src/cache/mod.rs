//! Result caching for compiled queries.
//!
//! Provides a generic bounded cache used by the optimizer for both query rows
//! and count estimates:
//! - per-entry TTL with strict expiry (`now - timestamp > ttl`)
//! - oldest-first eviction at `max_entries`
//! - regex and namespace invalidation
//! - coalesced `get_or_set` population
//! - periodic background pruning
//!
//! Keys follow the `namespace:hash` convention produced by [`generate_key`].

mod entry;
mod keys;
mod result_cache;

pub use entry::{CacheEntry, CacheStats};
pub use keys::{generate_key, key_for};
pub use result_cache::ResultCache;
