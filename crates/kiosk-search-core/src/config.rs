//! Centralized configuration for the kiosk search core.
//!
//! Constant tables hold the fixed tuning values; the `*Config` structs are the
//! runtime knobs and can be loaded from a JSON file. Durations in files are
//! written as milliseconds.

use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Result cache defaults.
pub struct CacheDefaults;

impl CacheDefaults {
    pub const TTL: Duration = Duration::from_secs(300);
    pub const MAX_ENTRIES: usize = 100;
    pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);
    /// Length of the hex digest used in cache keys.
    pub const KEY_HASH_LEN: usize = 16;
}

/// Compiler and full-text index defaults.
pub struct CompilerDefaults;

impl CompilerDefaults {
    /// Text form of date bind values.
    pub const DATE_FORMAT: &'static str = "%Y-%m-%d";
    pub const FTS_TOKENIZER: &'static str = "unicode61 remove_diacritics 1";
}

/// Validator thresholds and weights.
pub struct ValidatorDefaults;

impl ValidatorDefaults {
    pub const COMPLEXITY_WARNING: f64 = 50.0;
    pub const OR_MULTIPLIER: f64 = 1.5;
    pub const TEXT_WEIGHT: f64 = 2.0;
    pub const DATE_WEIGHT: f64 = 3.0;
    pub const RANGE_WEIGHT: f64 = 2.0;
    pub const BOOLEAN_WEIGHT: f64 = 1.0;
    pub const CUSTOM_WEIGHT: f64 = 4.0;
}

/// Optimizer defaults.
pub struct OptimizerDefaults;

impl OptimizerDefaults {
    pub const STATEMENT_MAX_AGE: Duration = Duration::from_secs(3600);
    pub const RESULT_TTL: Duration = Duration::from_secs(300);
    pub const COUNT_TTL: Duration = Duration::from_secs(600);
    pub const INDEXED_COST: f64 = 10.0;
    pub const FULL_SCAN_COST: f64 = 100.0;
    /// Length of the hex digest used in prepared statement ids.
    pub const STATEMENT_HASH_LEN: usize = 16;
}

/// Suggestion ranker defaults.
pub struct RankerDefaults;

impl RankerDefaults {
    pub const MAX_SUGGESTIONS: usize = 8;
    pub const MAX_HISTORY: usize = 50;
    pub const MIN_POPULARITY: u32 = 2;
    pub const SELECTION_BOOST: u32 = 1;

    pub const RECENT_BASE: f64 = 1.0;
    pub const POPULAR_BASE: f64 = 0.9;
    pub const CATEGORY_BASE: f64 = 0.7;
    pub const SMART_BASE: f64 = 0.6;
    pub const RANK_DECAY: f64 = 0.1;

    pub const EXACT_BOOST: f64 = 1.5;
    pub const PREFIX_BOOST: f64 = 1.3;
    pub const SUBSTRING_BOOST: f64 = 1.1;
    pub const POPULARITY_WEIGHT: f64 = 0.1;
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Configuration for a [`ResultCache`](crate::cache::ResultCache).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without one.
    #[serde(rename = "defaultTtlMs", with = "duration_ms")]
    pub default_ttl: Duration,
    /// Maximum number of live entries.
    pub max_entries: usize,
    /// Interval of the background pruning task.
    #[serde(rename = "pruneIntervalMs", with = "duration_ms")]
    pub prune_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: CacheDefaults::TTL,
            max_entries: CacheDefaults::MAX_ENTRIES,
            prune_interval: CacheDefaults::PRUNE_INTERVAL,
        }
    }
}

/// Configuration for the [`QueryOptimizer`](crate::optimizer::QueryOptimizer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizerConfig {
    /// Single-use statements older than this are dropped by `prune_statements`.
    #[serde(rename = "statementMaxAgeMs", with = "duration_ms")]
    pub statement_max_age: Duration,
    #[serde(rename = "resultTtlMs", with = "duration_ms")]
    pub result_ttl: Duration,
    #[serde(rename = "countTtlMs", with = "duration_ms")]
    pub count_ttl: Duration,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            statement_max_age: OptimizerDefaults::STATEMENT_MAX_AGE,
            result_ttl: OptimizerDefaults::RESULT_TTL,
            count_ttl: OptimizerDefaults::COUNT_TTL,
        }
    }
}

/// Configuration for the [`SuggestionRanker`](crate::suggest::SuggestionRanker).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RankerConfig {
    pub max_suggestions: usize,
    pub max_history: usize,
    /// Popularity entries below this count are not offered.
    pub min_popularity: u32,
    /// Popularity added by `learn_from_selection`.
    pub selection_boost: u32,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            max_suggestions: RankerDefaults::MAX_SUGGESTIONS,
            max_history: RankerDefaults::MAX_HISTORY,
            min_popularity: RankerDefaults::MIN_POPULARITY,
            selection_boost: RankerDefaults::SELECTION_BOOST,
        }
    }
}

/// Aggregate configuration for every component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchConfig {
    pub results_cache: CacheConfig,
    pub counts_cache: CacheConfig,
    pub optimizer: OptimizerConfig,
    pub ranker: RankerConfig,
}

impl SearchConfig {
    /// Parse a configuration from JSON text. Missing fields use defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: SearchConfig = serde_json::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    /// Read a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| SearchError::io_with_path(e, path))?;
        Self::from_json(&text)
    }

    fn check(&self) -> Result<()> {
        for (name, cache) in [
            ("resultsCache", &self.results_cache),
            ("countsCache", &self.counts_cache),
        ] {
            if cache.max_entries == 0 {
                return Err(SearchError::Config {
                    message: format!("{}.maxEntries must be at least 1", name),
                });
            }
            if cache.prune_interval.is_zero() {
                return Err(SearchError::Config {
                    message: format!("{}.pruneIntervalMs must be positive", name),
                });
            }
        }
        if self.ranker.max_history == 0 {
            return Err(SearchError::Config {
                message: "ranker.maxHistory must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
