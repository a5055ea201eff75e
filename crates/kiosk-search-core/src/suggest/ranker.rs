//! History-aware suggestion ranking.

use super::sources::{adjust_relevance, category_suggestions, decayed, smart_suggestions};
use super::store::EntryStore;
use super::types::{HistoryEntry, PopularityEntry, Suggestion, SuggestionKind};
use crate::clock::{Clock, SystemClock};
use crate::config::{RankerConfig, RankerDefaults};
use crate::error::Result;
use crate::filter::{ContentType, FilterModel};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Ranks autocomplete suggestions from recent searches, popularity counts,
/// per-content-type vocabulary and input-shape templates.
///
/// History is kept newest first, holds at most one entry per
/// case-insensitive query, and is trimmed oldest-first at `max_history`.
pub struct SuggestionRanker {
    history: RwLock<VecDeque<HistoryEntry>>,
    popularity: RwLock<HashMap<String, PopularityEntry>>,
    config: RankerConfig,
    clock: Arc<dyn Clock>,
}

impl Default for SuggestionRanker {
    fn default() -> Self {
        Self::new()
    }
}

impl SuggestionRanker {
    pub fn new() -> Self {
        Self::with_config(RankerConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(config: RankerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            history: RwLock::new(VecDeque::new()),
            popularity: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.clock.now_millis() as i64).unwrap_or_default()
    }

    /// Ranked suggestions for `input`.
    ///
    /// Blank input yields the default list built from history and
    /// popularity alone.
    pub fn suggest(&self, input: &str, content_type: Option<ContentType>) -> Vec<Suggestion> {
        let needle = normalize(input);
        if needle.is_empty() {
            return self.default_suggestions();
        }

        let mut candidates = self.recent_candidates(&needle);
        candidates.extend(self.popular_candidates(&needle));
        candidates.extend(smart_suggestions(input.trim()));
        if let Some(content_type) = content_type {
            candidates.extend(category_suggestions(content_type, &needle));
        }

        for candidate in &mut candidates {
            candidate.relevance =
                adjust_relevance(candidate.relevance, &candidate.text.to_lowercase(), &needle);
        }

        let ranked = self.rank(candidates);
        debug!("Ranked {} suggestions for {:?}", ranked.len(), input);
        ranked
    }

    fn recent_candidates(&self, needle: &str) -> Vec<Suggestion> {
        read(&self.history)
            .iter()
            .filter(|entry| {
                let query = entry.query.to_lowercase();
                query.contains(needle) || needle.contains(query.as_str())
            })
            .enumerate()
            .map(|(rank, entry)| {
                let mut suggestion = Suggestion::new(
                    SuggestionKind::Recent,
                    entry.query.clone(),
                    decayed(RankerDefaults::RECENT_BASE, rank),
                );
                suggestion.result_count = Some(entry.result_count);
                suggestion
            })
            .collect()
    }

    /// Popularity entries at or above the threshold, most counted first.
    fn popular_entries(&self) -> Vec<PopularityEntry> {
        let mut entries: Vec<PopularityEntry> = read(&self.popularity)
            .values()
            .filter(|entry| entry.count >= self.config.min_popularity)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.query.cmp(&b.query)));
        entries
    }

    fn popular_candidates(&self, needle: &str) -> Vec<Suggestion> {
        self.popular_entries()
            .into_iter()
            .filter(|entry| entry.query.to_lowercase().contains(needle))
            .enumerate()
            .map(|(rank, entry)| {
                Suggestion::new(
                    SuggestionKind::Popular,
                    entry.query,
                    decayed(RankerDefaults::POPULAR_BASE, rank),
                )
            })
            .collect()
    }

    /// Recent and popular candidates weighted by how often each was used.
    fn default_suggestions(&self) -> Vec<Suggestion> {
        let mut candidates: Vec<Suggestion> = read(&self.history)
            .iter()
            .enumerate()
            .map(|(rank, entry)| {
                let mut suggestion = Suggestion::new(
                    SuggestionKind::Recent,
                    entry.query.clone(),
                    decayed(RankerDefaults::RECENT_BASE, rank),
                );
                suggestion.result_count = Some(entry.result_count);
                suggestion
            })
            .collect();

        candidates.extend(
            self.popular_entries()
                .into_iter()
                .enumerate()
                .map(|(rank, entry)| {
                    Suggestion::new(
                        SuggestionKind::Popular,
                        entry.query,
                        decayed(RankerDefaults::POPULAR_BASE, rank),
                    )
                }),
        );

        {
            let popularity = read(&self.popularity);
            for candidate in &mut candidates {
                let count = popularity
                    .get(&normalize(&candidate.text))
                    .map_or(1, |entry| entry.count.max(1));
                candidate.relevance *=
                    1.0 + RankerDefaults::POPULARITY_WEIGHT * f64::from(count - 1);
            }
        }

        self.rank(candidates)
    }

    /// Sort by relevance then kind priority, drop case-insensitive
    /// duplicates after their best occurrence, and truncate.
    fn rank(&self, mut candidates: Vec<Suggestion>) -> Vec<Suggestion> {
        candidates.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| a.kind.cmp(&b.kind))
        });

        let mut seen = HashSet::new();
        candidates.retain(|candidate| seen.insert(candidate.text.to_lowercase()));
        candidates.truncate(self.config.max_suggestions);
        candidates
    }

    /// Record a completed search.
    ///
    /// Moves the query to the front of the history and counts it once more.
    pub fn record_search(
        &self,
        query: &str,
        result_count: u64,
        filters: Option<FilterModel>,
    ) {
        let query = query.trim();
        let key = normalize(query);
        if key.is_empty() {
            return;
        }

        {
            let mut history = write(&self.history);
            history.retain(|entry| normalize(&entry.query) != key);
            history.push_front(HistoryEntry {
                query: query.to_string(),
                timestamp: self.now(),
                result_count,
                filters,
            });
            history.truncate(self.config.max_history);
        }

        self.bump(&key, query, 1);
        debug!("Recorded search {:?} ({} results)", query, result_count);
    }

    /// Count a picked suggestion without adding it to the history.
    pub fn learn_from_selection(&self, text: &str) {
        let text = text.trim();
        let key = normalize(text);
        if key.is_empty() {
            return;
        }
        self.bump(&key, text, self.config.selection_boost);
    }

    fn bump(&self, key: &str, display: &str, by: u32) {
        let mut popularity = write(&self.popularity);
        let entry = popularity
            .entry(key.to_string())
            .or_insert_with(|| PopularityEntry {
                query: display.to_string(),
                count: 0,
            });
        entry.query = display.to_string();
        entry.count = entry.count.saturating_add(by);
    }

    /// Forget recent searches. Popularity is kept.
    pub fn clear_history(&self) {
        write(&self.history).clear();
        info!("Cleared search history");
    }

    /// History, newest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        read(&self.history).iter().cloned().collect()
    }

    /// Popularity entries, most counted first.
    pub fn popularity(&self) -> Vec<PopularityEntry> {
        let mut entries: Vec<PopularityEntry> = read(&self.popularity).values().cloned().collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.query.cmp(&b.query)));
        entries
    }

    /// Replace in-memory state with the contents of the stores.
    ///
    /// History is restored in stored order and trimmed to `max_history`.
    pub fn load(
        &self,
        history: &dyn EntryStore<HistoryEntry>,
        popularity: &dyn EntryStore<PopularityEntry>,
    ) -> Result<()> {
        let mut entries: VecDeque<HistoryEntry> = history.load()?.into();
        entries.truncate(self.config.max_history);
        let counts: HashMap<String, PopularityEntry> = popularity
            .load()?
            .into_iter()
            .map(|entry| (normalize(&entry.query), entry))
            .collect();

        info!(
            "Loaded {} history entries and {} popularity entries",
            entries.len(),
            counts.len()
        );
        *write(&self.history) = entries;
        *write(&self.popularity) = counts;
        Ok(())
    }

    /// Write current state to the stores.
    pub fn persist(
        &self,
        history: &dyn EntryStore<HistoryEntry>,
        popularity: &dyn EntryStore<PopularityEntry>,
    ) -> Result<()> {
        history.save(&self.history())?;
        popularity.save(&self.popularity())?;
        info!("Persisted search history");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::suggest::{MemoryEntryStore, SqliteEntryStore};

    fn ranker() -> SuggestionRanker {
        SuggestionRanker::with_config(RankerConfig::default(), Arc::new(ManualClock::new(1_000)))
    }

    /// History ends up as John Doe, John Smith, Jane Doe (newest first).
    fn seeded() -> SuggestionRanker {
        let ranker = ranker();
        ranker.record_search("Jane Doe", 3, None);
        ranker.record_search("John Smith", 5, None);
        ranker.record_search("John Doe", 2, None);
        ranker
    }

    #[test]
    fn test_recent_matches_rank_first() {
        let ranker = seeded();
        let suggestions = ranker.suggest("joh", None);

        assert_eq!(suggestions[0].kind, SuggestionKind::Recent);
        assert_eq!(suggestions[0].text, "John Doe");
        assert_eq!(suggestions[1].kind, SuggestionKind::Recent);
        assert_eq!(suggestions[1].text, "John Smith");
        assert_eq!(suggestions[0].result_count, Some(2));
        assert!(suggestions.iter().all(|s| s.text != "Jane Doe"));
    }

    #[test]
    fn test_popularity_reorders_default_list() {
        let ranker = seeded();
        for _ in 0..4 {
            ranker.learn_from_selection("john smith");
        }
        let count = ranker
            .popularity()
            .into_iter()
            .find(|e| e.query.eq_ignore_ascii_case("john smith"))
            .unwrap()
            .count;
        assert_eq!(count, 5);

        let defaults = ranker.suggest("", None);
        let smith = defaults
            .iter()
            .position(|s| s.text.eq_ignore_ascii_case("john smith"))
            .unwrap();
        let doe = defaults.iter().position(|s| s.text == "John Doe").unwrap();
        assert!(smith < doe);
        assert!(defaults.iter().all(|s| matches!(
            s.kind,
            SuggestionKind::Recent | SuggestionKind::Popular
        )));
    }

    #[test]
    fn test_default_list_without_popularity_is_recency() {
        let ranker = seeded();
        let texts: Vec<String> = ranker.suggest("  ", None).into_iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["John Doe", "John Smith", "Jane Doe"]);
    }

    #[test]
    fn test_case_duplicates_collapse() {
        let ranker = ranker();
        ranker.record_search("Contract Law", 4, None);
        ranker.learn_from_selection("contract law");

        let suggestions = ranker.suggest("contract law", Some(ContentType::Publications));
        let matching: Vec<&Suggestion> = suggestions
            .iter()
            .filter(|s| s.text.eq_ignore_ascii_case("contract law"))
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].kind, SuggestionKind::Recent);
        assert!((matching[0].relevance - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_sorted_descending_and_truncated() {
        let config = RankerConfig {
            max_suggestions: 3,
            ..RankerConfig::default()
        };
        let ranker = SuggestionRanker::with_config(config, Arc::new(ManualClock::new(0)));
        for name in ["Law Review 2001", "Law School", "Lawrence Hall", "Law Library"] {
            ranker.record_search(name, 1, None);
        }

        let suggestions = ranker.suggest("Law", Some(ContentType::Publications));
        assert_eq!(suggestions.len(), 3);
        for pair in suggestions.windows(2) {
            assert!(pair[0].relevance >= pair[1].relevance);
        }
    }

    #[test]
    fn test_smart_and_category_sources() {
        let ranker = ranker();
        let suggestions = ranker.suggest("law", Some(ContentType::Publications));
        let kinds: HashSet<SuggestionKind> = suggestions.iter().map(|s| s.kind).collect();
        assert!(kinds.contains(&SuggestionKind::Smart));
        assert!(kinds.contains(&SuggestionKind::Category));
        assert!(suggestions.iter().any(|s| s.text == "law review"));
        assert!(suggestions.iter().any(|s| s.text == "law publications"));

        let without_type = ranker.suggest("law", None);
        assert!(without_type.iter().all(|s| s.kind != SuggestionKind::Category));
    }

    #[test]
    fn test_record_dedups_and_trims() {
        let config = RankerConfig {
            max_history: 2,
            ..RankerConfig::default()
        };
        let ranker = SuggestionRanker::with_config(config, Arc::new(ManualClock::new(0)));
        ranker.record_search("alpha", 1, None);
        ranker.record_search("beta", 1, None);
        ranker.record_search("ALPHA", 7, None);
        ranker.record_search("gamma", 1, None);

        let history: Vec<String> = ranker.history().into_iter().map(|h| h.query).collect();
        assert_eq!(history, vec!["gamma", "ALPHA"]);
        assert_eq!(ranker.popularity()[0].count, 2);
        assert_eq!(ranker.popularity()[0].query, "ALPHA");
    }

    #[test]
    fn test_selection_does_not_touch_history() {
        let ranker = ranker();
        ranker.learn_from_selection("moot court");
        assert!(ranker.history().is_empty());
        assert_eq!(ranker.popularity()[0].count, 1);

        ranker.record_search("", 0, None);
        assert!(ranker.history().is_empty());
    }

    #[test]
    fn test_clear_history_keeps_popularity() {
        let ranker = seeded();
        ranker.clear_history();
        assert!(ranker.history().is_empty());
        assert_eq!(ranker.popularity().len(), 3);
    }

    #[test]
    fn test_history_timestamp_from_clock() {
        let ranker = ranker();
        ranker.record_search("torts", 1, None);
        assert_eq!(ranker.history()[0].timestamp.timestamp_millis(), 1_000);
    }

    #[test]
    fn test_persist_and_load_round_trip() {
        let history: MemoryEntryStore<HistoryEntry> = MemoryEntryStore::new();
        let popularity: MemoryEntryStore<PopularityEntry> = MemoryEntryStore::new();

        let original = seeded();
        original.persist(&history, &popularity).unwrap();

        let restored = ranker();
        restored.load(&history, &popularity).unwrap();
        assert_eq!(restored.history(), original.history());
        assert_eq!(restored.popularity(), original.popularity());
    }

    #[test]
    fn test_load_from_sqlite_store() {
        let store = SqliteEntryStore::open_in_memory("history").unwrap();
        let counts = store.namespace("popularity");

        let original = seeded();
        original.persist(&store, &counts).unwrap();

        let restored = ranker();
        restored.load(&store, &counts).unwrap();
        let texts: Vec<String> = restored.history().into_iter().map(|h| h.query).collect();
        assert_eq!(texts, vec!["John Doe", "John Smith", "Jane Doe"]);
        assert_eq!(restored.suggest("joh", None)[0].text, "John Doe");
    }
}
