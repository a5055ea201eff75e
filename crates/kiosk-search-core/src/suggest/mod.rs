//! Autocomplete suggestions ranked from usage history.
//!
//! [`SuggestionRanker`] owns the recent-search history and popularity counts.
//! Both are plain serializable values; [`EntryStore`] is the boundary through
//! which a host persists and restores them.

mod ranker;
mod sources;
mod store;
mod types;

pub use ranker::SuggestionRanker;
pub use sources::category_terms;
pub use store::{EntryStore, MemoryEntryStore, SqliteEntryStore};
pub use types::{HistoryEntry, PopularityEntry, Suggestion, SuggestionKind};
