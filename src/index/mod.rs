//! Full-text + metadata search index
//!
//! One contract, two interchangeable backends: an SQLite FTS5 index and a
//! ripgrep-backed fallback. The choice is made once at construction; the
//! rest of the system only sees `SearchIndex`.

pub mod grep;
pub mod sqlite;

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::id::NoteId;
use crate::note::Note;
use crate::query::SearchQuery;

pub use grep::GrepIndex;
pub use sqlite::SqliteIndex;

/// One search hit with ranking and display metadata
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: NoteId,
    pub title: String,
    /// Highlighted excerpt; empty when highlighting is off
    pub snippet: String,
    /// Relevance in `[0, 1]`
    pub score: f64,
    pub modified: DateTime<Utc>,
    pub tags: Vec<String>,
    pub notebook: Option<String>,
}

/// Index statistics
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub total_notes: usize,
    pub total_words: usize,
    pub index_size_bytes: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_optimized: Option<DateTime<Utc>>,
}

/// The search index, dispatching to the selected backend
#[derive(Debug)]
pub enum SearchIndex {
    Sqlite(SqliteIndex),
    Grep(GrepIndex),
}

impl SearchIndex {
    /// Construct and initialize an index, preferring the FTS5 backend
    ///
    /// Any SQLite initialization failure selects the grep fallback; if that
    /// is unavailable too, the fallback's `external_tool_error` surfaces.
    pub fn open(notes_dir: &Path, db_path: &Path) -> Result<Self> {
        let sqlite = SqliteIndex::new(db_path);
        match sqlite.initialize() {
            Ok(()) => Ok(SearchIndex::Sqlite(sqlite)),
            Err(e) => {
                tracing::warn!(error = %e, "FTS backend unavailable, falling back to grep index");
                let grep = GrepIndex::new(notes_dir);
                grep.initialize()?;
                Ok(SearchIndex::Grep(grep))
            }
        }
    }

    pub fn initialize(&self) -> Result<()> {
        match self {
            SearchIndex::Sqlite(index) => index.initialize(),
            SearchIndex::Grep(index) => index.initialize(),
        }
    }

    pub fn add(&self, note: &Note) -> Result<()> {
        match self {
            SearchIndex::Sqlite(index) => index.add(note),
            SearchIndex::Grep(index) => index.add(note),
        }
    }

    pub fn update(&self, note: &Note) -> Result<()> {
        match self {
            SearchIndex::Sqlite(index) => index.update(note),
            SearchIndex::Grep(index) => index.update(note),
        }
    }

    pub fn remove(&self, id: &NoteId) -> Result<()> {
        match self {
            SearchIndex::Sqlite(index) => index.remove(id),
            SearchIndex::Grep(index) => index.remove(id),
        }
    }

    pub fn rebuild(&self) -> Result<()> {
        match self {
            SearchIndex::Sqlite(index) => index.rebuild(),
            SearchIndex::Grep(index) => index.rebuild(),
        }
    }

    pub fn optimize(&self) -> Result<()> {
        match self {
            SearchIndex::Sqlite(index) => index.optimize(),
            SearchIndex::Grep(index) => index.optimize(),
        }
    }

    pub fn vacuum(&self) -> Result<()> {
        match self {
            SearchIndex::Sqlite(index) => index.vacuum(),
            SearchIndex::Grep(index) => index.vacuum(),
        }
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        match self {
            SearchIndex::Sqlite(index) => index.search(query),
            SearchIndex::Grep(index) => index.search(query),
        }
    }

    pub fn search_ids(&self, query: &SearchQuery) -> Result<Vec<NoteId>> {
        match self {
            SearchIndex::Sqlite(index) => index.search_ids(query),
            SearchIndex::Grep(index) => index.search_ids(query),
        }
    }

    pub fn search_count(&self, query: &SearchQuery) -> Result<usize> {
        match self {
            SearchIndex::Sqlite(index) => index.search_count(query),
            SearchIndex::Grep(index) => index.search_count(query),
        }
    }

    pub fn suggest_tags(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        match self {
            SearchIndex::Sqlite(index) => index.suggest_tags(prefix, limit),
            SearchIndex::Grep(index) => index.suggest_tags(prefix, limit),
        }
    }

    pub fn suggest_notebooks(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        match self {
            SearchIndex::Sqlite(index) => index.suggest_notebooks(prefix, limit),
            SearchIndex::Grep(index) => index.suggest_notebooks(prefix, limit),
        }
    }

    pub fn stats(&self) -> Result<IndexStats> {
        match self {
            SearchIndex::Sqlite(index) => index.stats(),
            SearchIndex::Grep(index) => index.stats(),
        }
    }

    pub fn is_healthy(&self) -> Result<bool> {
        match self {
            SearchIndex::Sqlite(index) => index.is_healthy(),
            SearchIndex::Grep(index) => index.is_healthy(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            SearchIndex::Sqlite(index) => index.validate(),
            SearchIndex::Grep(index) => index.validate(),
        }
    }

    pub fn begin_transaction(&self) -> Result<()> {
        match self {
            SearchIndex::Sqlite(index) => index.begin_transaction(),
            SearchIndex::Grep(index) => index.begin_transaction(),
        }
    }

    pub fn commit_transaction(&self) -> Result<()> {
        match self {
            SearchIndex::Sqlite(index) => index.commit_transaction(),
            SearchIndex::Grep(index) => index.commit_transaction(),
        }
    }

    pub fn rollback_transaction(&self) -> Result<()> {
        match self {
            SearchIndex::Sqlite(index) => index.rollback_transaction(),
            SearchIndex::Grep(index) => index.rollback_transaction(),
        }
    }
}
