//! Metadata-level note queries
//!
//! `NoteQuery` is the filter subset the store evaluates itself, without any
//! index: exact notebook, all-of tags, a closed-open time range on
//! `updated`, and substring filters on title and content.

use chrono::{DateTime, Utc};

use crate::note::Note;

/// Sort key for store queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    Created,
    #[default]
    Updated,
    Title,
}

/// Sort direction for store queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Filter and sorting options for note listing
#[derive(Debug, Clone, Default)]
pub struct NoteQuery {
    /// Exact notebook match
    pub notebook: Option<String>,
    /// All of these tags must be present
    pub tags: Vec<String>,
    /// Closed lower bound on `updated`
    pub since: Option<DateTime<Utc>>,
    /// Open upper bound on `updated`
    pub until: Option<DateTime<Utc>>,
    /// Case-insensitive substring on the title
    pub title_contains: Option<String>,
    /// Case-insensitive substring on the content
    pub content_contains: Option<String>,
    /// Maximum results; 0 means no limit
    pub limit: usize,
    /// Pagination offset
    pub offset: usize,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl NoteQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a note passes every configured filter
    pub fn matches(&self, note: &Note) -> bool {
        let meta = note.metadata();

        if let Some(notebook) = &self.notebook {
            if meta.notebook() != Some(notebook.as_str()) {
                return false;
            }
        }

        if !self.tags.iter().all(|tag| meta.has_tag(tag)) {
            return false;
        }

        if let Some(since) = self.since {
            if meta.updated() < since {
                return false;
            }
        }

        if let Some(until) = self.until {
            if meta.updated() >= until {
                return false;
            }
        }

        if let Some(needle) = &self.title_contains {
            if !meta.title().to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }

        if let Some(needle) = &self.content_contains {
            if !note.contains_text(needle, false) {
                return false;
            }
        }

        true
    }

    /// Sort notes in place according to `sort_by` / `sort_order`
    pub fn sort(&self, notes: &mut [Note]) {
        notes.sort_by(|a, b| {
            let ordering = match self.sort_by {
                SortBy::Created => a.metadata().created().cmp(&b.metadata().created()),
                SortBy::Updated => a.metadata().updated().cmp(&b.metadata().updated()),
                SortBy::Title => a.title().cmp(b.title()),
            }
            // Stable tie-break so pagination is deterministic
            .then_with(|| a.id().cmp(b.id()));

            match self.sort_order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
    }

    /// Apply `offset` and `limit` to a sorted result set
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        if self.limit == 0 {
            iter.collect()
        } else {
            iter.take(self.limit).collect()
        }
    }
}
