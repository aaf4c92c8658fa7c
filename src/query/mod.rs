//! Structured search queries
//!
//! `SearchQuery` is the form both index backends consume; `QueryParser`
//! (see [`parse`]) turns the free-text surface language into one, and
//! `QueryBuilder` constructs one programmatically.

pub mod parse;

use chrono::{DateTime, Utc};

pub use parse::QueryParser;

/// Search query configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Free-text query; evaluation is backend-specific
    pub text: String,
    /// Every listed tag must be present
    pub tags: Vec<String>,
    /// Exact notebook match
    pub notebook: Option<String>,
    /// Closed lower bound on modified time
    pub since: Option<DateTime<Utc>>,
    /// Open upper bound on modified time
    pub until: Option<DateTime<Utc>>,
    /// Max results; 0 means no limit
    pub limit: usize,
    /// Pagination offset
    pub offset: usize,
    /// Whether snippets should be produced
    pub highlight: bool,
}

impl Default for SearchQuery {
    fn default() -> Self {
        SearchQuery {
            text: String::new(),
            tags: Vec::new(),
            notebook: None,
            since: None,
            until: None,
            limit: 50,
            offset: 0,
            highlight: true,
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Chainable builder over every `SearchQuery` field
///
/// Excluded tags accumulate separately and materialize as `-tags:"…"`
/// terms in the final text at `build()`.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: SearchQuery,
    exclude_tags: Vec<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.query.text = text.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.query.tags.push(tag.into());
        self
    }

    pub fn exclude_tag(mut self, tag: impl Into<String>) -> Self {
        self.exclude_tags.push(tag.into());
        self
    }

    pub fn notebook(mut self, notebook: impl Into<String>) -> Self {
        self.query.notebook = Some(notebook.into());
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        if !self.query.text.is_empty() {
            self.query.text.push(' ');
        }
        self.query.text.push_str(&format!("title:\"{}\"", title));
        self
    }

    pub fn created_after(mut self, date: DateTime<Utc>) -> Self {
        self.query.since = Some(date);
        self
    }

    pub fn created_before(mut self, date: DateTime<Utc>) -> Self {
        self.query.until = Some(date);
        self
    }

    pub fn modified_after(mut self, date: DateTime<Utc>) -> Self {
        self.query.since = Some(date);
        self
    }

    pub fn modified_before(mut self, date: DateTime<Utc>) -> Self {
        self.query.until = Some(date);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = offset;
        self
    }

    pub fn highlight(mut self, enable: bool) -> Self {
        self.query.highlight = enable;
        self
    }

    pub fn build(self) -> SearchQuery {
        let mut query = self.query;
        for tag in &self.exclude_tags {
            if !query.text.is_empty() {
                query.text.push(' ');
            }
            query.text.push_str(&format!("-tags:\"{}\"", tag));
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let query = SearchQuery::new();
        assert!(query.text.is_empty());
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 0);
        assert!(query.highlight);
    }

    #[test]
    fn test_builder_chains() {
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let query = QueryBuilder::new()
            .text("rust")
            .tag("programming")
            .notebook("learning")
            .modified_after(since)
            .limit(10)
            .offset(5)
            .highlight(false)
            .build();

        assert_eq!(query.text, "rust");
        assert_eq!(query.tags, ["programming"]);
        assert_eq!(query.notebook.as_deref(), Some("learning"));
        assert_eq!(query.since, Some(since));
        assert_eq!(query.limit, 10);
        assert_eq!(query.offset, 5);
        assert!(!query.highlight);
    }

    #[test]
    fn test_builder_exclude_tags_suffix_text() {
        let query = QueryBuilder::new()
            .text("search terms")
            .exclude_tag("draft")
            .exclude_tag("archived")
            .build();
        assert_eq!(
            query.text,
            "search terms -tags:\"draft\" -tags:\"archived\""
        );
    }

    #[test]
    fn test_builder_title_appends() {
        let query = QueryBuilder::new().text("word").title("Exact Title").build();
        assert_eq!(query.text, "word title:\"Exact Title\"");
    }
}
