//! Ripgrep-backed search fallback
//!
//! Used when the FTS backend cannot be brought up. Metadata filtering,
//! suggestions and statistics come from an in-memory cache built by walking
//! the notes directory; text search shells out to `rg` with a
//! case-insensitive, line-numbered, recursive profile.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::{NxError, Result};
use crate::id::NoteId;
use crate::note::Note;
use crate::query::SearchQuery;
use crate::store::paths;

use super::{IndexStats, SearchResult};

/// Snippet window in characters around the first match
const SNIPPET_WINDOW: usize = 160;

/// Cached per-note metadata
#[derive(Debug, Clone)]
struct NoteMeta {
    id: NoteId,
    title: String,
    path: PathBuf,
    modified: DateTime<Utc>,
    tags: Vec<String>,
    notebook: Option<String>,
    word_count: usize,
}

#[derive(Debug, Default)]
struct Cache {
    notes: HashMap<String, NoteMeta>,
    last_updated: Option<DateTime<Utc>>,
    ready: bool,
}

/// Search index over an external line-oriented grep tool
#[derive(Debug)]
pub struct GrepIndex {
    notes_dir: PathBuf,
    cache: Mutex<Cache>,
}

impl GrepIndex {
    pub fn new(notes_dir: impl Into<PathBuf>) -> Self {
        GrepIndex {
            notes_dir: notes_dir.into(),
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Whether the external tool is on the PATH
    pub fn grep_available() -> bool {
        Command::new("rg")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Probe the external tool and build the metadata cache
    pub fn initialize(&self) -> Result<()> {
        if !Self::grep_available() {
            return Err(NxError::ExternalTool(
                "ripgrep (rg) not found in PATH".into(),
            ));
        }
        let mut cache = self.lock()?;
        Self::rebuild_cache(&self.notes_dir, &mut cache)?;
        Ok(())
    }

    pub fn add(&self, note: &Note) -> Result<()> {
        let mut cache = self.lock_ready()?;
        let meta = Self::meta_from_note(&self.notes_dir, note);
        cache.notes.insert(note.id().to_string(), meta);
        cache.last_updated = Some(crate::time::now_millis());
        Ok(())
    }

    pub fn update(&self, note: &Note) -> Result<()> {
        self.add(note)
    }

    pub fn remove(&self, id: &NoteId) -> Result<()> {
        let mut cache = self.lock_ready()?;
        cache.notes.remove(id.as_str());
        cache.last_updated = Some(crate::time::now_millis());
        Ok(())
    }

    pub fn rebuild(&self) -> Result<()> {
        let mut cache = self.lock_ready()?;
        Self::rebuild_cache(&self.notes_dir, &mut cache)
    }

    /// No internal structures to compact
    pub fn optimize(&self) -> Result<()> {
        self.lock_ready().map(|_| ())
    }

    /// No space to reclaim
    pub fn vacuum(&self) -> Result<()> {
        self.lock_ready().map(|_| ())
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let cache = self.lock_ready()?;

        let candidates: Vec<&NoteMeta> = if query.text.is_empty() {
            cache.notes.values().collect()
        } else {
            let matched_paths = self.run_grep(&query.text)?;
            cache
                .notes
                .values()
                .filter(|meta| matched_paths.contains(&meta.path))
                .collect()
        };

        let mut filtered: Vec<&NoteMeta> = candidates
            .into_iter()
            .filter(|meta| matches_metadata(meta, query))
            .collect();

        filtered.sort_by(|a, b| {
            let score_a = composite_score(a, query);
            let score_b = composite_score(b, query);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let page: Vec<&NoteMeta> = {
            let iter = filtered.into_iter().skip(query.offset);
            if query.limit == 0 {
                iter.collect()
            } else {
                iter.take(query.limit).collect()
            }
        };

        let mut results = Vec::new();
        for meta in page {
            let snippet = if query.highlight && !query.text.is_empty() {
                extract_snippet(&meta.path, &query.text).unwrap_or_default()
            } else {
                String::new()
            };
            results.push(SearchResult {
                id: meta.id.clone(),
                title: meta.title.clone(),
                snippet,
                score: composite_score(meta, query),
                modified: meta.modified,
                tags: meta.tags.clone(),
                notebook: meta.notebook.clone(),
            });
        }

        Ok(results)
    }

    pub fn search_ids(&self, query: &SearchQuery) -> Result<Vec<NoteId>> {
        Ok(self.search(query)?.into_iter().map(|r| r.id).collect())
    }

    /// Cardinality of the metadata-filtered match set (unpaginated)
    pub fn search_count(&self, query: &SearchQuery) -> Result<usize> {
        let cache = self.lock_ready()?;

        let matched_paths = if query.text.is_empty() {
            None
        } else {
            Some(self.run_grep(&query.text)?)
        };

        Ok(cache
            .notes
            .values()
            .filter(|meta| {
                matched_paths
                    .as_ref()
                    .map_or(true, |paths| paths.contains(&meta.path))
            })
            .filter(|meta| matches_metadata(meta, query))
            .count())
    }

    pub fn suggest_tags(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let cache = self.lock_ready()?;
        let tags: BTreeSet<String> = cache
            .notes
            .values()
            .flat_map(|meta| meta.tags.iter())
            .filter(|tag| tag.starts_with(prefix))
            .cloned()
            .collect();
        Ok(tags.into_iter().take(limit).collect())
    }

    pub fn suggest_notebooks(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let cache = self.lock_ready()?;
        let notebooks: BTreeSet<String> = cache
            .notes
            .values()
            .filter_map(|meta| meta.notebook.as_ref())
            .filter(|notebook| notebook.starts_with(prefix))
            .cloned()
            .collect();
        Ok(notebooks.into_iter().take(limit).collect())
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let cache = self.lock_ready()?;

        let mut index_size_bytes = 0;
        for meta in cache.notes.values() {
            index_size_bytes += std::fs::metadata(&meta.path).map(|m| m.len()).unwrap_or(0);
        }

        Ok(IndexStats {
            total_notes: cache.notes.len(),
            total_words: cache.notes.values().map(|meta| meta.word_count).sum(),
            index_size_bytes,
            last_updated: cache.notes.values().map(|meta| meta.modified).max(),
            last_optimized: cache.last_updated,
        })
    }

    pub fn is_healthy(&self) -> Result<bool> {
        let cache = self.lock()?;
        Ok(cache.ready && Self::grep_available())
    }

    /// Confirm every cached file still exists on disk
    pub fn validate(&self) -> Result<()> {
        let cache = self.lock_ready()?;
        for meta in cache.notes.values() {
            if !meta.path.exists() {
                return Err(NxError::Index(format!(
                    "cached note file missing: {}",
                    meta.path.display()
                )));
            }
        }
        Ok(())
    }

    /// Transactions are no-ops for this backend
    pub fn begin_transaction(&self) -> Result<()> {
        self.lock_ready().map(|_| ())
    }

    pub fn commit_transaction(&self) -> Result<()> {
        self.lock_ready().map(|_| ())
    }

    pub fn rollback_transaction(&self) -> Result<()> {
        self.lock_ready().map(|_| ())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Cache>> {
        self.cache
            .lock()
            .map_err(|_| NxError::Index("cache mutex poisoned".into()))
    }

    /// Lock the cache, failing like `initialize` when it never came up
    fn lock_ready(&self) -> Result<MutexGuard<'_, Cache>> {
        let cache = self.lock()?;
        if !cache.ready {
            return Err(NxError::ExternalTool(
                "ripgrep (rg) not found in PATH".into(),
            ));
        }
        Ok(cache)
    }

    fn rebuild_cache(notes_dir: &Path, cache: &mut Cache) -> Result<()> {
        cache.notes.clear();

        if notes_dir.exists() {
            for entry in WalkDir::new(notes_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !paths::is_note_file(path) {
                    continue;
                }
                match std::fs::read_to_string(path)
                    .map_err(NxError::from)
                    .and_then(|content| Note::from_file_format(&content))
                {
                    Ok(note) => {
                        let meta = Self::meta_from_note(notes_dir, &note);
                        cache.notes.insert(note.id().to_string(), meta);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unparseable note");
                    }
                }
            }
        }

        cache.last_updated = Some(crate::time::now_millis());
        cache.ready = true;
        Ok(())
    }

    fn meta_from_note(notes_dir: &Path, note: &Note) -> NoteMeta {
        NoteMeta {
            id: note.id().clone(),
            title: note.title().to_string(),
            path: notes_dir.join(note.filename()),
            modified: note.metadata().updated(),
            tags: note.tags().to_vec(),
            notebook: note.notebook().map(str::to_string),
            word_count: note.content().split_whitespace().count(),
        }
    }

    /// Run the external tool and collect matching file paths
    fn run_grep(&self, text: &str) -> Result<BTreeSet<PathBuf>> {
        let output = Command::new("rg")
            .arg("--ignore-case")
            .arg("--line-number")
            .arg("--no-heading")
            .arg("--color")
            .arg("never")
            .arg(escape_pattern(text))
            .arg(&self.notes_dir)
            .output()
            .map_err(|e| NxError::ExternalTool(format!("failed to run rg: {}", e)))?;

        // Exit code 1 means no matches; anything above is a real failure
        if !output.status.success() && output.status.code() != Some(1) {
            return Err(NxError::ExternalTool(format!(
                "rg failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut paths = BTreeSet::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            if let Some((path, _rest)) = line.split_once(':') {
                paths.insert(PathBuf::from(path));
            }
        }
        Ok(paths)
    }
}

/// Escape the pattern down to fixed-string semantics
///
/// A backslash goes in front of every regex metacharacter, so the tool sees
/// a literal match even in regex mode.
fn escape_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Apply the query's metadata predicates to a cached entry
fn matches_metadata(meta: &NoteMeta, query: &SearchQuery) -> bool {
    if !query.tags.iter().all(|tag| meta.tags.contains(tag)) {
        return false;
    }
    if let Some(notebook) = &query.notebook {
        if meta.notebook.as_deref() != Some(notebook.as_str()) {
            return false;
        }
    }
    if let Some(since) = query.since {
        if meta.modified < since {
            return false;
        }
    }
    if let Some(until) = query.until {
        if meta.modified >= until {
            return false;
        }
    }
    true
}

/// Composite relevance: `0.5·tag_overlap + 0.3·recency + 0.2·notebook`
fn composite_score(meta: &NoteMeta, query: &SearchQuery) -> f64 {
    let tag_overlap = if query.tags.is_empty() {
        1.0
    } else {
        let shared = query
            .tags
            .iter()
            .filter(|tag| meta.tags.contains(*tag))
            .count();
        shared as f64 / query.tags.len() as f64
    };

    let age_days = (crate::time::now_millis() - meta.modified).num_days().max(0) as f64;
    let recency = 1.0 / (1.0 + age_days / 7.0);

    let notebook_match = match &query.notebook {
        Some(notebook) => {
            if meta.notebook.as_deref() == Some(notebook.as_str()) {
                1.0
            } else {
                0.0
            }
        }
        None => 1.0,
    };

    (0.5 * tag_overlap + 0.3 * recency + 0.2 * notebook_match).clamp(0.0, 1.0)
}

/// Read the first matching line and pad a fixed window around the match
fn extract_snippet(path: &Path, text: &str) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let needle = text.to_lowercase();

    let line = content
        .lines()
        .find(|line| line.to_lowercase().contains(&needle))?;

    let start = line.to_lowercase().find(&needle)?;
    let end = start + text.len();

    let window_start = start.saturating_sub(SNIPPET_WINDOW / 2);
    let window_end = (end + SNIPPET_WINDOW / 2).min(line.len());
    let window_start = floor_char_boundary(line, window_start);
    let window_end = ceil_char_boundary(line, window_end);

    let mut snippet = String::new();
    if window_start > 0 {
        snippet.push_str("...");
    }
    snippet.push_str(&line[window_start..start]);
    snippet.push_str("<mark>");
    snippet.push_str(&line[start..end]);
    snippet.push_str("</mark>");
    snippet.push_str(&line[end..window_end]);
    if window_end < line.len() {
        snippet.push_str("...");
    }
    Some(snippet)
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;
    use crate::store::NoteStore;
    use tempfile::tempdir;

    fn seeded_store(dir: &Path) -> NoteStore {
        let store = NoteStore::open(dir).unwrap();

        let mut a = Note::create("Alpha", "Content about programming in Rust");
        a.set_tags(vec!["programming".into(), "rust".into()]);
        a.set_notebook("learning");
        let b = Note::create("Beta", "Notes about cooking pasta");
        store.store(&a).unwrap();
        store.store(&b).unwrap();
        store
    }

    #[test]
    fn test_unavailable_tool_reports_external_tool_error() {
        // Simulate the unavailable state directly: a cache that never
        // became ready behaves like a failed initialize
        let dir = tempdir().unwrap();
        let index = GrepIndex::new(dir.path().join("notes"));

        let err = index.search(&SearchQuery::new()).unwrap_err();
        assert_eq!(err.kind(), "external_tool_error");
        let err = index.stats().unwrap_err();
        assert_eq!(err.kind(), "external_tool_error");
    }

    #[test]
    fn test_escape_pattern() {
        assert_eq!(escape_pattern("plain words"), "plain words");
        assert_eq!(escape_pattern("c++"), "c\\+\\+");
        assert_eq!(escape_pattern("a.b(c)"), "a\\.b\\(c\\)");
    }

    #[test]
    fn test_metadata_search_with_empty_text() {
        if !GrepIndex::grep_available() {
            return;
        }

        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path());
        let index = GrepIndex::new(store.notes_dir());
        index.initialize().unwrap();

        // Empty text: count equals the metadata-filtered subset
        assert_eq!(index.search_count(&SearchQuery::new()).unwrap(), 2);

        let query = QueryBuilder::new().tag("programming").build();
        assert_eq!(index.search_count(&query).unwrap(), 1);

        let query = QueryBuilder::new().notebook("learning").build();
        let results = index.search(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Alpha");
        assert!(results[0].score > 0.0 && results[0].score <= 1.0);
    }

    #[test]
    fn test_text_search_and_snippet() {
        if !GrepIndex::grep_available() {
            return;
        }

        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path());
        let index = GrepIndex::new(store.notes_dir());
        index.initialize().unwrap();

        let query = QueryBuilder::new().text("programming").build();
        let results = index.search(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Alpha");
        assert!(results[0].snippet.contains("<mark>programming</mark>"));

        let query = QueryBuilder::new().text("absent-term-xyz").build();
        assert!(index.search(&query).unwrap().is_empty());
    }

    #[test]
    fn test_incremental_updates() {
        if !GrepIndex::grep_available() {
            return;
        }

        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path());
        let index = GrepIndex::new(store.notes_dir());
        index.initialize().unwrap();

        let fresh = Note::create("Gamma", "entirely new words");
        store.store(&fresh).unwrap();
        index.add(&fresh).unwrap();
        assert_eq!(index.search_count(&SearchQuery::new()).unwrap(), 3);

        index.remove(fresh.id()).unwrap();
        assert_eq!(index.search_count(&SearchQuery::new()).unwrap(), 2);
    }

    #[test]
    fn test_suggestions_and_stats() {
        if !GrepIndex::grep_available() {
            return;
        }

        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path());
        let index = GrepIndex::new(store.notes_dir());
        index.initialize().unwrap();

        assert_eq!(index.suggest_tags("pro", 10).unwrap(), ["programming"]);
        assert_eq!(
            index.suggest_notebooks("lea", 10).unwrap(),
            ["learning"]
        );

        let stats = index.stats().unwrap();
        assert_eq!(stats.total_notes, 2);
        assert!(stats.total_words > 0);
        assert!(stats.index_size_bytes > 0);

        assert!(index.is_healthy().unwrap());
        index.validate().unwrap();
    }

    #[test]
    fn test_transactions_are_noops() {
        if !GrepIndex::grep_available() {
            return;
        }

        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path());
        let index = GrepIndex::new(store.notes_dir());
        index.initialize().unwrap();

        index.begin_transaction().unwrap();
        index.commit_transaction().unwrap();
        index.begin_transaction().unwrap();
        index.rollback_transaction().unwrap();
    }
}
