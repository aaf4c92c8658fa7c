//! SQLite FTS5 search backend
//!
//! A `notes` table carries metadata plus derived counters; the companion
//! `notes_fts` virtual table carries the searchable text. BM25 ranking is
//! inverted and clamped into `[0, 1]`. All operations serialize on a single
//! mutex around the connection; bulk writers should wrap their calls in an
//! explicit transaction.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};

use crate::error::{NxError, Result};
use crate::id::NoteId;
use crate::note::Note;
use crate::query::SearchQuery;

use super::{IndexStats, SearchResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS notes (
  id TEXT PRIMARY KEY,
  title TEXT NOT NULL,
  created INTEGER NOT NULL,
  modified INTEGER NOT NULL,
  tags TEXT,  -- JSON array
  notebook TEXT,
  content_length INTEGER DEFAULT 0,
  word_count INTEGER DEFAULT 0
);

CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
  id UNINDEXED,
  title,
  content,
  tags,
  notebook
);

CREATE INDEX IF NOT EXISTS idx_notes_created ON notes(created);
CREATE INDEX IF NOT EXISTS idx_notes_modified ON notes(modified);
CREATE INDEX IF NOT EXISTS idx_notes_notebook ON notes(notebook);
"#;

#[derive(Debug, Default)]
struct Inner {
    conn: Option<Connection>,
    in_transaction: bool,
    last_optimized: Option<DateTime<Utc>>,
}

/// FTS5-backed search index
#[derive(Debug)]
pub struct SqliteIndex {
    db_path: PathBuf,
    inner: Mutex<Inner>,
}

impl SqliteIndex {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        SqliteIndex {
            db_path: db_path.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Open the database and create persistent state if missing (idempotent)
    pub fn initialize(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.conn.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| NxError::DirectoryCreate {
                    path: parent.to_path_buf(),
                    reason: e.to_string(),
                })?;
            }
        }

        let conn = Connection::open(&self.db_path).map_err(|e| {
            NxError::Database(format!(
                "failed to open index at {}: {}",
                self.db_path.display(),
                e
            ))
        })?;

        // Performance profile; equivalents are acceptable, these match the
        // database's suggested settings
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", -64000)?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "mmap_size", 268_435_456)?;

        // Probe FTS5 before committing to this backend
        conn.prepare("CREATE VIRTUAL TABLE fts5_probe USING fts5(content)")
            .map_err(|_| NxError::Database("FTS5 extension not available".into()))?;

        conn.execute_batch(SCHEMA)?;

        inner.conn = Some(conn);
        Ok(())
    }

    pub fn add(&self, note: &Note) -> Result<()> {
        let inner = self.lock()?;
        let conn = Self::conn(&inner)?;
        Self::upsert(conn, note)
    }

    pub fn update(&self, note: &Note) -> Result<()> {
        // FTS5 rows are cleared and re-inserted either way
        self.add(note)
    }

    pub fn remove(&self, id: &NoteId) -> Result<()> {
        let inner = self.lock()?;
        let conn = Self::conn(&inner)?;
        conn.prepare_cached("DELETE FROM notes WHERE id = ?1")?
            .execute([id.as_str()])?;
        conn.prepare_cached("DELETE FROM notes_fts WHERE id = ?1")?
            .execute([id.as_str()])?;
        Ok(())
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let inner = self.lock()?;
        let conn = Self::conn(&inner)?;

        let Some(fts_query) = build_fts_query(query) else {
            return Ok(Vec::new());
        };

        let limit = if query.limit == 0 {
            -1
        } else {
            query.limit as i64
        };
        let since = query.since.map(|dt| dt.timestamp_millis());
        let until = query.until.map(|dt| dt.timestamp_millis());

        let mut stmt = conn.prepare_cached(
            r#"
            SELECT notes_fts.id, notes_fts.title,
                   snippet(notes_fts, 2, '<mark>', '</mark>', '...', 32),
                   bm25(notes_fts),
                   n.modified, n.tags, n.notebook
            FROM notes_fts
            JOIN notes n ON n.id = notes_fts.id
            WHERE notes_fts MATCH ?1
              AND (?4 IS NULL OR n.modified >= ?4)
              AND (?5 IS NULL OR n.modified < ?5)
            ORDER BY bm25(notes_fts)
            LIMIT ?2 OFFSET ?3
            "#,
        )?;

        let rows = stmt.query_map(
            params![fts_query, limit, query.offset as i64, since, until],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            let (id_str, title, snippet, bm25, modified_ms, tags_json, notebook) = row?;

            let id: NoteId = match id_str.parse() {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(id = %id_str, error = %e, "skipping result with invalid id");
                    continue;
                }
            };

            let tags: Vec<String> = tags_json
                .as_deref()
                .and_then(|json| serde_json::from_str(json).ok())
                .unwrap_or_default();

            results.push(SearchResult {
                id,
                title,
                snippet: if query.highlight { snippet } else { String::new() },
                score: (-bm25 / 10.0).clamp(0.0, 1.0),
                modified: Utc
                    .timestamp_millis_opt(modified_ms)
                    .single()
                    .unwrap_or_default(),
                tags,
                notebook,
            });
        }

        Ok(results)
    }

    pub fn search_ids(&self, query: &SearchQuery) -> Result<Vec<NoteId>> {
        Ok(self.search(query)?.into_iter().map(|r| r.id).collect())
    }

    pub fn search_count(&self, query: &SearchQuery) -> Result<usize> {
        let inner = self.lock()?;
        let conn = Self::conn(&inner)?;

        let Some(fts_query) = build_fts_query(query) else {
            return Ok(0);
        };
        let since = query.since.map(|dt| dt.timestamp_millis());
        let until = query.until.map(|dt| dt.timestamp_millis());

        let count: i64 = conn
            .prepare_cached(
                r#"
                SELECT COUNT(*)
                FROM notes_fts
                JOIN notes n ON n.id = notes_fts.id
                WHERE notes_fts MATCH ?1
                  AND (?2 IS NULL OR n.modified >= ?2)
                  AND (?3 IS NULL OR n.modified < ?3)
                "#,
            )?
            .query_row(params![fts_query, since, until], |row| row.get(0))?;

        Ok(count as usize)
    }

    pub fn suggest_tags(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let inner = self.lock()?;
        let conn = Self::conn(&inner)?;

        let mut stmt = conn.prepare_cached(
            r#"
            SELECT DISTINCT value AS tag
            FROM notes, json_each(notes.tags)
            WHERE value LIKE ?1 || '%'
            ORDER BY tag
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![prefix, limit as i64], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(NxError::from)
    }

    pub fn suggest_notebooks(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let inner = self.lock()?;
        let conn = Self::conn(&inner)?;

        let mut stmt = conn.prepare_cached(
            r#"
            SELECT DISTINCT notebook
            FROM notes
            WHERE notebook IS NOT NULL AND notebook LIKE ?1 || '%'
            ORDER BY notebook
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![prefix, limit as i64], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(NxError::from)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let inner = self.lock()?;
        let conn = Self::conn(&inner)?;

        let (total_notes, total_words, last_updated_ms): (i64, i64, Option<i64>) = conn
            .prepare_cached(
                "SELECT COUNT(*), COALESCE(SUM(word_count), 0), MAX(modified) FROM notes",
            )?
            .query_row([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;

        Ok(IndexStats {
            total_notes: total_notes as usize,
            total_words: total_words as usize,
            index_size_bytes: fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0),
            last_updated: last_updated_ms
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            last_optimized: inner.last_optimized,
        })
    }

    pub fn is_healthy(&self) -> Result<bool> {
        let inner = self.lock()?;
        let Some(conn) = inner.conn.as_ref() else {
            return Ok(false);
        };
        Ok(conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok())
    }

    pub fn validate(&self) -> Result<()> {
        let inner = self.lock()?;
        let conn = Self::conn(&inner)?;

        let check: String =
            conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if check != "ok" {
            return Err(NxError::Database(format!(
                "integrity check failed: {}",
                check
            )));
        }
        Ok(())
    }

    pub fn rebuild(&self) -> Result<()> {
        let inner = self.lock()?;
        let conn = Self::conn(&inner)?;
        conn.execute("INSERT INTO notes_fts(notes_fts) VALUES('rebuild')", [])?;
        Ok(())
    }

    pub fn optimize(&self) -> Result<()> {
        let mut inner = self.lock()?;
        let conn = Self::conn(&inner)?;
        conn.execute("INSERT INTO notes_fts(notes_fts) VALUES('optimize')", [])?;
        conn.execute("VACUUM", [])?;
        inner.last_optimized = Some(crate::time::now_millis());
        Ok(())
    }

    pub fn vacuum(&self) -> Result<()> {
        let inner = self.lock()?;
        let conn = Self::conn(&inner)?;
        conn.execute("VACUUM", [])?;
        Ok(())
    }

    pub fn begin_transaction(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.in_transaction {
            return Err(NxError::Database("transaction already active".into()));
        }
        Self::conn(&inner)?.execute_batch("BEGIN IMMEDIATE")?;
        inner.in_transaction = true;
        Ok(())
    }

    pub fn commit_transaction(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.in_transaction {
            return Err(NxError::Database("no active transaction".into()));
        }
        Self::conn(&inner)?.execute_batch("COMMIT")?;
        inner.in_transaction = false;
        Ok(())
    }

    pub fn rollback_transaction(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.in_transaction {
            return Err(NxError::Database("no active transaction".into()));
        }
        Self::conn(&inner)?.execute_batch("ROLLBACK")?;
        inner.in_transaction = false;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| NxError::Database("index mutex poisoned".into()))
    }

    fn conn<'a>(inner: &'a MutexGuard<'_, Inner>) -> Result<&'a Connection> {
        inner
            .conn
            .as_ref()
            .ok_or_else(|| NxError::Database("index not initialized".into()))
    }

    fn upsert(conn: &Connection, note: &Note) -> Result<()> {
        let meta = note.metadata();
        let tags_json = serde_json::to_string(meta.tags())?;
        let word_count = note.content().split_whitespace().count() as i64;

        conn.prepare_cached(
            r#"
            INSERT OR REPLACE INTO notes
              (id, title, created, modified, tags, notebook, content_length, word_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?
        .execute(params![
            meta.id().as_str(),
            meta.title(),
            meta.created().timestamp_millis(),
            meta.updated().timestamp_millis(),
            tags_json,
            meta.notebook(),
            note.content().len() as i64,
            word_count,
        ])?;

        // FTS5 needs an explicit delete; REPLACE leaves duplicate rows
        conn.prepare_cached("DELETE FROM notes_fts WHERE id = ?1")?
            .execute([meta.id().as_str()])?;
        conn.prepare_cached(
            "INSERT INTO notes_fts (id, title, content, tags, notebook) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?
        .execute(params![
            meta.id().as_str(),
            meta.title(),
            note.content(),
            tags_json,
            meta.notebook(),
        ])?;

        Ok(())
    }
}

/// Compose the FTS expression: free text ANDed with tag and notebook terms
///
/// Empty free text short-circuits the whole search.
fn build_fts_query(query: &SearchQuery) -> Option<String> {
    if query.text.is_empty() {
        return None;
    }

    let mut fts_query = query.text.clone();
    for tag in &query.tags {
        fts_query.push_str(&format!(" AND tags:\"{}\"", tag));
    }
    if let Some(notebook) = &query.notebook {
        fts_query.push_str(&format!(" AND notebook:\"{}\"", notebook));
    }
    Some(fts_query)
}
