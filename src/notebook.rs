//! Notebook management
//!
//! Notebooks are a derived dimension: one exists iff some note carries its
//! name in the `notebook` field. An otherwise-empty notebook stays visible
//! through a hidden placeholder note titled `.notebook_<name>`; placeholders
//! are excluded from user-facing counts and statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::error::{NxError, Result};
use crate::id::NoteId;
use crate::note::Note;
use crate::store::{NoteQuery, NoteStore};
use crate::time;

/// Title prefix marking a placeholder note
const PLACEHOLDER_PREFIX: &str = ".notebook_";

/// Maximum notebook name length
const MAX_NAME_LEN: usize = 100;

/// Names that may not be used as notebooks
const RESERVED_NAMES: &[&str] = &[".", "..", "tmp", "temp", "cache", "index"];

/// How many top tags to report per notebook
const TOP_TAGS_LIMIT: usize = 10;

/// Per-notebook aggregates
#[derive(Debug, Clone)]
pub struct NotebookInfo {
    pub name: String,
    /// Notes in the notebook, excluding placeholders
    pub note_count: usize,
    /// Earliest `created` across member notes
    pub created: Option<DateTime<Utc>>,
    /// Latest `updated` across member notes
    pub last_modified: Option<DateTime<Utc>>,
    /// Members modified within the last 7 days
    pub recent_notes: usize,
    /// Total content bytes
    pub total_size: usize,
    /// Tag frequency histogram
    pub tag_counts: BTreeMap<String, usize>,
    /// Top tags by frequency, then name
    pub top_tags: Vec<String>,
}

impl NotebookInfo {
    fn new(name: impl Into<String>) -> Self {
        NotebookInfo {
            name: name.into(),
            note_count: 0,
            created: None,
            last_modified: None,
            recent_notes: 0,
            total_size: 0,
            tag_counts: BTreeMap::new(),
            top_tags: Vec::new(),
        }
    }
}

/// Collection-wide statistics
#[derive(Debug, Clone, Default)]
pub struct NotebookStats {
    pub total_notebooks: usize,
    pub total_notes: usize,
    pub largest_notebook: Option<String>,
    pub most_active_notebook: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Coherent view and bulk operations over the store's notebooks
pub struct NotebookManager<'a> {
    store: &'a NoteStore,
}

impl<'a> NotebookManager<'a> {
    pub fn new(store: &'a NoteStore) -> Self {
        NotebookManager { store }
    }

    /// Create a notebook by materializing its placeholder note
    pub fn create(&self, name: &str) -> Result<()> {
        validate_name(name)?;

        if self.exists(name)? {
            return Err(NxError::Validation(format!(
                "notebook '{}' already exists",
                name
            )));
        }

        let mut placeholder = Note::create(
            format!("{}{}", PLACEHOLDER_PREFIX, name),
            format!(
                "# {}\n\nNotebook created on {}\n",
                name,
                time::to_rfc3339(time::now_millis())
            ),
        );
        placeholder.set_notebook(name);
        self.store.store(&placeholder)
    }

    /// Delete a notebook and every note in it (hard delete)
    ///
    /// Refuses when the notebook holds non-placeholder notes and `force` is
    /// off; continues past per-note failures.
    pub fn delete(&self, name: &str, force: bool) -> Result<()> {
        if !self.exists(name)? {
            return Err(NxError::not_found("notebook", name));
        }

        let ids = self.notes_in(name)?;

        let mut user_notes = 0;
        for id in &ids {
            if let Ok(note) = self.store.load(id) {
                if !is_placeholder(&note) {
                    user_notes += 1;
                }
            }
        }

        if user_notes > 0 && !force {
            return Err(NxError::Validation(format!(
                "notebook '{}' contains {} notes; use force to delete anyway or move them first",
                name, user_notes
            )));
        }

        for id in &ids {
            if let Err(e) = self.store.remove(id, false) {
                tracing::warn!(id = %id, error = %e, "failed to delete note during notebook cleanup");
            }
        }

        Ok(())
    }

    /// Rename a notebook by rewriting every member note
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        validate_name(new_name)?;

        if !self.exists(old_name)? {
            return Err(NxError::not_found("notebook", old_name));
        }
        if self.exists(new_name)? {
            return Err(NxError::Validation(format!(
                "notebook '{}' already exists",
                new_name
            )));
        }

        for id in self.notes_in(old_name)? {
            let mut note = match self.store.load(&id) {
                Ok(note) => note,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "skipping unreadable note during rename");
                    continue;
                }
            };

            note.set_notebook(new_name);
            if is_placeholder(&note) {
                note.set_title(format!("{}{}", PLACEHOLDER_PREFIX, new_name));
            }
            self.store.store(&note)?;
        }

        Ok(())
    }

    /// Sorted notebook listing, with per-notebook aggregates on request
    pub fn list(&self, include_stats: bool) -> Result<Vec<NotebookInfo>> {
        let mut infos = Vec::new();
        for name in self.store.get_all_notebooks()? {
            infos.push(self.build_info(&name, include_stats)?);
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    /// Info for one notebook
    pub fn get_info(&self, name: &str, include_stats: bool) -> Result<NotebookInfo> {
        if !self.exists(name)? {
            return Err(NxError::not_found("notebook", name));
        }
        self.build_info(name, include_stats)
    }

    /// Whether any note carries this notebook name
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.store.get_all_notebooks()?.iter().any(|n| n == name))
    }

    /// Move every note from one notebook to another, creating the target
    pub fn move_all(&self, from: &str, to: &str) -> Result<()> {
        if !self.exists(from)? {
            return Err(NxError::not_found("notebook", from));
        }
        if !self.exists(to)? {
            self.create(to)?;
        }

        for id in self.notes_in(from)? {
            let mut note = match self.store.load(&id) {
                Ok(note) => note,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "skipping unreadable note during move");
                    continue;
                }
            };
            note.set_notebook(to);
            if is_placeholder(&note) {
                note.set_title(format!("{}{}", PLACEHOLDER_PREFIX, to));
            }
            self.store.store(&note)?;
        }

        Ok(())
    }

    /// Ids of every note in a notebook (placeholders included)
    pub fn notes_in(&self, name: &str) -> Result<Vec<NoteId>> {
        let mut query = NoteQuery::new();
        query.notebook = Some(name.to_string());
        self.store.list(&query)
    }

    /// Remove notebooks that contain only placeholder notes
    ///
    /// The configured default notebook is never cleaned up. Returns how many
    /// notebooks were removed.
    pub fn cleanup_empty(&self) -> Result<usize> {
        let default_notebook = self.store.config().default_notebook.clone();
        let mut cleaned = 0;

        for name in self.store.get_all_notebooks()? {
            if name == default_notebook {
                continue;
            }

            let ids = self.notes_in(&name)?;
            let has_user_notes = ids.iter().any(|id| {
                self.store
                    .load(id)
                    .map(|note| !is_placeholder(&note))
                    .unwrap_or(false)
            });

            if !has_user_notes && self.delete(&name, true).is_ok() {
                cleaned += 1;
            }
        }

        Ok(cleaned)
    }

    /// Human-readable anomalies across all notebooks
    pub fn validate_all(&self) -> Result<Vec<String>> {
        let mut anomalies = Vec::new();

        for name in self.store.get_all_notebooks()? {
            if let Err(e) = validate_name(&name) {
                anomalies.push(format!("invalid notebook name '{}': {}", name, e));
            }

            let ids = match self.notes_in(&name) {
                Ok(ids) => ids,
                Err(e) => {
                    anomalies.push(format!("cannot list notes in notebook '{}': {}", name, e));
                    continue;
                }
            };

            if ids.is_empty() {
                anomalies.push(format!("empty notebook detected: '{}'", name));
            }

            for id in &ids {
                if let Err(e) = self.store.load(id) {
                    anomalies.push(format!(
                        "unreadable note {} in notebook '{}': {}",
                        id, name, e
                    ));
                }
            }
        }

        Ok(anomalies)
    }

    /// Collection-wide statistics
    pub fn overall_stats(&self) -> Result<NotebookStats> {
        let notebooks = self.list(true)?;
        let mut stats = NotebookStats {
            total_notebooks: notebooks.len(),
            ..NotebookStats::default()
        };

        let mut max_notes = 0;
        for notebook in &notebooks {
            stats.total_notes += notebook.note_count;

            if notebook.note_count > max_notes {
                max_notes = notebook.note_count;
                stats.largest_notebook = Some(notebook.name.clone());
            }

            if let Some(modified) = notebook.last_modified {
                if stats.last_activity.map_or(true, |latest| modified > latest) {
                    stats.last_activity = Some(modified);
                    stats.most_active_notebook = Some(notebook.name.clone());
                }
            }
        }

        Ok(stats)
    }

    fn build_info(&self, name: &str, include_stats: bool) -> Result<NotebookInfo> {
        let mut info = NotebookInfo::new(name);
        let week_ago = time::now_millis() - Duration::days(7);

        for id in self.notes_in(name)? {
            let note = match self.store.load(&id) {
                Ok(note) => note,
                Err(_) => continue,
            };
            if is_placeholder(&note) {
                continue;
            }

            info.note_count += 1;

            if !include_stats {
                continue;
            }

            let meta = note.metadata();
            if info.created.map_or(true, |earliest| meta.created() < earliest) {
                info.created = Some(meta.created());
            }
            if info
                .last_modified
                .map_or(true, |latest| meta.updated() > latest)
            {
                info.last_modified = Some(meta.updated());
            }
            if meta.updated() > week_ago {
                info.recent_notes += 1;
            }
            info.total_size += note.content().len();
            for tag in note.tags() {
                *info.tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
        }

        if include_stats {
            info.top_tags = top_tags(&info.tag_counts, TOP_TAGS_LIMIT);
        }

        Ok(info)
    }
}

/// Whether a note is a notebook placeholder
pub fn is_placeholder(note: &Note) -> bool {
    note.title().starts_with(PLACEHOLDER_PREFIX)
}

/// Check notebook naming rules
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NxError::Validation("notebook name cannot be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NxError::Validation(format!(
            "notebook name too long (max {} characters)",
            MAX_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-')
    {
        return Err(NxError::Validation(
            "notebook name may only contain letters, numbers, spaces, hyphens, and underscores"
                .into(),
        ));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(NxError::Validation(format!(
            "'{}' is a reserved notebook name",
            name
        )));
    }
    Ok(())
}

/// Top `limit` tags by count descending, name ascending
fn top_tags(tag_counts: &BTreeMap<String, usize>, limit: usize) -> Vec<String> {
    let mut pairs: Vec<(&usize, &String)> =
        tag_counts.iter().map(|(tag, count)| (count, tag)).collect();
    pairs.sort_by(|a, b| b.0.cmp(a.0).then_with(|| a.1.cmp(b.1)));
    pairs.into_iter().take(limit).map(|(_, tag)| tag.clone()).collect()
}
