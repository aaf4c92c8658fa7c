//! Filesystem-backed note store
//!
//! The store is the sole authority over the on-disk corpus. Layout under a
//! root directory:
//!
//! - `notes/` — live notes, one `<id>-<slug>.md` file each
//! - `trash/` — soft-deleted notes, same format
//! - `attachments/` — attachment files, keyed by their own ids
//!
//! Every mutation is atomic (temp file + fsync + rename) and reported to a
//! single change callback after commit, which is how the search index stays
//! current.

mod io;
pub mod paths;
pub mod query;

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::config::StoreConfig;
use crate::crypto::NoteCipher;
use crate::error::{NxError, Result};
use crate::id::NoteId;
use crate::note::Note;

pub use query::{NoteQuery, SortBy, SortOrder};

/// Operation tag passed to the change callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Put,
    Delete,
    Restore,
    Purge,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOp::Put => "put",
            ChangeOp::Delete => "delete",
            ChangeOp::Restore => "restore",
            ChangeOp::Purge => "purge",
        }
    }
}

/// Callback invoked synchronously after each successful mutation
pub type ChangeCallback = Box<dyn Fn(&NoteId, ChangeOp)>;

/// One fuzzy id-prefix match
#[derive(Debug, Clone)]
pub struct FuzzyMatch {
    pub id: NoteId,
    /// Title when the note parses, filename slug otherwise
    pub display_text: String,
    /// 1.0 for an exact id, decaying with prefix shortness
    pub score: f64,
}

/// Aggregate outcome of a batch operation
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<NoteId>,
    pub failed: Vec<(NoteId, String)>,
}

/// The nx note store
pub struct NoteStore {
    root: PathBuf,
    config: StoreConfig,
    cipher: Option<Box<dyn NoteCipher>>,
    change_callback: Option<ChangeCallback>,
}

impl fmt::Debug for NoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteStore")
            .field("root", &self.root)
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}

impl NoteStore {
    /// Open a store at `root`, creating the layout if missing
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        io::ensure_layout(&root)?;

        let config_path = root.join(paths::CONFIG_FILE);
        let config = if config_path.exists() {
            StoreConfig::load(&config_path)?
        } else {
            StoreConfig::default()
        };

        Ok(NoteStore {
            root,
            config,
            cipher: None,
            change_callback: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn notes_dir(&self) -> PathBuf {
        self.root.join(paths::NOTES_DIR)
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.root.join(paths::TRASH_DIR)
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.root.join(paths::ATTACHMENTS_DIR)
    }

    /// Install the content cipher used for encryption at rest
    pub fn set_cipher(&mut self, cipher: Box<dyn NoteCipher>) {
        self.cipher = Some(cipher);
    }

    /// Install the single change callback
    ///
    /// Invoked synchronously after each successful mutation, exactly once
    /// per mutation, in program order on the calling thread.
    pub fn set_change_callback(&mut self, callback: ChangeCallback) {
        self.change_callback = Some(callback);
    }

    // --- CRUD -----------------------------------------------------------

    /// Validate and persist a note atomically
    ///
    /// A pre-existing file for the same id under a different slug is
    /// unlinked after the new file is in place.
    pub fn store(&self, note: &Note) -> Result<()> {
        note.validate()?;

        let target = self.notes_dir().join(note.filename());
        let previous = self.find_live_path(note.id());

        let mut payload = note.to_file_format()?;
        if let Some(cipher) = &self.cipher {
            payload = cipher.encrypt(note.id(), &payload)?;
        }

        io::atomic_write(&target, &payload)?;

        if let Some(old) = previous {
            if old != target {
                if let Err(e) = fs::remove_file(&old) {
                    tracing::warn!(path = %old.display(), error = %e, "failed to remove stale note file");
                }
            }
        }

        self.emit(note.id(), ChangeOp::Put);
        Ok(())
    }

    /// Load a live note by id
    pub fn load(&self, id: &NoteId) -> Result<Note> {
        let path = self
            .find_live_path(id)
            .ok_or_else(|| NxError::not_found("note", id))?;
        self.load_from_path(id, &path)
    }

    /// Remove a live note; `soft_delete` moves it to the trash
    ///
    /// An id that is only in the trash is `not_found` here.
    pub fn remove(&self, id: &NoteId, soft_delete: bool) -> Result<()> {
        let path = self
            .find_live_path(id)
            .ok_or_else(|| NxError::not_found("note", id))?;

        if soft_delete {
            let file_name = path
                .file_name()
                .ok_or_else(|| NxError::File(format!("bad note path: {}", path.display())))?;
            let target = self.trash_dir().join(file_name);
            fs::rename(&path, &target).map_err(|e| NxError::file_write(&target, e))?;
        } else {
            fs::remove_file(&path).map_err(|e| NxError::file_write(&path, e))?;
        }

        self.emit(id, ChangeOp::Delete);
        Ok(())
    }

    /// Check the live region for an id
    pub fn exists(&self, id: &NoteId) -> bool {
        self.find_live_path(id).is_some()
    }

    // --- Batch ----------------------------------------------------------

    /// Store several notes, continuing past individual failures
    pub fn store_batch(&self, notes: &[Note]) -> BatchReport {
        let mut report = BatchReport::default();
        for note in notes {
            match self.store(note) {
                Ok(()) => report.succeeded.push(note.id().clone()),
                Err(e) => report.failed.push((note.id().clone(), e.to_string())),
            }
        }
        report
    }

    /// Load several notes, continuing past individual failures
    pub fn load_batch(&self, ids: &[NoteId]) -> (Vec<Note>, BatchReport) {
        let mut notes = Vec::new();
        let mut report = BatchReport::default();
        for id in ids {
            match self.load(id) {
                Ok(note) => {
                    report.succeeded.push(id.clone());
                    notes.push(note);
                }
                Err(e) => report.failed.push((id.clone(), e.to_string())),
            }
        }
        (notes, report)
    }

    // --- Query ----------------------------------------------------------

    /// List live note ids matching a query
    pub fn list(&self, query: &NoteQuery) -> Result<Vec<NoteId>> {
        Ok(self
            .search(query)?
            .into_iter()
            .map(|note| note.id().clone())
            .collect())
    }

    /// List live notes matching a query, hydrated
    pub fn search(&self, query: &NoteQuery) -> Result<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .scan_live()?
            .into_iter()
            .filter(|note| query.matches(note))
            .collect();
        query.sort(&mut notes);
        Ok(query.paginate(notes))
    }

    /// Count live notes matching a query (ignores pagination)
    pub fn count(&self, query: &NoteQuery) -> Result<usize> {
        Ok(self
            .scan_live()?
            .iter()
            .filter(|note| query.matches(note))
            .count())
    }

    // --- Fuzzy resolution ----------------------------------------------

    /// Resolve an id prefix to up to `max_results` live notes
    ///
    /// Score is 1.0 for an exact id and `0.5 + 0.5 * len/26` otherwise;
    /// results order by score descending then id ascending.
    pub fn fuzzy_resolve(&self, prefix: &str, max_results: usize) -> Result<Vec<FuzzyMatch>> {
        let mut matches = Vec::new();

        for path in self.note_files(&self.notes_dir()) {
            let Some(id_str) = paths::id_from_filename(&path) else {
                continue;
            };
            if !id_str.starts_with(prefix) {
                continue;
            }

            let id: NoteId = id_str.parse()?;
            let display_text = match self.load_from_path(&id, &path) {
                Ok(note) => note.title().to_string(),
                Err(_) => paths::slug_from_filename(&path).unwrap_or_default(),
            };
            let score = if prefix == id.as_str() {
                1.0
            } else {
                0.5 + 0.5 * (prefix.len() as f64 / NoteId::LENGTH as f64)
            };

            matches.push(FuzzyMatch {
                id,
                display_text,
                score,
            });
        }

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(max_results);
        Ok(matches)
    }

    /// Resolve a prefix to exactly one note
    pub fn resolve_single(&self, prefix: &str) -> Result<NoteId> {
        let mut matches = self.fuzzy_resolve(prefix, 2)?;
        match matches.len() {
            0 => Err(NxError::not_found("note", prefix)),
            1 => Ok(matches.remove(0).id),
            _ => Err(NxError::Validation(format!(
                "ambiguous note id prefix: {}",
                prefix
            ))),
        }
    }

    // --- Metadata enumeration ------------------------------------------

    /// Distinct tags across live notes, sorted
    pub fn get_all_tags(&self) -> Result<Vec<String>> {
        let mut tags = BTreeSet::new();
        for note in self.scan_live()? {
            tags.extend(note.tags().iter().cloned());
        }
        Ok(tags.into_iter().collect())
    }

    /// Distinct notebooks across live notes, sorted
    pub fn get_all_notebooks(&self) -> Result<Vec<String>> {
        let mut notebooks = BTreeSet::new();
        for note in self.scan_live()? {
            if let Some(notebook) = note.notebook() {
                notebooks.insert(notebook.to_string());
            }
        }
        Ok(notebooks.into_iter().collect())
    }

    /// Live notes whose `metadata.links` contain `id`
    pub fn get_backlinks(&self, id: &NoteId) -> Result<Vec<Note>> {
        Ok(self
            .scan_live()?
            .into_iter()
            .filter(|note| note.metadata().has_link(id))
            .collect())
    }

    // --- Trash ----------------------------------------------------------

    /// Ids currently in the trash
    pub fn list_trashed(&self) -> Result<Vec<NoteId>> {
        let mut ids = Vec::new();
        for path in self.note_files(&self.trash_dir()) {
            if let Some(id_str) = paths::id_from_filename(&path) {
                ids.push(id_str.parse()?);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Move a trashed note back to the live region
    pub fn restore(&self, id: &NoteId) -> Result<()> {
        let path = self
            .find_path_in(&self.trash_dir(), id)
            .ok_or_else(|| NxError::not_found("trashed note", id))?;

        if self.exists(id) {
            return Err(NxError::Validation(format!(
                "cannot restore {}: a live note with this id exists",
                id
            )));
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| NxError::File(format!("bad trash path: {}", path.display())))?;
        let target = self.notes_dir().join(file_name);
        fs::rename(&path, &target).map_err(|e| NxError::file_write(&target, e))?;

        self.emit(id, ChangeOp::Restore);
        Ok(())
    }

    /// Unlink a trashed note for good
    pub fn permanently_delete(&self, id: &NoteId) -> Result<()> {
        let path = self
            .find_path_in(&self.trash_dir(), id)
            .ok_or_else(|| NxError::not_found("trashed note", id))?;
        fs::remove_file(&path).map_err(|e| NxError::file_write(&path, e))?;

        self.emit(id, ChangeOp::Purge);
        Ok(())
    }

    /// Purge every trashed note
    pub fn empty_trash(&self) -> Result<usize> {
        let ids = self.list_trashed()?;
        let mut purged = 0;
        for id in ids {
            self.permanently_delete(&id)?;
            purged += 1;
        }
        Ok(purged)
    }

    // --- Statistics -----------------------------------------------------

    /// Number of live notes
    pub fn total_notes(&self) -> Result<usize> {
        Ok(self.note_files(&self.notes_dir()).len())
    }

    /// Total size in bytes of live note files
    pub fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        for path in self.note_files(&self.notes_dir()) {
            total += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        }
        Ok(total)
    }

    /// Most recent modification time across live note files
    pub fn last_modified(&self) -> Result<Option<DateTime<Utc>>> {
        let mut latest: Option<DateTime<Utc>> = None;
        for path in self.note_files(&self.notes_dir()) {
            if let Ok(modified) = fs::metadata(&path).and_then(|m| m.modified()) {
                let modified: DateTime<Utc> = modified.into();
                if latest.map_or(true, |current| modified > current) {
                    latest = Some(modified);
                }
            }
        }
        Ok(latest)
    }

    // --- Maintenance ----------------------------------------------------

    /// Rewrite every live note in canonical form
    ///
    /// Repairs stale slugs and re-serializes old field layouts; each
    /// rewrite emits a `put` event so indexers follow along.
    #[tracing::instrument(skip(self))]
    pub fn rebuild(&self) -> Result<usize> {
        let mut rebuilt = 0;
        for path in self.note_files(&self.notes_dir()) {
            let Some(id_str) = paths::id_from_filename(&path) else {
                continue;
            };
            let id: NoteId = id_str.parse()?;
            match self.load_from_path(&id, &path) {
                Ok(note) => {
                    self.store(&note)?;
                    rebuilt += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unparseable note during rebuild");
                }
            }
        }
        Ok(rebuilt)
    }

    /// Remove temp files left behind by interrupted writes
    pub fn vacuum(&self) -> Result<usize> {
        let mut removed = 0;
        for dir in [self.notes_dir(), self.trash_dir()] {
            for entry in WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let name = entry.file_name().to_string_lossy();
                if name.starts_with(".tmp") && entry.file_type().is_file() {
                    if fs::remove_file(entry.path()).is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }

    /// Re-read every live note and report invariant violations
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut violations = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for path in self.note_files(&self.notes_dir()) {
            let display = path.display().to_string();

            let Some(id_str) = paths::id_from_filename(&path) else {
                violations.push(format!("{}: filename has no valid id prefix", display));
                continue;
            };

            if !seen.insert(id_str.clone()) {
                violations.push(format!("{}: duplicate id {}", display, id_str));
            }

            let id: NoteId = match id_str.parse() {
                Ok(id) => id,
                Err(e) => {
                    violations.push(format!("{}: {}", display, e));
                    continue;
                }
            };

            let note = match self.load_from_path(&id, &path) {
                Ok(note) => note,
                Err(e) => {
                    violations.push(format!("{}: {}", display, e));
                    continue;
                }
            };

            if note.id() != &id {
                violations.push(format!(
                    "{}: front-matter id {} does not match filename id {}",
                    display,
                    note.id(),
                    id
                ));
            }

            if note.metadata().updated() < note.metadata().created() {
                violations.push(format!("{}: updated precedes created", display));
            }

            if let Err(e) = note.validate() {
                violations.push(format!("{}: {}", display, e));
            }
        }

        Ok(violations)
    }

    // --- Internals ------------------------------------------------------

    fn emit(&self, id: &NoteId, op: ChangeOp) {
        if let Some(callback) = &self.change_callback {
            callback(id, op);
        }
    }

    fn load_from_path(&self, id: &NoteId, path: &Path) -> Result<Note> {
        let mut content = io::read_note_file(path)?;
        if let Some(cipher) = &self.cipher {
            content = cipher.decrypt(id, &content)?;
        }
        Note::from_file_format(&content)
    }

    fn find_live_path(&self, id: &NoteId) -> Option<PathBuf> {
        self.find_path_in(&self.notes_dir(), id)
    }

    fn find_path_in(&self, dir: &Path, id: &NoteId) -> Option<PathBuf> {
        self.note_files(dir)
            .into_iter()
            .find(|path| paths::id_from_filename(path).as_deref() == Some(id.as_str()))
    }

    fn note_files(&self, dir: &Path) -> Vec<PathBuf> {
        if !dir.exists() {
            return Vec::new();
        }
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| paths::is_note_file(p))
            .collect()
    }

    /// Parse every live note, warning about and skipping the unparseable
    fn scan_live(&self) -> Result<Vec<Note>> {
        let mut notes = Vec::new();
        for path in self.note_files(&self.notes_dir()) {
            let Some(id_str) = paths::id_from_filename(&path) else {
                continue;
            };
            let Ok(id) = id_str.parse::<NoteId>() else {
                continue;
            };
            match self.load_from_path(&id, &path) {
                Ok(note) => notes.push(note),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse note");
                }
            }
        }
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    fn open_store(dir: &Path) -> NoteStore {
        NoteStore::open(dir).unwrap()
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let note = Note::create("Stored Note", "Body content");
        store.store(&note).unwrap();

        assert!(store.exists(note.id()));
        let loaded = store.load(note.id()).unwrap();
        assert_eq!(loaded.content(), note.content());
        assert_eq!(loaded, note);
    }

    #[test]
    fn test_store_replaces_stale_slug() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let mut note = Note::create("Old Title", "Body");
        store.store(&note).unwrap();
        let old_path = dir.path().join("notes").join(note.filename());
        assert!(old_path.exists());

        note.set_title("New Title");
        store.store(&note).unwrap();

        assert!(!old_path.exists());
        assert!(dir.path().join("notes").join(note.filename()).exists());
        assert_eq!(store.total_notes().unwrap(), 1);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let err = store.load(&NoteId::generate()).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_store_rejects_invalid() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let note = Note::create("", "body");
        let err = store.store(&note).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_trash_lifecycle() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let note = Note::create("Trashed", "body");
        store.store(&note).unwrap();

        store.remove(note.id(), true).unwrap();
        assert!(!store.exists(note.id()));
        assert_eq!(store.list_trashed().unwrap(), vec![note.id().clone()]);

        store.restore(note.id()).unwrap();
        assert!(store.exists(note.id()));
        assert_eq!(store.load(note.id()).unwrap().content(), note.content());
        assert!(store.list_trashed().unwrap().is_empty());
    }

    #[test]
    fn test_remove_trashed_id_is_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let note = Note::create("Once", "body");
        store.store(&note).unwrap();
        store.remove(note.id(), true).unwrap();

        let err = store.remove(note.id(), true).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_permanently_delete_and_empty_trash() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let a = Note::create("A", "body");
        let b = Note::create("B", "body");
        store.store(&a).unwrap();
        store.store(&b).unwrap();
        store.remove(a.id(), true).unwrap();
        store.remove(b.id(), true).unwrap();

        store.permanently_delete(a.id()).unwrap();
        assert_eq!(store.list_trashed().unwrap(), vec![b.id().clone()]);

        assert_eq!(store.empty_trash().unwrap(), 1);
        assert!(store.list_trashed().unwrap().is_empty());
    }

    #[test]
    fn test_query_filters_and_count() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let mut work = Note::create("Work Note", "body");
        work.set_notebook("work");
        work.add_tag("urgent");
        let personal = Note::create("Personal Note", "body");
        store.store(&work).unwrap();
        store.store(&personal).unwrap();

        let mut query = NoteQuery::new();
        query.notebook = Some("work".into());
        assert_eq!(store.list(&query).unwrap(), vec![work.id().clone()]);
        assert_eq!(store.count(&query).unwrap(), 1);

        let all = NoteQuery::new();
        assert_eq!(store.count(&all).unwrap(), 2);
    }

    #[test]
    fn test_fuzzy_resolve_prefix() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let ids = [
            "01AAA00000000000000000000A",
            "01AAB00000000000000000000A",
            "01AB000000000000000000000A",
        ];
        for (i, id_str) in ids.iter().enumerate() {
            let id: NoteId = id_str.parse().unwrap();
            let note = Note::new(
                crate::note::Metadata::new(id, format!("Note {}", i)),
                "body",
            );
            store.store(&note).unwrap();
        }

        let matches = store.fuzzy_resolve("01AA", 10).unwrap();
        assert_eq!(matches.len(), 2);
        let expected_score = 0.5 + 0.5 * 4.0 / 26.0;
        for m in &matches {
            assert!(m.score >= expected_score - f64::EPSILON);
            assert!(m.id.as_str().starts_with("01AA"));
            assert!(m.display_text.starts_with("Note"));
        }

        let exact = store.fuzzy_resolve(ids[0], 10).unwrap();
        assert_eq!(exact.len(), 1);
        assert!((exact[0].score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_resolve_single() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let a: NoteId = "01AAA00000000000000000000A".parse().unwrap();
        let b: NoteId = "01AAB00000000000000000000A".parse().unwrap();
        store
            .store(&Note::new(crate::note::Metadata::new(a.clone(), "A"), ""))
            .unwrap();
        store
            .store(&Note::new(crate::note::Metadata::new(b, "B"), ""))
            .unwrap();

        assert_eq!(store.resolve_single("01AAA").unwrap(), a);
        assert_eq!(
            store.resolve_single("01AA").unwrap_err().kind(),
            "validation_error"
        );
        assert_eq!(
            store.resolve_single("01ZZ").unwrap_err().kind(),
            "not_found"
        );
    }

    #[test]
    fn test_backlinks_and_enumerations() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let target = Note::create("Target", "body");
        store.store(&target).unwrap();

        let mut source = Note::create("Source", format!("See [target]({})", target.id()));
        source.update_links_from_content();
        source.add_tag("linked");
        source.set_notebook("graph");
        store.store(&source).unwrap();

        let backlinks = store.get_backlinks(target.id()).unwrap();
        assert_eq!(backlinks.len(), 1);
        assert_eq!(backlinks[0].id(), source.id());

        assert_eq!(store.get_all_tags().unwrap(), vec!["linked".to_string()]);
        assert_eq!(
            store.get_all_notebooks().unwrap(),
            vec!["graph".to_string()]
        );
    }

    #[test]
    fn test_change_callback_order() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());

        let events: Rc<RefCell<Vec<(String, &'static str)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        store.set_change_callback(Box::new(move |id, op| {
            sink.borrow_mut().push((id.to_string(), op.as_str()));
        }));

        let note = Note::create("Eventful", "body");
        store.store(&note).unwrap();
        store.remove(note.id(), true).unwrap();
        store.restore(note.id()).unwrap();
        store.remove(note.id(), true).unwrap();
        store.permanently_delete(note.id()).unwrap();

        let id = note.id().to_string();
        assert_eq!(
            events.borrow().as_slice(),
            [
                (id.clone(), "put"),
                (id.clone(), "delete"),
                (id.clone(), "restore"),
                (id.clone(), "delete"),
                (id.clone(), "purge"),
            ]
        );
    }

    #[test]
    fn test_callback_not_invoked_on_failure() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());

        let events: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        store.set_change_callback(Box::new(move |id, _| {
            sink.borrow_mut().push(id.to_string());
        }));

        let invalid = Note::create("", "body");
        assert!(store.store(&invalid).is_err());
        assert!(store.remove(&NoteId::generate(), true).is_err());
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_batch_reports_partial_failure() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let good = Note::create("Good", "body");
        let bad = Note::create("", "body");
        let report = store.store_batch(&[good.clone(), bad.clone()]);
        assert_eq!(report.succeeded, vec![good.id().clone()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, *bad.id());

        let missing = NoteId::generate();
        let (notes, report) = store.load_batch(&[good.id().clone(), missing.clone()]);
        assert_eq!(notes.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, missing);
    }

    #[test]
    fn test_stats() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        assert_eq!(store.total_notes().unwrap(), 0);
        assert_eq!(store.last_modified().unwrap(), None);

        store.store(&Note::create("One", "body")).unwrap();
        store.store(&Note::create("Two", "body")).unwrap();

        assert_eq!(store.total_notes().unwrap(), 2);
        assert!(store.total_size().unwrap() > 0);
        assert!(store.last_modified().unwrap().is_some());
    }

    #[test]
    fn test_validate_flags_mismatched_id() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let note = Note::create("Valid", "body");
        store.store(&note).unwrap();
        assert!(store.validate().unwrap().is_empty());

        // Copy the file under a different id prefix
        let other_id = NoteId::generate();
        let bogus = store
            .notes_dir()
            .join(format!("{}-valid.md", other_id));
        fs::copy(store.notes_dir().join(note.filename()), bogus).unwrap();

        let violations = store.validate().unwrap();
        assert!(violations.iter().any(|v| v.contains("does not match")));
    }

    #[test]
    fn test_vacuum_removes_temp_files() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        fs::write(store.notes_dir().join(".tmpABC123"), "junk").unwrap();
        assert_eq!(store.vacuum().unwrap(), 1);
        assert_eq!(store.vacuum().unwrap(), 0);
    }

    #[test]
    fn test_cipher_round_trip() {
        struct Rot13;
        impl NoteCipher for Rot13 {
            fn encrypt(&self, _id: &NoteId, plaintext: &str) -> crate::error::Result<String> {
                Ok(rot13(plaintext))
            }
            fn decrypt(&self, _id: &NoteId, ciphertext: &str) -> crate::error::Result<String> {
                Ok(rot13(ciphertext))
            }
        }
        fn rot13(s: &str) -> String {
            s.chars()
                .map(|c| match c {
                    'a'..='z' => (((c as u8 - b'a' + 13) % 26) + b'a') as char,
                    'A'..='Z' => (((c as u8 - b'A' + 13) % 26) + b'A') as char,
                    _ => c,
                })
                .collect()
        }

        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.set_cipher(Box::new(Rot13));

        let note = Note::create("Secret", "classified body");
        store.store(&note).unwrap();

        // On-disk bytes are transformed
        let raw = fs::read_to_string(store.notes_dir().join(note.filename())).unwrap();
        assert!(!raw.contains("classified body"));

        let loaded = store.load(note.id()).unwrap();
        assert_eq!(loaded.content(), "classified body");
    }

    #[test]
    fn test_rebuild_repairs_canonical_form() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let note = Note::create("Canonical", "body");
        store.store(&note).unwrap();

        // Rename the file to a stale slug; rebuild should restore it
        let canonical = store.notes_dir().join(note.filename());
        let stale = store
            .notes_dir()
            .join(format!("{}-stale-slug.md", note.id()));
        fs::rename(&canonical, &stale).unwrap();

        assert_eq!(store.rebuild().unwrap(), 1);
        assert!(canonical.exists());
        assert!(!stale.exists());
    }
}
