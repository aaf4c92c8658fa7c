//! Bulk ingestion of externally authored notes
//!
//! Directory and file import with tolerant front-matter parsing, notebook
//! inference from directory structure, and dialect adapters for wiki-style
//! vaults ([`wiki`]) and JSON-tree exports ([`json_tree`]).

pub mod json_tree;
pub mod wiki;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::{NxError, Result};
use crate::id::NoteId;
use crate::note::Note;
use crate::store::{NoteQuery, NoteStore};

pub use json_tree::JsonTreeImporter;
pub use wiki::WikiImporter;

/// Directory import parameters
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub source_dir: PathBuf,
    /// Notebook for files without an inferred or declared one
    pub target_notebook: String,
    pub recursive: bool,
    /// Lowercased extension allow-list, without dots
    pub extensions: Vec<String>,
    /// Use the first path segment below the source root as the notebook
    pub preserve_structure: bool,
    /// When off, files whose title + notebook already exist are skipped
    pub overwrite: bool,
    pub skip_hidden: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            source_dir: PathBuf::new(),
            target_notebook: "imported".to_string(),
            recursive: true,
            extensions: vec!["md".into(), "txt".into(), "markdown".into()],
            preserve_structure: true,
            overwrite: false,
            skip_hidden: true,
        }
    }
}

/// Aggregate import outcome
#[derive(Debug, Default)]
pub struct ImportResult {
    pub notes_imported: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub errors: Vec<String>,
    pub created_notes: Vec<NoteId>,
    /// Notebook name to number of notes it received
    pub notebooks_created: BTreeMap<String, usize>,
}

impl ImportResult {
    fn absorb(&mut self, other: ImportResult) {
        self.notes_imported += other.notes_imported;
        self.files_skipped += other.files_skipped;
        self.files_failed += other.files_failed;
        self.errors.extend(other.errors);
        self.created_notes.extend(other.created_notes);
        for (notebook, count) in other.notebooks_created {
            *self.notebooks_created.entry(notebook).or_insert(0) += count;
        }
    }
}

/// Front-matter fields an imported file may declare
#[derive(Debug, Default)]
struct ParsedContent {
    title: Option<String>,
    notebook: Option<String>,
    tags: Vec<String>,
    content: String,
}

/// Imports external files into the store
pub struct ImportManager<'a> {
    store: &'a NoteStore,
}

impl<'a> ImportManager<'a> {
    pub fn new(store: &'a NoteStore) -> Self {
        ImportManager { store }
    }

    /// Walk a directory and import every eligible file
    #[tracing::instrument(skip(self, options), fields(source = %options.source_dir.display()))]
    pub fn import_directory(&self, options: &ImportOptions) -> Result<ImportResult> {
        if !options.source_dir.exists() {
            return Err(NxError::FileNotFound {
                path: options.source_dir.clone(),
            });
        }
        if !options.source_dir.is_dir() {
            return Err(NxError::File(format!(
                "source path is not a directory: {}",
                options.source_dir.display()
            )));
        }

        let mut result = ImportResult::default();
        let max_depth = if options.recursive { usize::MAX } else { 1 };

        for entry in WalkDir::new(&options.source_dir)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let file_path = entry.path();

            if !should_import(file_path, options) {
                result.files_skipped += 1;
                continue;
            }

            let notebook = infer_notebook(file_path, &options.source_dir, options);

            match self.import_file_with_options(file_path, &notebook, options) {
                Ok(Some(id)) => {
                    result.notes_imported += 1;
                    result.created_notes.push(id);
                    *result.notebooks_created.entry(notebook).or_insert(0) += 1;
                }
                Ok(None) => {
                    result.files_skipped += 1;
                }
                Err(e) => {
                    result.files_failed += 1;
                    result
                        .errors
                        .push(format!("failed to import {}: {}", file_path.display(), e));
                }
            }
        }

        Ok(result)
    }

    /// Import one file into the given notebook
    pub fn import_file(&self, file_path: &Path, notebook: &str) -> Result<NoteId> {
        self.import_file_with_options(file_path, notebook, &ImportOptions {
            overwrite: true,
            ..ImportOptions::default()
        })?
        .ok_or_else(|| NxError::Unknown("import unexpectedly skipped".into()))
    }

    /// Returns `Ok(None)` when the duplicate rule skips the file
    fn import_file_with_options(
        &self,
        file_path: &Path,
        notebook: &str,
        options: &ImportOptions,
    ) -> Result<Option<NoteId>> {
        if !file_path.exists() {
            return Err(NxError::FileNotFound {
                path: file_path.to_path_buf(),
            });
        }

        let extension = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let mut note = match extension.as_str() {
            "md" | "markdown" => self.parse_markdown_file(file_path)?,
            "txt" => self.parse_text_file(file_path)?,
            other => {
                return Err(NxError::Validation(format!(
                    "unsupported file type: .{}",
                    other
                )))
            }
        };

        // The inferred notebook wins over a front-matter declaration; an
        // empty notebook argument preserves whatever the file declared
        if !notebook.is_empty() {
            note.metadata_mut().set_notebook(notebook);
        }

        if !options.overwrite && self.title_exists(note.title(), note.notebook())? {
            return Ok(None);
        }

        self.store.store(&note)?;
        Ok(Some(note.id().clone()))
    }

    fn parse_markdown_file(&self, file_path: &Path) -> Result<Note> {
        let raw = fs::read_to_string(file_path).map_err(|e| NxError::file_read(file_path, e))?;
        let parsed = parse_front_matter(&raw);

        let title = parsed
            .title
            .clone()
            .unwrap_or_else(|| filename_to_title(file_path));
        let mut note = Note::create(title, parsed.content);

        if !parsed.tags.is_empty() {
            note.set_tags(parsed.tags);
        }
        if let Some(notebook) = parsed.notebook {
            note.set_notebook(notebook);
        }

        apply_file_timestamps(&mut note, file_path);
        Ok(note)
    }

    fn parse_text_file(&self, file_path: &Path) -> Result<Note> {
        let content =
            fs::read_to_string(file_path).map_err(|e| NxError::file_read(file_path, e))?;
        let mut note = Note::create(filename_to_title(file_path), content);
        apply_file_timestamps(&mut note, file_path);
        Ok(note)
    }

    fn title_exists(&self, title: &str, notebook: Option<&str>) -> Result<bool> {
        let mut query = NoteQuery::new();
        query.notebook = notebook.map(str::to_string);
        Ok(self
            .store
            .search(&query)?
            .iter()
            .any(|existing| existing.title() == title))
    }
}

/// Hidden-file and extension gate
fn should_import(file_path: &Path, options: &ImportOptions) -> bool {
    if options.skip_hidden {
        let hidden = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if hidden {
            return false;
        }
    }

    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    options.extensions.iter().any(|allowed| *allowed == extension)
}

/// Pick the notebook for a file: first path segment when preserving
/// structure, the target notebook otherwise
fn infer_notebook(file_path: &Path, root_dir: &Path, options: &ImportOptions) -> String {
    if !options.preserve_structure {
        return options.target_notebook.clone();
    }

    let relative = match file_path.strip_prefix(root_dir) {
        Ok(relative) => relative,
        Err(_) => return options.target_notebook.clone(),
    };

    match relative.components().count() {
        0 | 1 => options.target_notebook.clone(),
        _ => relative
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .map(sanitize_notebook_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| options.target_notebook.clone()),
    }
}

/// Keep alphanumerics, `-` and `_`; whitespace becomes `_`; the rest drops
fn sanitize_notebook_name(name: &str) -> String {
    name.chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect()
}

/// `Stem_with_underscores-and-dashes.md` → `Stem with underscores and dashes`
fn filename_to_title(file_path: &Path) -> String {
    let stem = file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled");

    let spaced: String = stem
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();

    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => "Untitled".to_string(),
    }
}

/// Tolerant front-matter recognition for foreign files
///
/// A `---` opener with a `\n---` (or `\r\n---`) closer delimits YAML;
/// recognized keys are `title`, `notebook` and `tags`. Any parse failure
/// degrades to body-only.
fn parse_front_matter(raw: &str) -> ParsedContent {
    let mut parsed = ParsedContent {
        content: raw.to_string(),
        ..ParsedContent::default()
    };

    let Some(rest) = raw.strip_prefix("---") else {
        return parsed;
    };
    let Some(end) = rest.find("\n---") else {
        return parsed;
    };

    let yaml_str = rest[..end].trim_end_matches('\r');
    let Ok(yaml) = serde_yaml::from_str::<serde_yaml::Value>(yaml_str) else {
        return parsed;
    };

    if let Some(title) = yaml.get("title").and_then(|v| v.as_str()) {
        parsed.title = Some(title.to_string());
    }
    if let Some(notebook) = yaml.get("notebook").and_then(|v| v.as_str()) {
        parsed.notebook = Some(notebook.to_string());
    }
    if let Some(tags) = yaml.get("tags").and_then(|v| v.as_sequence()) {
        parsed.tags = tags
            .iter()
            .filter_map(|tag| tag.as_str())
            .map(str::to_string)
            .collect();
    }

    parsed.content = rest[end + 4..].trim_start_matches(['\n', '\r']).to_string();
    parsed
}

/// Initialize created/updated from the file's mtime; failures are ignored
fn apply_file_timestamps(note: &mut Note, file_path: &Path) {
    if let Ok(modified) = fs::metadata(file_path).and_then(|m| m.modified()) {
        let modified: DateTime<Utc> = modified.into();
        note.metadata_mut().set_created(modified);
        note.metadata_mut().set_updated(modified);
    }
}
