//! JSON-tree export import (Notion-style)
//!
//! Accepts either a single JSON file (object or array of items) or a ZIP
//! archive of exported files. Each JSON item is flattened into a temporary
//! Markdown file with a YAML header and routed through the normal file
//! import path.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use serde_json::Value;

use crate::error::{NxError, Result};
use crate::store::NoteStore;

use super::{ImportManager, ImportOptions, ImportResult};

/// Notebook receiving notes flattened from JSON items
const JSON_NOTEBOOK: &str = "notion-json-import";

/// Importer for JSON-tree exports
pub struct JsonTreeImporter<'a> {
    store: &'a NoteStore,
}

impl<'a> JsonTreeImporter<'a> {
    pub fn new(store: &'a NoteStore) -> Self {
        JsonTreeImporter { store }
    }

    /// Import a `.json` file or a `.zip` archive
    pub fn import_export(&self, export_path: &Path) -> Result<ImportResult> {
        if !export_path.exists() {
            return Err(NxError::FileNotFound {
                path: export_path.to_path_buf(),
            });
        }

        let extension = export_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "zip" => self.import_zip(export_path),
            "json" => self.import_json_file(export_path),
            other => Err(NxError::Validation(format!(
                "unsupported export type: .{}",
                other
            ))),
        }
    }

    /// Extract with the external `unzip` tool and run a directory import
    ///
    /// The scratch directory is removed when the `TempDir` drops, on every
    /// outcome.
    fn import_zip(&self, archive: &Path) -> Result<ImportResult> {
        let scratch = tempfile::tempdir()
            .map_err(|e| NxError::File(format!("failed to create scratch directory: {}", e)))?;

        let output = Command::new("unzip")
            .arg("-q")
            .arg(archive)
            .arg("-d")
            .arg(scratch.path())
            .output()
            .map_err(|e| NxError::ExternalTool(format!("failed to run unzip: {}", e)))?;

        if !output.status.success() {
            return Err(NxError::ExternalTool(format!(
                "unzip failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stem = archive
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("export");

        let manager = ImportManager::new(self.store);
        let options = ImportOptions {
            source_dir: scratch.path().to_path_buf(),
            target_notebook: format!("notion-{}", stem),
            extensions: vec!["md".into(), "html".into(), "txt".into(), "csv".into()],
            preserve_structure: true,
            ..ImportOptions::default()
        };
        manager.import_directory(&options)
    }

    fn import_json_file(&self, path: &Path) -> Result<ImportResult> {
        let raw = fs::read_to_string(path).map_err(|e| NxError::file_read(path, e))?;
        let json: Value = serde_json::from_str(&raw)
            .map_err(|e| NxError::Parse(format!("invalid JSON export: {}", e)))?;

        let mut result = ImportResult::default();

        match json {
            Value::Array(items) => {
                for item in items {
                    result.absorb(self.import_item(&item, path));
                }
            }
            Value::Object(_) => {
                result.absorb(self.import_item(&json, path));
            }
            _ => {
                result.files_failed += 1;
                result
                    .errors
                    .push("unsupported JSON shape: expected object or array".into());
            }
        }

        Ok(result)
    }

    /// Flatten one item to Markdown and route it through file import
    fn import_item(&self, item: &Value, source_path: &Path) -> ImportResult {
        let mut result = ImportResult::default();

        let title = extract_title(item);
        let content = extract_content(item);
        let tags = extract_tags(item);

        if content.is_empty() {
            result.files_failed += 1;
            result
                .errors
                .push(format!("no content found in JSON item '{}'", title));
            return result;
        }

        let mut markdown = String::from("---\n");
        markdown.push_str(&format!("title: \"{}\"\n", title.replace('"', "\\\"")));
        if !tags.is_empty() {
            markdown.push_str("tags:\n");
            for tag in &tags {
                markdown.push_str(&format!("  - \"{}\"\n", tag.replace('"', "\\\"")));
            }
        }
        markdown.push_str("---\n\n");
        markdown.push_str(&format!("# {}\n\n", title));
        markdown.push_str(&content);

        match self.write_and_import(&markdown, source_path) {
            Ok(id) => {
                result.notes_imported += 1;
                result.created_notes.push(id);
                *result
                    .notebooks_created
                    .entry(JSON_NOTEBOOK.to_string())
                    .or_insert(0) += 1;
            }
            Err(e) => {
                result.files_failed += 1;
                result
                    .errors
                    .push(format!("failed to import JSON item '{}': {}", title, e));
            }
        }

        result
    }

    fn write_and_import(&self, markdown: &str, source_path: &Path) -> Result<crate::id::NoteId> {
        // Temp file lives only for the import call
        let mut temp = tempfile::Builder::new()
            .suffix(".md")
            .tempfile()
            .map_err(|e| NxError::File(format!("failed to create temp file: {}", e)))?;
        temp.write_all(markdown.as_bytes())
            .map_err(|e| NxError::file_write(temp.path(), e))?;
        temp.flush()
            .map_err(|e| NxError::file_write(temp.path(), e))?;

        let manager = ImportManager::new(self.store);
        let id = manager.import_file(temp.path(), JSON_NOTEBOOK)?;

        // Keep provenance on the created note
        if let Ok(mut note) = self.store.load(&id) {
            note.metadata_mut().set_custom_field("imported_from", "notion_json");
            if let Some(name) = source_path.file_name().and_then(|n| n.to_str()) {
                note.metadata_mut().set_custom_field("source_file", name);
            }
            self.store.store(&note)?;
        }

        Ok(id)
    }
}

/// Title from `title` (string or rich-text array), `Name`, or `Untitled`
fn extract_title(item: &Value) -> String {
    if let Some(title) = item.get("title") {
        if let Some(s) = title.as_str() {
            return s.to_string();
        }
        if let Some(parts) = title.as_array() {
            if let Some(text) = parts
                .iter()
                .filter_map(|part| part.get("plain_text").and_then(Value::as_str))
                .next()
            {
                return text.to_string();
            }
        }
    }
    if let Some(name) = item.get("Name").and_then(Value::as_str) {
        return name.to_string();
    }
    "Untitled".to_string()
}

/// Body from `content`, `blocks[]`, or flattened `properties{}`
fn extract_content(item: &Value) -> String {
    if let Some(content) = item.get("content") {
        let text = content_to_text(content);
        if !text.is_empty() {
            return text;
        }
    }
    if let Some(blocks) = item.get("blocks") {
        let text = blocks_to_markdown(blocks);
        if !text.is_empty() {
            return text;
        }
    }
    if let Some(properties) = item.get("properties") {
        return properties_to_markdown(properties);
    }
    String::new()
}

fn content_to_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => {
            let mut text = String::new();
            for part in parts {
                if let Some(s) = part.get("plain_text").and_then(Value::as_str) {
                    text.push_str(s);
                    text.push('\n');
                } else if let Some(s) = part.as_str() {
                    text.push_str(s);
                    text.push('\n');
                }
            }
            text
        }
        Value::Object(map) => map
            .get("plain_text")
            .or_else(|| map.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

/// Paragraphs and the first two heading levels become Markdown
fn blocks_to_markdown(blocks: &Value) -> String {
    let Some(blocks) = blocks.as_array() else {
        return String::new();
    };

    let mut markdown = String::new();
    for block in blocks {
        for (key, prefix) in [
            ("paragraph", ""),
            ("heading_1", "# "),
            ("heading_2", "## "),
        ] {
            if let Some(rich_text) = block
                .get(key)
                .and_then(|b| b.get("rich_text"))
                .and_then(Value::as_array)
            {
                markdown.push_str(prefix);
                for text in rich_text {
                    if let Some(s) = text.get("plain_text").and_then(Value::as_str) {
                        markdown.push_str(s);
                    }
                }
                markdown.push_str("\n\n");
            }
        }
    }
    markdown
}

/// `**Key**: Value` lines from a properties object
fn properties_to_markdown(properties: &Value) -> String {
    let Some(map) = properties.as_object() else {
        return String::new();
    };

    let mut markdown = String::new();
    for (key, value) in map {
        if let Some(s) = value.as_str() {
            markdown.push_str(&format!("**{}**: {}\n", key, s));
        } else if let Some(rich_text) = value.get("rich_text").and_then(Value::as_array) {
            markdown.push_str(&format!("**{}**: ", key));
            for text in rich_text {
                if let Some(s) = text.get("plain_text").and_then(Value::as_str) {
                    markdown.push_str(s);
                }
            }
            markdown.push('\n');
        }
    }
    markdown
}

/// Tags from strings or objects with a `name`
fn extract_tags(item: &Value) -> Vec<String> {
    let Some(tags) = item.get("tags").and_then(Value::as_array) else {
        return Vec::new();
    };

    tags.iter()
        .filter_map(|tag| {
            tag.as_str()
                .map(str::to_string)
                .or_else(|| tag.get("name").and_then(Value::as_str).map(str::to_string))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> NoteStore {
        NoteStore::open(dir).unwrap()
    }

    #[test]
    fn test_extract_title_variants() {
        assert_eq!(extract_title(&json!({"title": "Plain"})), "Plain");
        assert_eq!(
            extract_title(&json!({"title": [{"plain_text": "Rich"}]})),
            "Rich"
        );
        assert_eq!(extract_title(&json!({"Name": "Named"})), "Named");
        assert_eq!(extract_title(&json!({})), "Untitled");
    }

    #[test]
    fn test_extract_tags_variants() {
        assert_eq!(
            extract_tags(&json!({"tags": ["a", {"name": "b"}, 3]})),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(extract_tags(&json!({})).is_empty());
    }

    #[test]
    fn test_blocks_to_markdown() {
        let blocks = json!([
            {"heading_1": {"rich_text": [{"plain_text": "Top"}]}},
            {"paragraph": {"rich_text": [{"plain_text": "Body text"}]}},
            {"heading_2": {"rich_text": [{"plain_text": "Sub"}]}}
        ]);
        let markdown = blocks_to_markdown(&blocks);
        assert!(markdown.contains("# Top\n"));
        assert!(markdown.contains("Body text\n"));
        assert!(markdown.contains("## Sub\n"));
    }

    #[test]
    fn test_properties_to_markdown() {
        let properties = json!({
            "Status": "Active",
            "Owner": {"rich_text": [{"plain_text": "Sam"}]}
        });
        let markdown = properties_to_markdown(&properties);
        assert!(markdown.contains("**Status**: Active"));
        assert!(markdown.contains("**Owner**: Sam"));
    }

    #[test]
    fn test_import_json_array() {
        let dir = tempdir().unwrap();
        let export = dir.path().join("export.json");
        fs::write(
            &export,
            serde_json::to_string(&json!([
                {"title": "First Page", "content": "First body", "tags": ["alpha"]},
                {"title": "Second Page", "content": "Second body"}
            ]))
            .unwrap(),
        )
        .unwrap();

        let store_dir = tempdir().unwrap();
        let store = store_in(store_dir.path());
        let importer = JsonTreeImporter::new(&store);

        let result = importer.import_export(&export).unwrap();
        assert_eq!(result.notes_imported, 2);
        assert_eq!(result.files_failed, 0);
        assert_eq!(result.notebooks_created.get(JSON_NOTEBOOK), Some(&2));

        let note = store.load(&result.created_notes[0]).unwrap();
        assert_eq!(note.title(), "First Page");
        assert_eq!(note.tags(), ["alpha"]);
        assert!(note.content().contains("First body"));
        assert_eq!(note.notebook(), Some(JSON_NOTEBOOK));
        assert_eq!(
            note.metadata().custom_field("imported_from"),
            Some("notion_json")
        );
    }

    #[test]
    fn test_import_single_object() {
        let dir = tempdir().unwrap();
        let export = dir.path().join("page.json");
        fs::write(
            &export,
            serde_json::to_string(&json!({
                "Name": "From Properties",
                "properties": {"Field": "Value"}
            }))
            .unwrap(),
        )
        .unwrap();

        let store_dir = tempdir().unwrap();
        let store = store_in(store_dir.path());
        let importer = JsonTreeImporter::new(&store);

        let result = importer.import_export(&export).unwrap();
        assert_eq!(result.notes_imported, 1);

        let note = store.load(&result.created_notes[0]).unwrap();
        assert_eq!(note.title(), "From Properties");
        assert!(note.content().contains("**Field**: Value"));
    }

    #[test]
    fn test_item_without_content_fails_softly() {
        let dir = tempdir().unwrap();
        let export = dir.path().join("empty.json");
        fs::write(&export, r#"[{"title": "Bare"}]"#).unwrap();

        let store_dir = tempdir().unwrap();
        let store = store_in(store_dir.path());
        let importer = JsonTreeImporter::new(&store);

        let result = importer.import_export(&export).unwrap();
        assert_eq!(result.notes_imported, 0);
        assert_eq!(result.files_failed, 1);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_rejects_unknown_extension_and_missing_file() {
        let store_dir = tempdir().unwrap();
        let store = store_in(store_dir.path());
        let importer = JsonTreeImporter::new(&store);

        assert_eq!(
            importer
                .import_export(Path::new("/no/such/export.json"))
                .unwrap_err()
                .kind(),
            "file_not_found"
        );

        let dir = tempdir().unwrap();
        let odd = dir.path().join("export.tar");
        fs::write(&odd, "x").unwrap();
        assert_eq!(
            importer.import_export(&odd).unwrap_err().kind(),
            "validation_error"
        );
    }
}
