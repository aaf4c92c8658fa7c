//! Wiki-dialect vault import (Obsidian-style)
//!
//! Runs the normal directory import, then rewrites wiki links in every
//! created note: `[[Target|Label]]` becomes `[Label](Target.md)` and
//! `[[Target]]` becomes `[Target](Target.md)`. Rewrites are best-effort.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{NxError, Result};
use crate::store::NoteStore;

use super::{ImportManager, ImportOptions, ImportResult};

static WIKI_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\|\]]+)\|([^\]]+)\]\]").expect("wiki alias regex"));
static WIKI_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("wiki link regex"));

/// Importer for wiki-style Markdown vaults
pub struct WikiImporter<'a> {
    store: &'a NoteStore,
}

impl<'a> WikiImporter<'a> {
    pub fn new(store: &'a NoteStore) -> Self {
        WikiImporter { store }
    }

    /// Import a vault directory and rewrite its wiki links
    pub fn import_vault(&self, vault_path: &Path) -> Result<ImportResult> {
        if !vault_path.is_dir() {
            return Err(NxError::FileNotFound {
                path: vault_path.to_path_buf(),
            });
        }

        let vault_name = vault_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("vault");

        let manager = ImportManager::new(self.store);
        let options = ImportOptions {
            source_dir: vault_path.to_path_buf(),
            target_notebook: format!("obsidian-{}", vault_name),
            preserve_structure: true,
            // Vaults keep meaningful dotfiles out of note dirs anyway
            skip_hidden: false,
            ..ImportOptions::default()
        };

        let result = manager.import_directory(&options)?;

        for id in &result.created_notes {
            let mut note = match self.store.load(id) {
                Ok(note) => note,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "skipping link rewrite for unreadable note");
                    continue;
                }
            };

            let converted = convert_wiki_links(note.content());
            if converted != note.content() {
                note.set_content(converted);
                if let Err(e) = self.store.store(&note) {
                    tracing::warn!(id = %id, error = %e, "failed to save rewritten note");
                }
            }
        }

        Ok(result)
    }
}

/// Rewrite wiki links into Markdown links
///
/// The aliased form runs first so its targets are not consumed by the
/// simple form.
pub fn convert_wiki_links(content: &str) -> String {
    let content = WIKI_ALIAS_RE.replace_all(content, "[$2]($1.md)");
    WIKI_LINK_RE.replace_all(&content, "[$1]($1.md)").into_owned()
}
