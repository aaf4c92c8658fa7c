//! Note data structures for nx
//!
//! A note is metadata plus a UTF-8 Markdown body, stored as a single file
//! with YAML front-matter.

pub mod metadata;

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{NxError, Result};
use crate::id::{self, NoteId};

pub use metadata::Metadata;

/// Maximum content size (10 MiB)
const MAX_CONTENT_LEN: usize = 10 * 1024 * 1024;

static CONTENT_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]*)\]\(([0-9A-HJKMNP-TV-Z]{26})\)").expect("content link regex")
});

/// A complete note (metadata + content)
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    metadata: Metadata,
    content: String,
}

impl Note {
    /// Create a note with a fresh id
    pub fn create(title: impl Into<String>, content: impl Into<String>) -> Self {
        Note {
            metadata: Metadata::new(NoteId::generate(), title),
            content: content.into(),
        }
    }

    /// Adopt existing metadata
    pub fn new(metadata: Metadata, content: impl Into<String>) -> Self {
        Note {
            metadata,
            content: content.into(),
        }
    }

    pub fn id(&self) -> &NoteId {
        self.metadata.id()
    }

    pub fn title(&self) -> &str {
        self.metadata.title()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tags(&self) -> &[String] {
        self.metadata.tags()
    }

    pub fn notebook(&self) -> Option<&str> {
        self.metadata.notebook()
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.metadata.touch();
    }

    pub fn append_content(&mut self, content: &str) {
        if !self.content.is_empty() && !self.content.ends_with('\n') {
            self.content.push('\n');
        }
        self.content.push_str(content);
        self.metadata.touch();
    }

    pub fn prepend_content(&mut self, content: &str) {
        let mut prefix = content.to_string();
        if !prefix.is_empty() && !prefix.ends_with('\n') {
            prefix.push('\n');
        }
        self.content.insert_str(0, &prefix);
        self.metadata.touch();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.metadata.set_title(title);
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.metadata.set_tags(tags);
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.metadata.add_tag(tag);
    }

    pub fn set_notebook(&mut self, notebook: impl Into<String>) {
        self.metadata.set_notebook(notebook);
    }

    pub fn touch(&mut self) {
        self.metadata.touch();
    }

    /// Validate metadata and content limits
    pub fn validate(&self) -> Result<()> {
        self.metadata.validate()?;

        if self.content.len() > MAX_CONTENT_LEN {
            return Err(NxError::Validation("content too large (max 10MiB)".into()));
        }

        Ok(())
    }

    /// Serialize to the canonical on-disk form
    pub fn to_file_format(&self) -> Result<String> {
        let yaml = self.metadata.to_yaml()?;
        Ok(format!("---\n{}---\n\n{}", yaml, self.content))
    }

    /// Parse a note from its on-disk form
    ///
    /// Tolerates `\r\n` before the closing delimiter and an absent trailing
    /// newline on the body.
    pub fn from_file_format(content: &str) -> Result<Self> {
        let rest = content
            .strip_prefix("---\n")
            .ok_or_else(|| NxError::Parse("missing front-matter start delimiter".into()))?;

        let end = rest
            .find("\n---")
            .ok_or_else(|| NxError::Parse("missing front-matter end delimiter".into()))?;

        let yaml = rest[..end].trim_end_matches('\r');
        let body = rest[end + 4..].trim_start_matches(['\n', '\r']);

        let metadata = Metadata::from_yaml(yaml)?;
        let note = Note {
            metadata,
            content: body.to_string(),
        };

        note.validate()?;
        Ok(note)
    }

    /// Filename for this note: `<id>-<slug>.md`
    pub fn filename(&self) -> String {
        id::note_filename(self.metadata.id(), self.metadata.title())
    }

    /// Extract back-references from Markdown links of the form
    /// `[text](<26-char-id>)`, deduplicated and sorted
    pub fn extract_content_links(&self) -> Vec<NoteId> {
        let mut links: Vec<NoteId> = CONTENT_LINK_RE
            .captures_iter(&self.content)
            .filter_map(|caps| caps[2].parse().ok())
            .collect();
        links.sort();
        links.dedup();
        links
    }

    /// Rewrite `metadata.links` from the links found in the content
    pub fn update_links_from_content(&mut self) {
        let links = self.extract_content_links();
        self.metadata.set_links(links);
    }

    /// Byte offsets of every occurrence of `text` in the content
    pub fn find_text_positions(&self, text: &str, case_sensitive: bool) -> Vec<usize> {
        if text.is_empty() {
            return Vec::new();
        }

        let (haystack, needle) = if case_sensitive {
            (self.content.clone(), text.to_string())
        } else {
            (self.content.to_lowercase(), text.to_lowercase())
        };

        let mut positions = Vec::new();
        let mut pos = 0;
        while let Some(found) = haystack[pos..].find(&needle) {
            positions.push(pos + found);
            pos += found + needle.len();
        }
        positions
    }

    /// Substring search over title and content
    pub fn contains_text(&self, text: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            self.content.contains(text) || self.metadata.title().contains(text)
        } else {
            let needle = text.to_lowercase();
            self.content.to_lowercase().contains(&needle)
                || self.metadata.title().to_lowercase().contains(&needle)
        }
    }
}
