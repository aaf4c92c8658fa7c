//! Attachment metadata and storage naming
//!
//! Attachments live under `attachments/` keyed by their own ids; only the
//! naming layout is part of the core contract.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::id::NoteId;

/// Characters not allowed in a stored attachment name
const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Maximum stored name length (id prefix excluded)
const MAX_NAME_LEN: usize = 100;

/// Attachment metadata
#[derive(Debug, Clone)]
pub struct AttachmentInfo {
    /// Attachment's own id
    pub id: NoteId,
    /// Note this is attached to
    pub parent_note: NoteId,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub description: String,
}

impl AttachmentInfo {
    /// Storage filename: `<id>-<sanitized-original-name>`
    ///
    /// Forbidden characters become `_`; names are capped at 100 characters
    /// preserving a short extension; an empty original name yields
    /// `<id>-file`.
    pub fn storage_filename(&self) -> String {
        let mut sanitized: String = self
            .original_name
            .chars()
            .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
            .collect();

        if sanitized.len() > MAX_NAME_LEN {
            let dot = sanitized.rfind('.');
            match dot {
                Some(pos) if pos > sanitized.len() - 10 => {
                    let extension = sanitized[pos..].to_string();
                    truncate_at_boundary(&mut sanitized, 90 - extension.len());
                    sanitized.push_str(&extension);
                }
                _ => truncate_at_boundary(&mut sanitized, MAX_NAME_LEN),
            }
        }

        if sanitized.is_empty() {
            sanitized = "file".to_string();
        }

        format!("{}-{}", self.id, sanitized)
    }

    /// Relative path for use inside notes
    pub fn relative_path(&self) -> String {
        format!("attachments/{}", self.storage_filename())
    }
}

/// Truncate to at most `max` bytes without splitting a character
fn truncate_at_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

/// Guess the MIME type for a filename
pub fn detect_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time;

    fn info(original_name: &str) -> AttachmentInfo {
        AttachmentInfo {
            id: "01AAAAAAAAAAAAAAAAAAAAAAAA".parse().unwrap(),
            parent_note: NoteId::generate(),
            original_name: original_name.to_string(),
            mime_type: String::new(),
            size: 0,
            created: time::now_millis(),
            description: String::new(),
        }
    }

    #[test]
    fn test_forbidden_chars_replaced() {
        let name = info("a/b\\c:d*e?f\"g<h>i|j.png").storage_filename();
        assert_eq!(name, "01AAAAAAAAAAAAAAAAAAAAAAAA-a_b_c_d_e_f_g_h_i_j.png");
    }

    #[test]
    fn test_long_name_preserves_extension() {
        let long = format!("{}.pdf", "x".repeat(200));
        let name = info(&long).storage_filename();
        assert!(name.len() <= 26 + 1 + MAX_NAME_LEN);
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_long_name_without_extension_truncates() {
        let long = "y".repeat(200);
        let name = info(&long).storage_filename();
        assert_eq!(name.len(), 26 + 1 + MAX_NAME_LEN);
    }

    #[test]
    fn test_empty_name_fallback() {
        assert_eq!(
            info("").storage_filename(),
            "01AAAAAAAAAAAAAAAAAAAAAAAA-file"
        );
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            info("doc.txt").relative_path(),
            "attachments/01AAAAAAAAAAAAAAAAAAAAAAAA-doc.txt"
        );
    }

    #[test]
    fn test_detect_mime() {
        assert_eq!(detect_mime(Path::new("image.png")), "image/png");
        assert_eq!(detect_mime(Path::new("notes.md")), "text/markdown");
        assert_eq!(
            detect_mime(Path::new("unknown.zzz")),
            "application/octet-stream"
        );
    }
}
