//! Store layout constants and path helpers

use std::path::{Path, PathBuf};

/// Live notes, one file per note
pub const NOTES_DIR: &str = "notes";

/// Soft-deleted notes pending restore or permanent deletion
pub const TRASH_DIR: &str = "trash";

/// Attachments keyed by their own ids
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Named text templates
pub const TEMPLATES_DIR: &str = "templates";

/// Store configuration filename
pub const CONFIG_FILE: &str = "config.toml";

/// Search index database filename
pub const INDEX_FILE: &str = "index.db";

/// Extract the 26-character id prefix from a note filename
///
/// Filenames are `<id>-<slug>.md`; anything shorter than an id or with a
/// non-id prefix yields `None`.
pub fn id_from_filename(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    if stem.len() < crate::id::NoteId::LENGTH {
        return None;
    }
    let prefix = &stem[..crate::id::NoteId::LENGTH];
    if !crate::id::is_valid_format(prefix) {
        return None;
    }
    Some(prefix.to_string())
}

/// Derive the display slug from a note filename (the part after the id)
pub fn slug_from_filename(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.get(crate::id::NoteId::LENGTH + 1..)
        .map(str::to_string)
}

/// Whether a directory entry looks like a note file
pub fn is_note_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "md") && id_from_filename(path).is_some()
}

/// Path of the index database inside a store root
pub fn index_path(store_root: &Path) -> PathBuf {
    store_root.join(INDEX_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_filename() {
        let path = Path::new("01AAAAAAAAAAAAAAAAAAAAAAAA-hello-world.md");
        assert_eq!(
            id_from_filename(path).as_deref(),
            Some("01AAAAAAAAAAAAAAAAAAAAAAAA")
        );
        assert_eq!(slug_from_filename(path).as_deref(), Some("hello-world"));

        assert!(id_from_filename(Path::new("README.md")).is_none());
        assert!(id_from_filename(Path::new("short.md")).is_none());
    }

    #[test]
    fn test_is_note_file() {
        assert!(is_note_file(Path::new(
            "01AAAAAAAAAAAAAAAAAAAAAAAA-x.md"
        )));
        assert!(!is_note_file(Path::new("01AAAAAAAAAAAAAAAAAAAAAAAA-x.txt")));
        assert!(!is_note_file(Path::new("notes.md")));
    }
}
