//! Filesystem primitives for the note store

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{NxError, Result};

use super::paths::{ATTACHMENTS_DIR, NOTES_DIR, TRASH_DIR};

/// Create the store layout under `root` (idempotent)
pub(super) fn ensure_layout(root: &Path) -> Result<()> {
    for dir in [NOTES_DIR, TRASH_DIR, ATTACHMENTS_DIR] {
        let path = root.join(dir);
        fs::create_dir_all(&path).map_err(|e| NxError::DirectoryCreate {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

/// Write `content` to `target` atomically
///
/// Writes to a temp file in the same directory, fsyncs, then renames over
/// the target. The temp file is removed on every failure path (dropping an
/// unpersisted `NamedTempFile` unlinks it).
pub(super) fn atomic_write(target: &Path, content: &str) -> Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| NxError::file_write(target, "target has no parent directory"))?;

    let mut tmp =
        NamedTempFile::new_in(dir).map_err(|e| NxError::file_write(target, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| NxError::file_write(target, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| NxError::file_write(target, e))?;
    tmp.persist(target)
        .map_err(|e| NxError::file_write(target, e.error))?;

    Ok(())
}

/// Read a note file to a string with typed errors
pub(super) fn read_note_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(NxError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => NxError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => NxError::FilePermissionDenied {
            path: path.to_path_buf(),
        },
        _ => NxError::file_read(path, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_layout_idempotent() {
        let dir = tempdir().unwrap();
        ensure_layout(dir.path()).unwrap();
        ensure_layout(dir.path()).unwrap();
        assert!(dir.path().join(NOTES_DIR).is_dir());
        assert!(dir.path().join(TRASH_DIR).is_dir());
        assert!(dir.path().join(ATTACHMENTS_DIR).is_dir());
    }

    #[test]
    fn test_atomic_write_replaces() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("note.md");

        atomic_write(&target, "first").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "first");

        atomic_write(&target, "second").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "second");

        // No temp files left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "note.md")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_read_note_file_missing() {
        let dir = tempdir().unwrap();
        let err = read_note_file(&dir.path().join("gone.md")).unwrap_err();
        assert_eq!(err.kind(), "file_not_found");
    }
}
