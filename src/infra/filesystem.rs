//! Filesystem operations
//!
//! Handles file and directory operations, including the atomic replace
//! protocol used for every state file read by external reporting tools.

use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory and all its contents
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Replace a file atomically
///
/// The content goes to a temporary file in the destination directory which
/// is then renamed over `path`. A concurrent reader sees either the old or
/// the new content, never a partial write.
pub fn write_file_atomic(path: &Path, content: &[u8]) -> Result<(), FilesystemError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    create_dir_all(parent)?;

    let write_err = |e: std::io::Error| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    temp.write_all(content).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;

    Ok(())
}

/// Append one line to a file, creating it if needed
pub fn append_line(path: &Path, line: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

    writeln!(file, "{line}").map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Move a file, falling back to copy + remove across filesystems
pub fn move_file(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }

    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }

    let move_err = |e: std::io::Error| FilesystemError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error: e.to_string(),
    };
    std::fs::copy(from, to).map_err(move_err)?;
    std::fs::remove_file(from).map_err(move_err)
}

/// SHA256 over a directory's file set, hex encoded
///
/// Files are visited in sorted order and both the relative path and the
/// content contribute, so renames change the hash. Dot-entries are skipped.
pub fn hash_tree(dir: &Path) -> Result<String, FilesystemError> {
    let mut hasher = Sha256::new();

    let entries = walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in entries {
        let entry = entry.map_err(|e| FilesystemError::ReadFile {
            path: dir.to_path_buf(),
            error: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let content = std::fs::read(entry.path()).map_err(|e| FilesystemError::ReadFile {
            path: entry.path().to_path_buf(),
            error: e.to_string(),
        })?;

        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(Sha256::digest(&content));
    }

    Ok(hex::encode(hasher.finalize()))
}

/// List regular files directly inside a directory, sorted by name
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, FilesystemError> {
    let read_err = |e: std::io::Error| FilesystemError::ReadFile {
        path: dir.to_path_buf(),
        error: e.to_string(),
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if entry.file_type().map_err(read_err)?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
