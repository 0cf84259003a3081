use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::kernel::error::{Error, Result};
use crate::storage::error::StorageSystemError;

/// Read a file, returning `None` when it does not exist
pub fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(e, "read", path.to_path_buf())),
    }
}

/// A write prepared next to its target but not yet visible.
///
/// Committing renames the temporary file over the target; dropping it
/// discards the content.
pub struct StagedWrite {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Atomically replace the target with the staged content
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| Error::io(e.error, "persist_temp_file", target.clone()))?;
        Ok(())
    }
}

/// Stage `content` for `path`, creating parent directories as needed.
///
/// A read-only target is rejected up front (a rename would silently replace
/// it). When `clear_read_only` is set the flag is cleared instead.
pub fn stage_write(path: &Path, content: &[u8], clear_read_only: bool) -> Result<StagedWrite> {
    let parent = path.parent().ok_or_else(|| StorageSystemError::InvalidFileSpec {
        spec: path.display().to_string(),
        reason: "path has no parent directory".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(|e| Error::io(e, "create_dir_all", parent.to_path_buf()))?;

    ensure_writable(path, clear_read_only)?;

    let mut temp = NamedTempFile::new_in(parent)
        .map_err(|e| Error::io(e, "create_temp_file", parent.to_path_buf()))?;
    temp.write_all(content)
        .map_err(|e| Error::io(e, "write_to_temp_file", temp.path().to_path_buf()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::io(e, "sync_temp_file", temp.path().to_path_buf()))?;

    Ok(StagedWrite {
        temp,
        target: path.to_path_buf(),
    })
}

/// Write `content` to `path` atomically (temp file + rename)
pub fn write_atomically(path: &Path, content: &[u8], clear_read_only: bool) -> Result<()> {
    stage_write(path, content, clear_read_only)?.commit()
}

fn ensure_writable(path: &Path, clear_read_only: bool) -> Result<()> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(e, "metadata", path.to_path_buf())),
    };
    let mut permissions = metadata.permissions();
    if !permissions.readonly() {
        return Ok(());
    }
    if !clear_read_only {
        return Err(StorageSystemError::ReadOnly(path.to_path_buf()).into());
    }
    log::warn!("Clearing read-only flag of {}", path.display());
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions).map_err(|e| Error::io(e, "set_permissions", path.to_path_buf()))
}

/// Delete a file; returns whether something was removed
pub fn delete_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(e, "remove_file", path.to_path_buf())),
    }
}

/// Remove `dir` if it exists and has no entries at all
pub fn remove_dir_if_empty(dir: &Path) -> Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Ok(false);
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::io(e, "read_dir", dir.to_path_buf())),
    }
    fs::remove_dir(dir).map_err(|e| Error::io(e, "remove_dir", dir.to_path_buf()))?;
    log::debug!("Removed empty directory {}", dir.display());
    Ok(true)
}

/// List regular files directly inside `dir` (sorted); a missing directory is empty
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(e, "read_dir", dir.to_path_buf())),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(e, "read_dir_entry", dir.to_path_buf()))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Rename a file, creating the target's parent directory
pub fn rename_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(e, "create_dir_all", parent.to_path_buf()))?;
    }
    fs::rename(from, to).map_err(|e| Error::io(e, "rename", from.to_path_buf()))
}

/// Hidden entries (dot-files) do not count as user content
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// File name of `path` as UTF-8, if it has one
pub fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// Turn an arbitrary name into a portable file name stem.
///
/// Path separators, characters reserved on common file systems and control
/// characters become `_`; trailing dots and spaces are dropped.
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = sanitized.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}
