//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Listing the files directly inside a directory (non-recursive)
//! - Copying files with overwrite and modification time preservation
//! - Creating destination directories

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// List the regular files directly inside `dir`, sorted by path.
///
/// Subdirectories are ignored. Symlinks count when they point at a file;
/// dangling links are skipped with a warning.
///
/// # Errors
/// Returns `EngineError::FileAccess` if the directory or one of its entries
/// cannot be read.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let entries = fs::read_dir(dir).map_err(|e| EngineError::file_access(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::file_access(dir, e))?;
        let path = entry.path();
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => log::warn!("skipping {}: {}", path.display(), e),
        }
    }

    files.sort();
    Ok(files)
}

/// Number of files `list_files` would return.
pub fn count_files(dir: &Path) -> Result<usize, EngineError> {
    list_files(dir).map(|files| files.len())
}

/// Destination path for `source` inside `destination_dir`.
pub fn destination_for(source: &Path, destination_dir: &Path) -> Result<PathBuf, EngineError> {
    let name = source.file_name().ok_or_else(|| {
        EngineError::file_access(
            source,
            io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })?;
    Ok(destination_dir.join(name))
}

/// True when both paths exist and resolve to the same file or directory.
///
/// Catches `.`/`..` segments, symlinks and, on Unix, hard links.
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    let (Ok(meta_a), Ok(meta_b)) = (fs::metadata(a), fs::metadata(b)) else {
        return false;
    };
    if same_inode(&meta_a, &meta_b) {
        return true;
    }
    matches!(
        (fs::canonicalize(a), fs::canonicalize(b)),
        (Ok(a), Ok(b)) if a == b
    )
}

#[cfg(unix)]
fn same_inode(a: &fs::Metadata, b: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_inode(_: &fs::Metadata, _: &fs::Metadata) -> bool {
    false
}

/// Copy a file, overwriting `dst` if it exists, and keep the source mtime.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns `EngineError::FileAccess` naming whichever side failed, or when
/// `dst` is `src` itself (creating it would truncate the source).
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    if is_same_file(src, dst) {
        return Err(EngineError::file_access(
            dst,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "source and destination are the same file",
            ),
        ));
    }

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::file_access(src, e))?;
    let src_mtime = src_file
        .metadata()
        .map_err(|e| EngineError::file_access(src, e))?
        .modified()
        .ok();

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::file_access(dst, e))?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::file_access(dst, e)
        } else {
            EngineError::file_access(src, e)
        }
    })?;
    drop(dst_file);

    if let Some(mtime) = src_mtime {
        if let Err(e) = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime)) {
            log::debug!("could not preserve mtime on {}: {}", dst.display(), e);
        }
    }

    Ok(bytes_copied)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns `EngineError::FileAccess` if the parent exists but is not a
/// directory, or cannot be created.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Ensure `dir` exists as a directory, creating it recursively.
pub fn ensure_dir(dir: &Path) -> Result<(), EngineError> {
    match fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::file_access(
            dir,
            io::Error::new(io::ErrorKind::InvalidInput, "path exists but is not a directory"),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| EngineError::file_access(dir, e))
        }
        Err(e) => Err(EngineError::file_access(dir, e)),
    }
}
