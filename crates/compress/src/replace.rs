//! Temp-file naming and replacement of the original upload.
//!
//! [`reserve`] claims a sibling temp file that did not exist before, the
//! encoder writes and fsyncs it, and [`commit`] renames it over the original
//! in one step, so a crash leaves either the old file or the new one at the
//! original path, never neither. An existing file is never reused as a temp.

use crate::error::{CompressError, Result};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix inserted before the extension of the temp file.
pub const TEMP_SUFFIX: &str = "_compressed";

/// Sibling temp path for `original`: `photo.jpg` → `photo_compressed.jpg`.
///
/// # Example
/// ```
/// use std::path::Path;
/// use upload_compress::replace::temp_path_for;
///
/// assert_eq!(
///     temp_path_for(Path::new("/uploads/photo.jpg")),
///     Path::new("/uploads/photo_compressed.jpg"),
/// );
/// ```
pub fn temp_path_for(original: &Path) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match original.extension() {
        Some(ext) => format!("{}{}.{}", stem, TEMP_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, TEMP_SUFFIX),
    };
    original.with_file_name(name)
}

/// Claim an empty sibling temp file for `original` and return its path.
///
/// Prefers [`temp_path_for`]. When that name is already taken (another upload,
/// or a leftover from an interrupted run) a unique sibling such as
/// `photo.k3Jd9a_compressed.png` is created instead. The existing file is left
/// untouched in both cases.
pub fn reserve(original: &Path) -> Result<PathBuf> {
    let preferred = temp_path_for(original);
    match OpenOptions::new().write(true).create_new(true).open(&preferred) {
        Ok(_) => return Ok(preferred),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %preferred.display(), "temp name taken, using a unique sibling");
        }
        Err(e) => return Err(CompressError::storage(&preferred, e)),
    }

    let parent = original
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = match original.extension() {
        Some(ext) => format!("{}.{}", TEMP_SUFFIX, ext.to_string_lossy()),
        None => TEMP_SUFFIX.to_string(),
    };

    let file = tempfile::Builder::new()
        .prefix(&format!("{}.", stem))
        .suffix(&suffix)
        .tempfile_in(parent)
        .map_err(|e| CompressError::storage(parent, e))?;
    let (_, path) = file
        .keep()
        .map_err(|e| CompressError::storage(parent, e.error))?;
    Ok(path)
}

/// Whether `path` looks like a temp file left behind next to its source.
///
/// True for `photo_compressed.png` or `photo.k3Jd9a_compressed.png` when
/// `photo.png` sits in the same directory.
pub fn is_leftover_temp(path: &Path) -> bool {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return false;
    };
    let Some(base) = stem.strip_suffix(TEMP_SUFFIX).filter(|b| !b.is_empty()) else {
        return false;
    };

    let mut candidates = vec![base];
    if let Some((source_stem, _random)) = base.rsplit_once('.') {
        candidates.push(source_stem);
    }

    candidates.into_iter().any(|source_stem| {
        let name = match path.extension() {
            Some(ext) => format!("{}.{}", source_stem, ext.to_string_lossy()),
            None => source_stem.to_string(),
        };
        path.with_file_name(name).is_file()
    })
}

/// Promote a fully written temp file to the original's path.
///
/// Rename failure is fatal; the temp file is removed before the error is
/// returned.
pub fn commit(temp: &Path, original: &Path) -> Result<()> {
    if let Err(e) = std::fs::rename(temp, original) {
        discard(temp);
        return Err(CompressError::storage(original, e));
    }
    sync_parent(original);
    debug!(path = %original.display(), "replaced original");
    Ok(())
}

/// Best-effort removal of a temp file.
pub fn discard(temp: &Path) {
    match std::fs::remove_file(temp) {
        Ok(()) => debug!(path = %temp.display(), "removed temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %temp.display(), error = %e, "failed to remove temp file"),
    }
}

/// Persist the rename by syncing the containing directory.
#[cfg(unix)]
fn sync_parent(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = std::fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        warn!(dir = %parent.display(), error = %e, "failed to sync directory after rename");
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}
