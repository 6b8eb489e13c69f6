//! Filesystem utilities.
//!
//! Crash-tolerant writes for settings and stored clips, plus identifier checks
//! for anything that ends up as part of a file name.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::{CoreError, CoreResult};

/// Rejects identifiers that could escape the directory they are joined onto.
///
/// Empty ids, `..`, path separators, drive markers and control characters are
/// all refused.
pub fn validate_path_id_component(id: &str, label: &str) -> CoreResult<()> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CoreError::ValidationError(format!(
            "{label} is empty or contains only whitespace"
        )));
    }
    if trimmed.contains("..")
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains(':')
    {
        return Err(CoreError::ValidationError(format!(
            "Invalid {label}: contains path traversal characters"
        )));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(CoreError::ValidationError(format!(
            "Invalid {label}: contains control characters"
        )));
    }
    Ok(())
}

/// Write bytes to `path` using an atomic replace pattern.
///
/// The bytes land in a sibling `.tmp` file which is synced and then renamed
/// over the destination.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = sibling_with_suffix(path, "tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    replace_with(path, &tmp_path)
}

/// Write a JSON file atomically with pretty formatting.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

/// Removes a file if present. Returns whether something was deleted.
pub fn remove_file_if_exists(path: &Path) -> CoreResult<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CoreError::IoError(e)),
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| suffix.to_string());
    path.with_file_name(format!("{file_name}.{suffix}"))
}

fn replace_with(dest: &Path, src_tmp: &Path) -> CoreResult<()> {
    if !dest.exists() {
        std::fs::rename(src_tmp, dest)?;
        return Ok(());
    }

    // rename-over-existing is not portable; move the old file aside first.
    let bak = sibling_with_suffix(dest, "bak");
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(src_tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::rename(&bak, dest);
            let _ = std::fs::remove_file(src_tmp);
            Err(CoreError::IoError(e))
        }
    }
}
