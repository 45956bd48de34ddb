//! Atomic Writer (spec §4.7): write to a sibling temp file, optionally
//! back up the original, validate the new bytes decode, then rename into
//! place. Adapted from the teacher's `pipeline::write_atomic`, which did the
//! temp-file/rename dance but had no backup or validation step.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::Builder as TempFileBuilder;

use crate::model::{BackupRecord, ImageFormat};

/// Output filenames are capped at this many bytes (spec §4.7, long-filename
/// edge case) before the extension, to stay well under common filesystem
/// limits even after adding a collision suffix.
pub const MAX_STEM_LEN: usize = 80;

pub fn truncate_stem(stem: &str) -> String {
    if stem.len() <= MAX_STEM_LEN {
        return stem.to_string();
    }
    stem.chars().take(MAX_STEM_LEN).collect()
}

/// Encodes `original`'s path relative to `common_root` into a single
/// path-safe filename (separators become `_`), suffixed `.bak` (spec §4.6:
/// `backup_dir/<path-encoded-name>.bak`).
fn encode_backup_name(original: &Path, common_root: &Path) -> String {
    let relative = original.strip_prefix(common_root).unwrap_or(original);
    let encoded: String = relative
        .to_string_lossy()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
        .collect();
    format!("{encoded}.bak")
}

/// Copies `original` into a single flat file under `backup_dir`, named by
/// `encode_backup_name`, unless a backup already exists there
/// (first-write-wins, so re-running a failed batch never clobbers the
/// pristine original).
pub fn backup_original(original: &Path, common_root: &Path, backup_dir: &Path) -> Result<BackupRecord> {
    let backup_path = backup_dir.join(encode_backup_name(original, common_root));
    fs::create_dir_all(backup_dir).with_context(|| format!("creating backup dir {}", backup_dir.display()))?;
    if !backup_path.exists() {
        fs::copy(original, &backup_path)
            .with_context(|| format!("backing up {} to {}", original.display(), backup_path.display()))?;
    }
    Ok(BackupRecord {
        original_path: original.to_path_buf(),
        backup_path,
        remove_on_restore: false,
    })
}

/// Writes `data` to `path` via a sibling temp file and rename. When `format`
/// is given, the bytes are decoded back before the rename commits, so a
/// corrupt encoder output never overwrites a good original.
pub fn write_atomic(path: &Path, data: &[u8], overwrite: bool, format: Option<ImageFormat>) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("cannot determine parent directory for {}", path.display()))?;

    if !parent.exists() {
        fs::create_dir_all(parent).with_context(|| format!("creating output directory {}", parent.display()))?;
    }

    if let Some(format) = format {
        validate_decodes(data, format).with_context(|| format!("validating encoded output for {}", path.display()))?;
    }

    let mut temp_file = TempFileBuilder::new()
        .prefix(".pixelforge-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("creating temporary file in {}", parent.display()))?;

    temp_file
        .write_all(data)
        .with_context(|| format!("writing temporary output for {}", path.display()))?;
    temp_file
        .flush()
        .with_context(|| format!("flushing temporary file for {}", path.display()))?;

    if overwrite && path.exists() {
        fs::remove_file(path).with_context(|| format!("removing existing file {}", path.display()))?;
    }

    temp_file
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("persisting output {}", path.display()))?;

    Ok(())
}

fn validate_decodes(data: &[u8], format: ImageFormat) -> Result<()> {
    match format {
        ImageFormat::WebP => {
            webp::Decoder::new(data)
                .decode()
                .ok_or_else(|| anyhow!("webp output failed to decode"))?;
        }
        _ => {
            image::load_from_memory(data).context("output failed to decode")?;
        }
    }
    Ok(())
}

/// Resolves a `-2`, `-3`, ... suffix when `candidate` already exists and the
/// caller isn't in overwrite mode (spec §4.6, collision policy).
pub fn resolve_collision(candidate: PathBuf, overwrite: bool) -> PathBuf {
    if overwrite || !candidate.exists() {
        return candidate;
    }
    let parent = candidate.parent().unwrap_or_else(|| Path::new("."));
    let stem = candidate
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();
    let ext = candidate.extension().and_then(|e| e.to_str()).unwrap_or("").to_string();

    let mut n = 2;
    loop {
        let name = if ext.is_empty() {
            format!("{stem}-{n}")
        } else {
            format!("{stem}-{n}.{ext}")
        };
        let next = parent.join(name);
        if !next.exists() {
            return next;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::fixture::PathChild;

    #[test]
    fn truncate_stem_caps_length() {
        let long = "a".repeat(200);
        assert_eq!(truncate_stem(&long).len(), MAX_STEM_LEN);
    }

    #[test]
    fn resolve_collision_increments_suffix() {
        let temp = TempDir::new().unwrap();
        let file = temp.child("photo.jpg");
        std::fs::write(file.path(), b"x").unwrap();
        let resolved = resolve_collision(file.path().to_path_buf(), false);
        assert_eq!(resolved.file_name().unwrap().to_str().unwrap(), "photo-2.jpg");
    }

    #[test]
    fn backup_original_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let root = temp.child("src");
        std::fs::create_dir_all(root.path()).unwrap();
        let file = root.child("photo.jpg");
        std::fs::write(file.path(), b"original bytes").unwrap();
        let backup_dir = temp.child("backup");

        let record = backup_original(file.path(), root.path(), backup_dir.path()).unwrap();
        std::fs::write(file.path(), b"modified bytes").unwrap();
        let record2 = backup_original(file.path(), root.path(), backup_dir.path()).unwrap();

        assert_eq!(record.backup_path, record2.backup_path);
        assert_eq!(std::fs::read(&record2.backup_path).unwrap(), b"original bytes");
    }
}
