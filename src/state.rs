//! Persisted app-data files (spec §6): `last-run.json`, `watch-config.json`,
//! `processed-index.json`. Each is a thin `serde_json` wrapper over the
//! corresponding model type, written atomically via `atomic_writer`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::atomic_writer::write_atomic;
use crate::model::LastRunState;
use crate::settings::EffectiveSettings;

pub fn load_last_run_state(app_data_dir: &Path) -> Result<Option<LastRunState>> {
    let path = app_data_dir.join("last-run.json");
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let state = serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(state))
}

pub fn save_last_run_state(app_data_dir: &Path, state: &LastRunState) -> Result<()> {
    fs::create_dir_all(app_data_dir)?;
    let path = app_data_dir.join("last-run.json");
    let data = serde_json::to_vec_pretty(state)?;
    write_atomic(&path, &data, true, None)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub size: u64,
    pub mtime_secs: u64,
    /// Hex-encoded SHA-1 of the first and last 1 MiB (spec glossary:
    /// Fingerprint), or the whole file when it is smaller than that window.
    pub partial_hash: String,
}

impl FileFingerprint {
    pub fn compute(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
        let size = metadata.len();
        let mtime_secs = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        use sha1::{Digest, Sha1};
        const WINDOW: u64 = 1024 * 1024;
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let mut hasher = Sha1::new();
        if data.len() as u64 <= WINDOW * 2 {
            hasher.update(&data);
        } else {
            hasher.update(&data[..WINDOW as usize]);
            hasher.update(&data[data.len() - WINDOW as usize..]);
        }
        let partial_hash = hex_encode(&hasher.finalize());

        Ok(Self {
            size,
            mtime_secs,
            partial_hash,
        })
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedIndex {
    pub version: u32,
    pub index: HashMap<String, FileFingerprint>,
}

impl Default for ProcessedIndex {
    fn default() -> Self {
        Self {
            version: 1,
            index: HashMap::new(),
        }
    }
}

impl ProcessedIndex {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let index = serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))?;
        Ok(index)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &data, true, None)
    }

    /// `true` when `path`'s current fingerprint matches a previously
    /// recorded one (spec §8, processed-index idempotence).
    pub fn is_already_processed(&self, path: &Path, current: &FileFingerprint) -> bool {
        self.index
            .get(&path.to_string_lossy().to_string())
            .map(|recorded| {
                recorded.size == current.size
                    && recorded.mtime_secs == current.mtime_secs
                    && recorded.partial_hash == current.partial_hash
            })
            .unwrap_or(false)
    }

    pub fn mark_processed(&mut self, path: &Path, fingerprint: FileFingerprint) {
        self.index
            .insert(path.to_string_lossy().to_string(), fingerprint);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedFolder {
    pub path: PathBuf,
    pub enabled: bool,
    pub override_settings: Option<EffectiveSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerBehavior {
    CreatedOnly,
    Modified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalWatchSettings {
    pub settings: EffectiveSettings,
    pub max_file_size_mb: u64,
    pub trigger_behavior: TriggerBehavior,
}

impl Default for GlobalWatchSettings {
    fn default() -> Self {
        Self {
            settings: EffectiveSettings::default(),
            max_file_size_mb: 200,
            trigger_behavior: TriggerBehavior::CreatedOnly,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub folders: Vec<WatchedFolder>,
    pub global: GlobalWatchSettings,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            global: GlobalWatchSettings::default(),
        }
    }
}

impl WatchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &data, true, None)
    }

    pub fn add_folder(&mut self, path: PathBuf) {
        let normalized = path.canonicalize().unwrap_or(path);
        if !self.folders.iter().any(|f| f.path == normalized) {
            self.folders.push(WatchedFolder {
                path: normalized,
                enabled: true,
                override_settings: None,
            });
        }
    }

    pub fn remove_folder(&mut self, path: &Path) {
        self.folders.retain(|f| f.path != path);
    }

    pub fn toggle_folder(&mut self, path: &Path, enabled: bool) {
        if let Some(folder) = self.folders.iter_mut().find(|f| f.path == path) {
            folder.enabled = enabled;
        }
    }
}

/// App-data directory convention: `<common_root>/.optimise-logs` for run
/// logs, and a per-watch-root `.optimise-index.json` / global
/// `watch-config.json` for index/config persistence.
pub fn processed_index_path(watch_root: &Path) -> PathBuf {
    watch_root.join(".optimise-tmp").join("processed-index.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::fixture::PathChild;
    use std::io::Write;

    #[test]
    fn fingerprint_changes_when_content_changes() {
        let temp = TempDir::new().unwrap();
        let file = temp.child("a.bin");
        std::fs::write(file.path(), b"hello world").unwrap();
        let a = FileFingerprint::compute(file.path()).unwrap();

        let mut f = fs::OpenOptions::new().append(true).open(file.path()).unwrap();
        f.write_all(b"!").unwrap();
        drop(f);
        let b = FileFingerprint::compute(file.path()).unwrap();

        assert_ne!(a.partial_hash, b.partial_hash);
    }

    #[test]
    fn processed_index_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.child("idx.json");
        let file = temp.child("a.png");
        std::fs::write(file.path(), b"fake png bytes").unwrap();

        let mut index = ProcessedIndex::default();
        let fp = FileFingerprint::compute(file.path()).unwrap();
        index.mark_processed(file.path(), fp.clone());
        index.save(path.path()).unwrap();

        let loaded = ProcessedIndex::load(path.path()).unwrap();
        assert!(loaded.is_already_processed(file.path(), &fp));
    }
}
