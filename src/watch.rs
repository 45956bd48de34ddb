//! Watch Service (spec §4.12). Observes configured folders with `notify`,
//! gates newly seen files behind a stability check (size stops changing
//! across consecutive polls), then hands stable files to the same job
//! pipeline a manual run uses. Retries failures with backoff instead of
//! dropping them, bounded by the processed index so restarts don't replay
//! everything already done.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};

use crate::model::ImageFormat;
use crate::state::{FileFingerprint, ProcessedIndex, WatchConfig};

const STABILITY_POLL: Duration = Duration::from_millis(500);
const STABILITY_CONSECUTIVE: u32 = 3;
const STABILITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct PendingFile {
    last_size: u64,
    stable_count: u32,
    first_seen: Instant,
}

pub struct RetryEntry {
    pub path: PathBuf,
    pub attempts: u32,
    pub next_attempt: Instant,
}

/// Exponential backoff for a failed watch-triggered job: 3s, 6s, then give
/// up and leave it for the next manual run (spec §4.12: "exponential
/// backoff, 3s x attempt, up to 2 attempts").
fn backoff_delay(attempts: u32) -> Option<Duration> {
    match attempts {
        1 | 2 => Some(Duration::from_secs(3 * attempts as u64)),
        _ => None,
    }
}

pub struct StabilityGate {
    pending: HashMap<PathBuf, PendingFile>,
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self { pending: HashMap::new() }
    }
}

impl StabilityGate {
    /// Call on every notify event for `path`. Returns `true` once the file
    /// has held the same size across `STABILITY_CONSECUTIVE` polls, or has
    /// exceeded `STABILITY_TIMEOUT` (treated as stable rather than stuck
    /// forever, per spec §4.12's documented fallback).
    pub fn poll(&mut self, path: &Path) -> bool {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let entry = self.pending.entry(path.to_path_buf()).or_insert(PendingFile {
            last_size: size,
            stable_count: 0,
            first_seen: Instant::now(),
        });

        if entry.first_seen.elapsed() > STABILITY_TIMEOUT {
            self.pending.remove(path);
            return true;
        }

        if size == entry.last_size && size > 0 {
            entry.stable_count += 1;
        } else {
            entry.last_size = size;
            entry.stable_count = 0;
        }

        if entry.stable_count >= STABILITY_CONSECUTIVE {
            self.pending.remove(path);
            true
        } else {
            false
        }
    }
}

/// Filters a raw watcher event before it reaches the stability gate (spec
/// §4.12 points 1/5): unsupported extensions, hidden/system/partial-download
/// files, and anything over the configured size cap.
pub fn is_ignored(path: &Path, config: &WatchConfig) -> bool {
    if ImageFormat::from_path(path).is_none() {
        return true;
    }
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    if name.starts_with('.') || name.starts_with('~') || name.starts_with("._") {
        return true;
    }
    const IGNORED_SUFFIXES: &[&str] = &[".part", ".crdownload", ".download"];
    if IGNORED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        return true;
    }
    let size_cap_bytes = config.global.max_file_size_mb * 1024 * 1024;
    std::fs::metadata(path)
        .map(|m| m.len() > size_cap_bytes)
        .unwrap_or(false)
}

/// Starts a `notify` watcher over every enabled folder in `config`. Caller
/// polls `rx` for raw paths; stability gating and dedup against
/// `processed_index` happen in `drain_stable`, kept separate so tests can
/// drive the gate without a real filesystem watcher.
pub fn start_watcher(config: &WatchConfig) -> notify::Result<(notify::RecommendedWatcher, std::sync::mpsc::Receiver<PathBuf>)> {
    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            for path in event.paths {
                let _ = tx.send(path);
            }
        }
    })?;

    for folder in &config.folders {
        if folder.enabled {
            watcher.watch(&folder.path, RecursiveMode::Recursive)?;
        }
    }

    Ok((watcher, rx))
}

/// Drains pending paths from the watcher channel for up to `timeout`,
/// filtering ignored files (spec §4.12 points 1/5: extension allowlist,
/// hidden/system/temp-suffix files and the size cap, via `is_ignored`)
/// before they ever reach the stability gate, and returns those considered
/// ready to process (excluding anything already in `index`).
pub fn drain_stable(
    rx: &std::sync::mpsc::Receiver<PathBuf>,
    gate: &mut StabilityGate,
    index: &ProcessedIndex,
    config: &WatchConfig,
    timeout: Duration,
) -> Vec<PathBuf> {
    let mut ready = Vec::new();
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match rx.recv_timeout(remaining.min(STABILITY_POLL)) {
            Ok(path) => {
                if is_ignored(&path, config) {
                    continue;
                }
                if gate.poll(&path) {
                    if let Ok(fingerprint) = FileFingerprint::compute(&path) {
                        if !index.is_already_processed(&path, &fingerprint) {
                            ready.push(path);
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    ready
}

/// Queues a failed job for retry, or drops it once the backoff schedule is
/// exhausted (spec §4.12: failures are logged, not silently discarded).
pub fn schedule_retry(queue: &mut Vec<RetryEntry>, path: PathBuf, attempts: u32) {
    if let Some(delay) = backoff_delay(attempts) {
        queue.push(RetryEntry {
            path,
            attempts,
            next_attempt: Instant::now() + delay,
        });
    } else {
        log::warn!("giving up on watch-triggered job for {} after {attempts} attempts", path.display());
    }
}

pub fn due_retries(queue: &mut Vec<RetryEntry>) -> Vec<PathBuf> {
    let now = Instant::now();
    let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(queue).into_iter().partition(|e| e.next_attempt <= now);
    *queue = pending;
    due.into_iter().map(|e| e.path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stability_gate_requires_consecutive_unchanged_polls() {
        let mut gate = StabilityGate::default();
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("growing.bin");
        use assert_fs::fixture::PathChild;
        std::fs::write(file.path(), b"a").unwrap();

        assert!(!gate.poll(file.path()));
        assert!(!gate.poll(file.path()));
        assert!(gate.poll(file.path()));
    }

    #[test]
    fn retry_queue_expires_after_two_attempts() {
        let mut queue = Vec::new();
        schedule_retry(&mut queue, PathBuf::from("/tmp/a.jpg"), 3);
        assert!(queue.is_empty());
        schedule_retry(&mut queue, PathBuf::from("/tmp/a.jpg"), 1);
        assert_eq!(queue.len(), 1);
    }
}
