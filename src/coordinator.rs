//! Run Coordinator (spec §4.11). Resolves input files (generalizing the
//! teacher's `resolve_inputs`/`collect_from_directory` from a single PNG
//! extension to all four supported formats), computes a common root for
//! backups, dispatches jobs across the Worker Pool, and persists
//! `LastRunState` for a later `restore`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use walkdir::{DirEntry, WalkDir};

use crate::job::{run_job, JobContext};
use crate::model::{FileJob, ImageFormat, JobStatus, LastRunState, LogEntry, RunLog, RunSummary};
use crate::pool::{new_cancel_flag, run_pool, CancelFlag};
use crate::settings::{EffectiveSettings, OutputMode, RunMode};
use crate::state::save_last_run_state;
use crate::ui::{FileOutcome, ProgressBus, ProgressEvent};

/// Directory names a directory walk never descends into (spec §6).
const IGNORED_DIR_NAMES: &[&str] =
    &["node_modules", ".git", ".optimise-backup", ".optimise-tmp", "Optimized", "Originals Backup", ".optimise-logs"];

/// File names skipped outright regardless of extension (spec §6).
const IGNORED_FILE_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "Desktop.ini"];

/// Suffixes of in-progress downloads, never treated as a finished source
/// file (spec §6, "partial-download suffixes").
const IGNORED_FILE_SUFFIXES: &[&str] = &[".part", ".crdownload", ".download"];

fn is_ignored_entry(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        return IGNORED_DIR_NAMES.contains(&name.as_ref());
    }
    if IGNORED_FILE_NAMES.contains(&name.as_ref()) {
        return true;
    }
    if name.starts_with("._") || name.starts_with('~') || name.starts_with('.') {
        return true;
    }
    IGNORED_FILE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

pub struct RunOptions<'a> {
    pub inputs: Vec<PathBuf>,
    pub mode: RunMode,
    pub settings: EffectiveSettings,
    pub overwrite: bool,
    pub dry_run: bool,
    pub app_data_dir: PathBuf,
    pub bus: Option<&'a ProgressBus>,
}

pub fn resolve_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            collect_from_directory(input, &mut files);
        } else if is_supported(input) {
            files.push(input.canonicalize().unwrap_or_else(|_| input.clone()));
        }
    }

    let mut seen: HashSet<PathBuf> = HashSet::new();
    files.retain(|path| seen.insert(path.clone()));
    files
}

fn collect_from_directory(dir: &Path, files: &mut Vec<PathBuf>) {
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_ignored_entry(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if is_supported(path) {
            files.push(path.to_path_buf());
        }
    }
}

fn is_supported(path: &Path) -> bool {
    ImageFormat::from_path(path).is_some()
}

/// Longest shared ancestor of every input path; backups mirror each file's
/// path relative to this root (spec §4.7/§4.11).
pub fn common_root(paths: &[PathBuf]) -> PathBuf {
    let mut iter = paths.iter();
    let Some(first) = iter.next() else {
        return PathBuf::from(".");
    };
    let mut root: Vec<_> = first.components().collect();
    for path in iter {
        let components: Vec<_> = path.components().collect();
        let shared = root.iter().zip(components.iter()).take_while(|(a, b)| a == b).count();
        root.truncate(shared);
    }
    if root.is_empty() {
        PathBuf::from(".")
    } else {
        root.iter().collect()
    }
}

pub fn execute(run_id: String, options: RunOptions<'_>, cancel: CancelFlag) -> Result<RunSummary> {
    let started = Instant::now();
    let started_at = Utc::now();
    let targets = resolve_inputs(&options.inputs);

    let mut summary = RunSummary {
        run_id: run_id.clone(),
        total_files: targets.len(),
        ..RunSummary::default()
    };

    if targets.is_empty() {
        summary.elapsed_ms = started.elapsed().as_millis();
        return Ok(summary);
    }

    let root = common_root(&targets);
    let backup_dir = root.join("Originals Backup").join(&run_id);
    let log_dir = root.join(".optimise-logs").join(&run_id);
    let log_path = log_dir.join("optimise-log.json");

    let paths_by_id: HashMap<u64, PathBuf> =
        targets.iter().enumerate().map(|(i, path)| (i as u64, path.clone())).collect();

    // Backups only make sense for replace mode (spec §4.11 step 3): subfolder
    // mode never touches the original, so there's nothing to restore from.
    let job_backup_dir = if options.settings.output_mode == OutputMode::Replace {
        Some(backup_dir.clone())
    } else {
        None
    };
    let jobs: Vec<FileJob> = targets
        .iter()
        .enumerate()
        .map(|(i, path)| FileJob::new(i as u64, path.clone(), root.clone(), job_backup_dir.clone()))
        .collect();

    let worker_count = options.settings.concurrency.resolve();
    let ctx = JobContext {
        settings: &options.settings,
        mode: options.mode,
        overwrite: options.overwrite,
        dry_run: options.dry_run,
    };
    let bus = options.bus;

    let outcome = run_pool(jobs, worker_count, cancel.clone(), |job, cancel| {
        let path = job.input_path.clone();
        if let Some(bus) = bus {
            bus.emit(ProgressEvent::FileStarted { path: path.clone() });
        }
        let started_at = Instant::now();
        let (status, result) = run_job(job, cancel, &ctx);
        if let Some(bus) = bus {
            match status {
                JobStatus::Failed => {
                    let message = result.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
                    bus.emit(ProgressEvent::FileFailed { path, message });
                }
                JobStatus::Success | JobStatus::Skipped | JobStatus::Cancelled => {
                    bus.emit(ProgressEvent::FileFinished {
                        path,
                        outcome: FileOutcome {
                            original_size: result.original_bytes,
                            output_size: result.output_bytes,
                            elapsed: started_at.elapsed(),
                            notes: result.reason.clone(),
                        },
                    });
                }
                JobStatus::Queued | JobStatus::Running => {}
            }
        }
        (status, result)
    });

    let mut backup_records = Vec::new();
    let mut entries = Vec::with_capacity(outcome.results.len());
    for (id, status, result) in &outcome.results {
        summary.processed_files += 1;
        match status {
            JobStatus::Success => {
                summary.converted_files += 1;
                summary.total_original_bytes += result.original_bytes;
                summary.total_output_bytes += result.output_bytes;
                summary.total_saved_bytes += result.bytes_saved;
            }
            JobStatus::Skipped => summary.skipped_files += 1,
            JobStatus::Failed => {
                summary.failed_files += 1;
                if let Some(error) = &result.error {
                    summary.failures.push((result.output_path.clone().unwrap_or_default(), error.to_string()));
                }
            }
            JobStatus::Cancelled => summary.cancelled_files += 1,
            JobStatus::Queued | JobStatus::Running => {}
        }
        if let Some(record) = &result.backup_record {
            backup_records.push(record.clone());
        }
        let input_path = paths_by_id.get(id).cloned().unwrap_or_default();
        entries.push(LogEntry::from_result(input_path, *status, result));
    }

    summary.cancelled = summary.cancelled_files > 0;
    summary.elapsed_ms = started.elapsed().as_millis();
    summary.log_path = Some(log_path.clone());

    if let Some(bus) = bus {
        bus.emit(ProgressEvent::RunFinished { total: summary.total_files, processed: summary.processed_files });
    }

    // Scan/Preview run through this same path with dry_run set; neither is
    // meant to leave a trace (spec §6's ScanPaths/Preview are read-only).
    if !options.dry_run {
        let run_log = RunLog {
            run_id: run_id.clone(),
            mode: options.mode,
            settings: options.settings.clone(),
            started_at,
            finished_at: Utc::now(),
            cancelled: summary.cancelled,
            summary: summary.clone(),
            entries,
        };
        write_run_log(&log_dir, &log_path, &run_log).context("writing run log")?;

        let state = LastRunState {
            run_id,
            backup_dir,
            backup_records,
            log_path,
        };
        save_last_run_state(&options.app_data_dir, &state).context("persisting last-run state")?;
    }

    Ok(summary)
}

fn write_run_log(log_dir: &Path, log_path: &Path, log: &RunLog) -> Result<()> {
    fs::create_dir_all(log_dir).with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let json = serde_json::to_vec_pretty(log).context("serializing run log")?;
    fs::write(log_path, json).with_context(|| format!("writing run log {}", log_path.display()))?;
    Ok(())
}

pub fn new_run_cancel_flag() -> CancelFlag {
    new_cancel_flag()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_root_finds_shared_ancestor() {
        let paths = vec![PathBuf::from("/a/b/c.jpg"), PathBuf::from("/a/b/d/e.png")];
        assert_eq!(common_root(&paths), PathBuf::from("/a/b"));
    }

    #[test]
    fn common_root_of_single_path_is_its_parent_chain() {
        let paths = vec![PathBuf::from("/a/b/c.jpg")];
        assert_eq!(common_root(&paths), PathBuf::from("/a/b/c.jpg"));
    }
}
