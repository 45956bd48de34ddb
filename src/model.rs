//! Core data model: `RunRequest`, `FileJob`, `Candidate`, `MetricResult`,
//! `BackupRecord`, `LastRunState` (spec §3). `ProcessedIndex` and
//! `WatchConfig` live in `state.rs` alongside their persistence helpers.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::settings::{EffectiveSettings, RunMode};

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: String,
    pub inputs: Vec<PathBuf>,
    pub mode: RunMode,
    pub settings: EffectiveSettings,
}

/// Image format as recognized by the pipeline (spec §6, supported
/// extensions). TIFF is decode-only; it is never produced as an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Tiff,
}

impl ImageFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "webp" => Some(ImageFormat::WebP),
            "tif" | "tiff" => Some(ImageFormat::Tiff),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::WebP => "webp",
            ImageFormat::Tiff => "tiff",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub buffer: Vec<u8>,
    pub format: ImageFormat,
    pub quality_label: String,
    pub mssim: Option<f64>,
    pub banding_risk: Option<f64>,
}

impl Candidate {
    pub fn size(&self) -> u64 {
        self.buffer.len() as u64
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricResult {
    pub mssim: f64,
    pub edge_ssim: f64,
    pub banding_risk: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub remove_on_restore: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastRunState {
    pub run_id: String,
    pub backup_dir: PathBuf,
    pub backup_records: Vec<BackupRecord>,
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Skipped,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Analyzing,
    Decoding,
    Transforming,
    Encoding,
    Writing,
    Verifying,
    Cleaning,
}

impl JobStage {
    pub const ORDER: [JobStage; 7] = [
        JobStage::Analyzing,
        JobStage::Decoding,
        JobStage::Transforming,
        JobStage::Encoding,
        JobStage::Writing,
        JobStage::Verifying,
        JobStage::Cleaning,
    ];

    pub fn percent(self) -> u8 {
        let idx = Self::ORDER.iter().position(|s| *s == self).unwrap_or(0);
        (((idx + 1) * 100) / Self::ORDER.len()) as u8
    }
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub output_path: Option<PathBuf>,
    pub original_bytes: u64,
    pub output_bytes: u64,
    pub bytes_saved: u64,
    pub mssim: Option<f64>,
    pub reason: Option<String>,
    pub error: Option<PipelineError>,
    pub backup_record: Option<BackupRecord>,
}

impl JobResult {
    pub fn success(output_path: PathBuf, original_bytes: u64, output_bytes: u64, mssim: Option<f64>) -> Self {
        Self {
            output_path: Some(output_path),
            original_bytes,
            output_bytes,
            bytes_saved: original_bytes.saturating_sub(output_bytes),
            mssim,
            reason: None,
            error: None,
            backup_record: None,
        }
    }

    pub fn skipped(original_bytes: u64, reason: impl Into<String>) -> Self {
        Self {
            output_path: None,
            original_bytes,
            output_bytes: 0,
            bytes_saved: 0,
            mssim: None,
            reason: Some(reason.into()),
            error: None,
            backup_record: None,
        }
    }

    pub fn failed(original_bytes: u64, error: PipelineError) -> Self {
        Self {
            output_path: None,
            original_bytes,
            output_bytes: 0,
            bytes_saved: 0,
            mssim: None,
            reason: None,
            error: Some(error),
            backup_record: None,
        }
    }

    pub fn cancelled(original_bytes: u64) -> Self {
        Self {
            output_path: None,
            original_bytes,
            output_bytes: 0,
            bytes_saved: 0,
            mssim: None,
            reason: Some("cancelled".to_string()),
            error: None,
            backup_record: None,
        }
    }

    pub fn with_backup_record(mut self, record: Option<BackupRecord>) -> Self {
        self.backup_record = record;
        self
    }
}

/// A single image's lifecycle (spec §4.9). `status`/`stage` only ever move
/// forward; `result` is set exactly once, on entering a terminal status.
pub struct FileJob {
    pub id: u64,
    pub input_path: PathBuf,
    pub common_root: PathBuf,
    pub backup_dir: Option<PathBuf>,
    pub status: JobStatus,
    pub stage: Option<JobStage>,
    pub result: Option<JobResult>,
    pub started_at: Option<Instant>,
    pub stage_timings: Vec<(JobStage, Duration)>,
}

impl FileJob {
    pub fn new(id: u64, input_path: PathBuf, common_root: PathBuf, backup_dir: Option<PathBuf>) -> Self {
        Self {
            id,
            input_path,
            common_root,
            backup_dir,
            status: JobStatus::Queued,
            stage: None,
            result: None,
            started_at: None,
            stage_timings: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Queued);
        self.status = JobStatus::Running;
        self.started_at = Some(Instant::now());
    }

    pub fn enter_stage(&mut self, stage: JobStage) {
        debug_assert_eq!(self.status, JobStatus::Running);
        self.stage = Some(stage);
    }

    pub fn finish(&mut self, status: JobStatus, result: JobResult) {
        debug_assert!(matches!(
            status,
            JobStatus::Success | JobStatus::Skipped | JobStatus::Failed | JobStatus::Cancelled
        ));
        self.status = status;
        self.result = Some(result);
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Success | JobStatus::Skipped | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub total_files: usize,
    pub processed_files: usize,
    pub converted_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    pub cancelled_files: usize,
    pub total_original_bytes: u64,
    pub total_output_bytes: u64,
    pub total_saved_bytes: u64,
    pub elapsed_ms: u128,
    pub log_path: Option<PathBuf>,
    pub cancelled: bool,
    pub failures: Vec<(PathBuf, String)>,
}

/// One file's outcome as recorded in a run log (spec §6 run log schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub input_path: PathBuf,
    pub status: JobStatus,
    pub output_path: Option<PathBuf>,
    pub original_bytes: u64,
    pub output_bytes: u64,
    pub bytes_saved: u64,
    pub mssim: Option<f64>,
    pub reason: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl LogEntry {
    pub fn from_result(input_path: PathBuf, status: JobStatus, result: &JobResult) -> Self {
        Self {
            input_path,
            status,
            output_path: result.output_path.clone(),
            original_bytes: result.original_bytes,
            output_bytes: result.output_bytes,
            bytes_saved: result.bytes_saved,
            mssim: result.mssim,
            reason: result.reason.clone(),
            error_code: result.error.as_ref().map(|e| e.code.as_str().to_string()),
            error_message: result.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Persisted run log (spec §6: `<common_root>/.optimise-logs/<run_id>/optimise-log.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: String,
    pub mode: RunMode,
    pub settings: EffectiveSettings,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub cancelled: bool,
    pub summary: RunSummary,
    pub entries: Vec<LogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_percent_is_monotonic() {
        let mut last = 0;
        for stage in JobStage::ORDER {
            let pct = stage.percent();
            assert!(pct >= last);
            last = pct;
        }
        assert_eq!(JobStage::ORDER.last().unwrap().percent(), 100);
    }

    #[test]
    fn job_starts_queued_and_moves_forward() {
        let mut job = FileJob::new(1, "/tmp/a.png".into(), "/tmp".into(), None);
        assert_eq!(job.status, JobStatus::Queued);
        job.start();
        assert_eq!(job.status, JobStatus::Running);
        job.enter_stage(JobStage::Decoding);
        assert_eq!(job.stage, Some(JobStage::Decoding));
        job.finish(JobStatus::Success, JobResult::success("/tmp/out.png".into(), 100, 50, Some(0.998)));
        assert!(job.is_terminal());
    }
}
