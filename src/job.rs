//! File Job orchestration (spec §4.9): drives one file through
//! analyzing -> decoding -> transforming -> encoding -> writing ->
//! verifying -> cleaning, producing the `JobResult` the Worker Pool and
//! Run Coordinator report on.

use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;

use crate::analyzer::{self, ContentKind};
use crate::atomic_writer::{backup_original, write_atomic};
use crate::candidates::{build_jpeg_candidate, build_png_candidate, build_webp_candidate};
use crate::errors::PipelineError;
use crate::metadata;
use crate::model::{BackupRecord, FileJob, ImageFormat, JobResult, JobStage, JobStatus};
use crate::path_planner::finalize_output_path;
use crate::pool::CancelFlag;
use crate::settings::{EffectiveSettings, RunMode};

pub struct JobContext<'a> {
    pub settings: &'a EffectiveSettings,
    pub mode: RunMode,
    pub overwrite: bool,
    pub dry_run: bool,
}

/// Runs the full pipeline for a single job. Returns the terminal status and
/// result the caller should record on the `FileJob`; never panics on a bad
/// input file, since a single corrupt image must not take the whole batch
/// down (spec §4.9 failure isolation).
pub fn run_job(job: &mut FileJob, cancel: &CancelFlag, ctx: &JobContext<'_>) -> (JobStatus, JobResult) {
    job.start();
    match run_stages(job, cancel, ctx) {
        Ok(result) => (JobStatus::Success, result),
        Err(Outcome::Skipped(result)) => (JobStatus::Skipped, result),
        Err(Outcome::Cancelled(result)) => (JobStatus::Cancelled, result),
        Err(Outcome::Failed(result)) => (JobStatus::Failed, result),
    }
}

enum Outcome {
    Skipped(JobResult),
    Cancelled(JobResult),
    Failed(JobResult),
}

fn check_cancelled(cancel: &CancelFlag, original_bytes: u64) -> Result<(), Outcome> {
    if cancel.load(Ordering::SeqCst) {
        Err(Outcome::Cancelled(JobResult::cancelled(original_bytes)))
    } else {
        Ok(())
    }
}

fn run_stages(job: &mut FileJob, cancel: &CancelFlag, ctx: &JobContext<'_>) -> Result<JobResult, Outcome> {
    let input = job.input_path.clone();
    let original_bytes = fs::metadata(&input).map(|m| m.len()).unwrap_or(0);

    job.enter_stage(JobStage::Analyzing);
    check_cancelled(cancel, original_bytes)?;
    let decoded = analyzer::decode_and_analyze(&input)
        .map_err(|e| Outcome::Failed(JobResult::failed(original_bytes, PipelineError::decode(e.to_string()))))?;

    if decoded.analysis.format == ImageFormat::Tiff
        && !ctx.settings.allow_dangerous_replace
        && ctx.settings.output_mode == crate::settings::OutputMode::Replace
    {
        return Err(Outcome::Skipped(JobResult::skipped(
            original_bytes,
            "TIFF cannot be replaced in place; switch to subfolder output",
        )));
    }

    job.enter_stage(JobStage::Decoding);
    check_cancelled(cancel, original_bytes)?;
    let (transformed_rgba, metadata_outcome) =
        metadata::apply(&decoded.rgba, decoded.analysis.orientation, &ctx.settings.metadata);

    job.enter_stage(JobStage::Transforming);
    check_cancelled(cancel, original_bytes)?;
    let _ = &metadata_outcome; // consumed for reporting by the coordinator's log writer

    job.enter_stage(JobStage::Encoding);
    check_cancelled(cancel, original_bytes)?;
    let outcome = pick_candidate(&transformed_rgba, decoded.analysis.format, decoded.analysis.content_kind, ctx)
        .map_err(|e| Outcome::Failed(JobResult::failed(original_bytes, e)))?;

    if ctx.settings.ssim_guard && !outcome.met_threshold {
        return Err(Outcome::Skipped(JobResult::skipped(original_bytes, "no candidate met threshold")));
    }
    let candidate = outcome.candidate;

    if !ctx.settings.allow_larger_output && candidate.size() >= original_bytes && original_bytes > 0 {
        return Err(Outcome::Skipped(JobResult::skipped(
            original_bytes,
            "candidate output was not smaller than the original",
        )));
    }

    job.enter_stage(JobStage::Writing);
    check_cancelled(cancel, original_bytes)?;
    let output_path = finalize_output_path(
        &input,
        &job.common_root,
        candidate.format,
        ctx.settings,
        ctx.overwrite,
        decoded.analysis.width,
        decoded.analysis.height,
        &candidate.buffer,
    )
    .map_err(|e| Outcome::Failed(JobResult::failed(original_bytes, PipelineError::write(e.to_string()))))?;

    if ctx.dry_run {
        return Ok(JobResult::success(output_path, original_bytes, candidate.size(), candidate.mssim));
    }

    let backup_record = match &job.backup_dir {
        Some(backup_dir) => backup_original(&input, &job.common_root, backup_dir).ok(),
        None => None,
    };

    write_atomic(&output_path, &candidate.buffer, ctx.overwrite, Some(candidate.format))
        .map_err(|e| Outcome::Failed(JobResult::failed(original_bytes, PipelineError::write(e.to_string()))))?;

    job.enter_stage(JobStage::Verifying);
    job.enter_stage(JobStage::Cleaning);

    Ok(JobResult::success(output_path, original_bytes, candidate.size(), candidate.mssim)
        .with_backup_record(backup_record))
}

/// Picks the candidate builder for this job's output format. `RunMode`
/// chooses between WebP conversion and format-native optimization; a
/// format-native PNG input always routes through the palette-based PNG
/// builder rather than JPEG, since the two encoders aren't interchangeable.
fn pick_candidate(
    rgba: &crate::tools::RgbaImage,
    input_format: ImageFormat,
    content_kind: ContentKind,
    ctx: &JobContext<'_>,
) -> Result<crate::candidates::BuildOutcome, PipelineError> {
    let use_smart = matches!(ctx.mode, RunMode::Smart);
    let outcome = match ctx.mode {
        RunMode::ConvertWebp => build_webp_candidate(rgba, content_kind, ctx.settings, use_smart)?,
        _ if input_format == ImageFormat::Png => build_png_candidate(rgba, content_kind, ctx.settings)?,
        _ => build_jpeg_candidate(rgba, content_kind, ctx.settings, use_smart)?,
    };
    if !outcome.met_threshold {
        log::warn!(
            "candidate {} did not clear its MSSIM threshold",
            outcome.candidate.quality_label
        );
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::fixture::PathChild;
    use assert_fs::TempDir;
    use crate::pool::new_cancel_flag;

    fn write_test_jpeg(path: &Path) {
        let img = image::RgbImage::from_fn(32, 32, |x, y| image::Rgb([x as u8 * 4, y as u8 * 4, 128]));
        image::DynamicImage::ImageRgb8(img).save(path).unwrap();
    }

    #[test]
    fn dry_run_never_writes_output() {
        let temp = TempDir::new().unwrap();
        let input = temp.child("photo.jpg");
        write_test_jpeg(input.path());

        let mut job = FileJob::new(1, input.path().to_path_buf(), temp.path().to_path_buf(), None);
        let settings = EffectiveSettings::default();
        let ctx = JobContext {
            settings: &settings,
            mode: RunMode::Optimize,
            overwrite: true,
            dry_run: true,
        };
        let cancel = new_cancel_flag();
        let (status, result) = run_job(&mut job, &cancel, &ctx);
        assert_eq!(status, JobStatus::Success);
        assert!(!result.output_path.unwrap().exists());
    }
}
