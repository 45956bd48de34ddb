//! Candidate Builder (spec §4.4). Two strategies share one shape: produce
//! an ordered list of quality attempts, encode each, score it against the
//! MSSIM/banding-risk guard, and keep the smallest passing candidate. The
//! ladder strategy is the teacher's single fixed-quality encode generalized
//! into a fixed quality list; the smart strategy is new, grounded in the
//! binary-search shape spec §4.4 calls for.

use crate::analyzer::ContentKind;
use crate::errors::{PipelineError, ToolError};
use crate::model::{Candidate, ImageFormat};
use crate::metrics::evaluate;
use crate::settings::{EffectiveSettings, QualityMode};
use crate::tools::mozjpeg_runner::MozjpegRunner;
use crate::tools::oxipng_runner::OxipngRunner;
use crate::tools::pngquant_runner::PngquantRunner;
use crate::tools::webp_runner::WebpRunner;
use crate::tools::{RgbaImage, ToolRunner};

const JPEG_LADDER: [u8; 5] = [90, 82, 75, 65, 55];
const WEBP_LADDER: [u8; 5] = [92, 85, 78, 68, 55];

/// pngquant quality ranges tried in order (spec §4.4: "candidates per range
/// `(80,95)` or expanded aggressive ranges"). Aggressive mode widens the
/// search toward lower quality once the conservative range fails to pass.
const PNG_QUALITY_RANGES: [(u8, u8); 1] = [(80, 95)];
const PNG_AGGRESSIVE_QUALITY_RANGES: [(u8, u8); 3] = [(80, 95), (60, 85), (40, 70)];

pub struct BuildOutcome {
    pub candidate: Candidate,
    pub attempts: u32,
    pub met_threshold: bool,
}

pub fn build_jpeg_candidate(
    original: &RgbaImage,
    content_kind: ContentKind,
    settings: &EffectiveSettings,
    use_smart: bool,
) -> Result<BuildOutcome, PipelineError> {
    let runner = MozjpegRunner::default();
    if let QualityMode::Fixed(q) = settings.jpeg_quality {
        return encode_single(original, ImageFormat::Jpeg, &runner, q);
    }
    if use_smart {
        smart_search(original, content_kind, settings, ImageFormat::Jpeg, &runner)
    } else {
        ladder_search(original, content_kind, settings, ImageFormat::Jpeg, &runner, &JPEG_LADDER)
    }
}

pub fn build_webp_candidate(
    original: &RgbaImage,
    content_kind: ContentKind,
    settings: &EffectiveSettings,
    use_smart: bool,
) -> Result<BuildOutcome, PipelineError> {
    let runner = WebpRunner {
        near_lossless: settings.near_lossless,
    };
    if let QualityMode::Fixed(q) = settings.webp_quality {
        return encode_single(original, ImageFormat::WebP, &runner, q);
    }
    if use_smart {
        smart_search(original, content_kind, settings, ImageFormat::WebP, &runner)
    } else {
        ladder_search(original, content_kind, settings, ImageFormat::WebP, &runner, &WEBP_LADDER)
    }
}

fn encode_single(
    original: &RgbaImage,
    format: ImageFormat,
    runner: &dyn ToolRunner,
    quality: u8,
) -> Result<BuildOutcome, PipelineError> {
    let buffer = runner.encode(original, quality).map_err(PipelineError::from)?;
    let decoded = decode_roundtrip(&buffer, format)?;
    let metrics = evaluate(original, &decoded);
    Ok(BuildOutcome {
        candidate: Candidate {
            buffer,
            format,
            quality_label: format!("fixed-{quality}"),
            mssim: Some(metrics.mssim),
            banding_risk: Some(metrics.banding_risk),
        },
        attempts: 1,
        met_threshold: true,
    })
}

/// Walk a fixed quality ladder from highest to lowest, keeping the first
/// (highest-quality, smallest-by-construction-not-guaranteed) candidate
/// that clears the MSSIM threshold; falls back to the last rung tried if
/// none do, same failure mode as the teacher's single-quality encode.
fn ladder_search(
    original: &RgbaImage,
    content_kind: ContentKind,
    settings: &EffectiveSettings,
    format: ImageFormat,
    runner: &dyn ToolRunner,
    ladder: &[u8],
) -> Result<BuildOutcome, PipelineError> {
    let threshold = graphics_biased_threshold(settings.ladder_threshold(), content_kind);
    let mut best: Option<Candidate> = None;
    let mut attempts = 0u32;

    for &quality in ladder {
        attempts += 1;
        let buffer = match runner.encode(original, quality) {
            Ok(b) => b,
            Err(ToolError::Skip(_)) => continue,
            Err(e) => return Err(e.into()),
        };
        let decoded = decode_roundtrip(&buffer, format)?;
        let metrics = evaluate(original, &decoded);
        let candidate = Candidate {
            buffer,
            format,
            quality_label: format!("ladder-{quality}"),
            mssim: Some(metrics.mssim),
            banding_risk: Some(metrics.banding_risk),
        };

        let passes = metrics.mssim >= threshold;
        let smaller = best.as_ref().map(|b| candidate.size() < b.size()).unwrap_or(true);
        if passes && smaller {
            best = Some(candidate);
            if passes {
                break; // ladder is ordered high->low quality; first pass wins
            }
        } else if best.is_none() {
            best = Some(candidate);
        }
    }

    let met_threshold = best
        .as_ref()
        .and_then(|c| c.mssim)
        .map(|m| m >= threshold)
        .unwrap_or(false);

    best.map(|candidate| BuildOutcome {
        candidate,
        attempts,
        met_threshold,
    })
    .ok_or_else(|| PipelineError::encode("no ladder candidate produced usable output"))
}

/// Banding-risk veto (spec §4.3/§4.4): a candidate that clears MSSIM but
/// visibly bands on flat gradients is rejected by smart search regardless.
const BANDING_RISK_LIMIT: f64 = 0.05;

/// Binary search over the quality range, guided by the MSSIM gap to the
/// target threshold (spec §4.4 "smart" mode): narrows toward the lowest
/// quality that still clears the target, bounded by `speed.smart_iterations()`.
/// Bounds default to `[10, 95]`, raised to `[70, 95]` for graphics content in
/// JPEG, which rarely needs the bottom of the quality range to look clean.
fn smart_search(
    original: &RgbaImage,
    content_kind: ContentKind,
    settings: &EffectiveSettings,
    format: ImageFormat,
    runner: &dyn ToolRunner,
) -> Result<BuildOutcome, PipelineError> {
    let threshold = graphics_biased_threshold(settings.smart_target.threshold(), content_kind);
    let max_iterations = settings.speed.smart_iterations();

    let (mut lo, mut hi) = if format == ImageFormat::Jpeg && content_kind == ContentKind::Graphic {
        (70u8, 95u8)
    } else {
        (10u8, 95u8)
    };
    let mut best: Option<Candidate> = None;
    let mut best_effort: Option<Candidate> = None;
    let mut attempts = 0u32;

    for _ in 0..max_iterations {
        if lo > hi {
            break;
        }
        let mid = lo + (hi - lo) / 2;
        attempts += 1;

        let buffer = runner.encode(original, mid).map_err(PipelineError::from)?;
        let decoded = decode_roundtrip(&buffer, format)?;
        let metrics = evaluate(original, &decoded);
        let candidate = Candidate {
            buffer,
            format,
            quality_label: format!("smart-{mid}"),
            mssim: Some(metrics.mssim),
            banding_risk: Some(metrics.banding_risk),
        };

        let passes = metrics.mssim >= threshold && metrics.banding_risk < BANDING_RISK_LIMIT;
        if passes {
            let better = best
                .as_ref()
                .map(|b| candidate.size() <= b.size())
                .unwrap_or(true);
            if better {
                best = Some(candidate);
            }
            if mid == lo {
                break;
            }
            hi = mid - 1;
        } else {
            let keep = best_effort
                .as_ref()
                .map(|b| metrics.mssim > b.mssim.unwrap_or(0.0))
                .unwrap_or(true);
            if keep {
                best_effort = Some(candidate);
            }
            if mid == hi {
                break;
            }
            lo = mid + 1;
        }
    }

    let met_threshold = best.is_some();
    let candidate = best
        .or(best_effort)
        .ok_or_else(|| PipelineError::encode("no smart-search candidate produced usable output"))?;
    Ok(BuildOutcome {
        candidate,
        attempts,
        met_threshold,
    })
}

/// Graphics content tolerates a slightly lower MSSIM bound before banding
/// becomes visually objectionable, since hard edges dominate perceived
/// quality more than smooth gradients do (spec §4.4 graphics-bias note).
fn graphics_biased_threshold(threshold: f64, content_kind: ContentKind) -> f64 {
    if content_kind == ContentKind::Graphic {
        (threshold - 0.01).max(0.9)
    } else {
        threshold
    }
}

fn decode_roundtrip(buffer: &[u8], format: ImageFormat) -> Result<RgbaImage, PipelineError> {
    let dynamic = match format {
        ImageFormat::WebP => {
            let decoder = webp::Decoder::new(buffer);
            let webp_image = decoder
                .decode()
                .ok_or_else(|| PipelineError::decode("webp candidate failed to decode"))?;
            webp_image.to_image()
        }
        _ => image::load_from_memory(buffer).map_err(|e| PipelineError::decode(e.to_string()))?,
    };
    Ok(RgbaImage::from_dynamic(&dynamic))
}

pub fn png_quality_ranges(aggressive: bool) -> &'static [(u8, u8)] {
    if aggressive {
        &PNG_AGGRESSIVE_QUALITY_RANGES
    } else {
        &PNG_QUALITY_RANGES
    }
}

/// Builds a lossy PNG palette candidate (teacher's `CompressJob` path,
/// generalized off a single fixed quality into pngquant's `(min, max)`
/// range contract). Walks the ranges highest-to-lowest, keeping the first
/// to clear the MSSIM threshold; `aggressive_png` widens the search toward
/// lower ranges instead of just flipping oxipng's reduction flags.
pub fn build_png_candidate(
    original: &RgbaImage,
    content_kind: ContentKind,
    settings: &EffectiveSettings,
) -> Result<BuildOutcome, PipelineError> {
    let runner = PngquantRunner;
    let recompressor = OxipngRunner {
        aggressive: settings.aggressive_png,
        zopfli_iterations: Some(15),
    };
    let threshold = graphics_biased_threshold(settings.ladder_threshold(), content_kind);
    let speed = match settings.speed {
        crate::settings::Speed::Fast => 8,
        crate::settings::Speed::Balanced => 4,
        crate::settings::Speed::Thorough => 1,
    };

    let mut best: Option<Candidate> = None;
    let mut attempts = 0u32;
    for &range in png_quality_ranges(settings.aggressive_png) {
        attempts += 1;
        let quantized = runner.encode_range(original, range, speed).map_err(PipelineError::from)?;
        let recompressed = recompressor.recompress(&quantized).map_err(PipelineError::from)?;
        let decoded = decode_roundtrip(&recompressed, ImageFormat::Png)?;
        let metrics = evaluate(original, &decoded);
        let candidate = Candidate {
            buffer: recompressed,
            format: ImageFormat::Png,
            quality_label: format!("png-{}-{}", range.0, range.1),
            mssim: Some(metrics.mssim),
            banding_risk: Some(metrics.banding_risk),
        };
        if metrics.mssim >= threshold {
            best = Some(candidate);
            break;
        }
        if best.is_none() {
            best = Some(candidate);
        }
    }

    let met_threshold = best
        .as_ref()
        .and_then(|c| c.mssim)
        .map(|m| m >= threshold)
        .unwrap_or(false);

    best.map(|candidate| BuildOutcome {
        candidate,
        attempts,
        met_threshold,
    })
    .ok_or_else(|| PipelineError::encode("no png candidate produced usable output"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MetadataPreset;

    fn solid(color: [u8; 4], w: u32, h: u32) -> RgbaImage {
        RgbaImage {
            width: w,
            height: h,
            pixels: color.repeat((w * h) as usize),
        }
    }

    #[test]
    fn jpeg_ladder_search_produces_passing_candidate() {
        let img = solid([120, 140, 160, 255], 32, 32);
        let settings = EffectiveSettings::default();
        let outcome = build_jpeg_candidate(&img, ContentKind::Photo, &settings, false).unwrap();
        assert!(outcome.attempts >= 1);
        assert!(!outcome.candidate.buffer.is_empty());
    }

    #[test]
    fn aggressive_png_widens_quality_ranges() {
        assert_eq!(png_quality_ranges(false).len(), 1);
        assert!(png_quality_ranges(true).len() > png_quality_ranges(false).len());
        let _ = MetadataPreset::WebSafe;
    }
}
