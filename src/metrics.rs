//! Metric Engine (spec §4.3). Hand-rolled since no SSIM crate appears
//! anywhere in the retrieval pack (`dssim`, `image-compare`, `mssim` were
//! all absent); banding-risk sampling follows the seeded-RNG convention
//! noted in `other_examples/manifests/hejijunhao-photon` ("seeded sampling
//! for progressive encoding seed selection").

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::analyzer::to_luma;
use crate::model::MetricResult;
use crate::tools::RgbaImage;

const SSIM_WINDOW: usize = 8;
const K1: f64 = 0.01;
const K2: f64 = 0.03;
const L: f64 = 255.0;

/// Fixed seed so repeated runs over the same pair of images produce the
/// same banding-risk estimate (spec §9 open question resolution).
const BANDING_SEED: u64 = 0x5A11_00D5_1EEC;

pub fn evaluate(original: &RgbaImage, candidate: &RgbaImage) -> MetricResult {
    let mssim = mean_ssim(original, candidate, None);
    let mask = edge_mask(original);
    let edge_ssim = mean_ssim(original, candidate, Some(&mask));
    let banding_risk = banding_risk(original, candidate);

    MetricResult {
        mssim,
        edge_ssim,
        banding_risk,
    }
}

/// Windowed SSIM over luma, averaged across non-overlapping 8x8 blocks.
/// `weight_mask`, when given, biases the average toward high-edge-density
/// blocks (the edge-SSIM variant spec §4.3 uses to catch halo artifacts
/// that whole-image MSSIM can average away).
fn mean_ssim(a: &RgbaImage, b: &RgbaImage, weight_mask: Option<&[f64]>) -> f64 {
    if a.width != b.width || a.height != b.height {
        return 0.0;
    }
    let (w, h) = (a.width as usize, a.height as usize);
    if w < SSIM_WINDOW || h < SSIM_WINDOW {
        return 1.0;
    }
    let luma_a = to_luma(a);
    let luma_b = to_luma(b);

    let c1 = (K1 * L).powi(2);
    let c2 = (K2 * L).powi(2);

    let mut weighted_sum = 0f64;
    let mut weight_total = 0f64;

    for by in (0..h - SSIM_WINDOW + 1).step_by(SSIM_WINDOW) {
        for bx in (0..w - SSIM_WINDOW + 1).step_by(SSIM_WINDOW) {
            let (mean_a, var_a) = block_stats(&luma_a, w, bx, by);
            let (mean_b, var_b) = block_stats(&luma_b, w, bx, by);
            let covariance = block_covariance(&luma_a, &luma_b, w, bx, by, mean_a, mean_b);

            let numerator = (2.0 * mean_a * mean_b + c1) * (2.0 * covariance + c2);
            let denominator = (mean_a.powi(2) + mean_b.powi(2) + c1) * (var_a + var_b + c2);
            let ssim = if denominator == 0.0 { 1.0 } else { numerator / denominator };

            let weight = weight_mask
                .map(|mask| mask[by * w + bx].max(0.05))
                .unwrap_or(1.0);
            weighted_sum += ssim * weight;
            weight_total += weight;
        }
    }

    if weight_total == 0.0 { 1.0 } else { weighted_sum / weight_total }
}

fn block_stats(luma: &[u8], width: usize, bx: usize, by: usize) -> (f64, f64) {
    let mut sum = 0f64;
    let mut values = [0f64; SSIM_WINDOW * SSIM_WINDOW];
    let mut idx = 0;
    for y in 0..SSIM_WINDOW {
        for x in 0..SSIM_WINDOW {
            let v = luma[(by + y) * width + (bx + x)] as f64;
            values[idx] = v;
            sum += v;
            idx += 1;
        }
    }
    let n = (SSIM_WINDOW * SSIM_WINDOW) as f64;
    let mean = sum / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

fn block_covariance(a: &[u8], b: &[u8], width: usize, bx: usize, by: usize, mean_a: f64, mean_b: f64) -> f64 {
    let mut sum = 0f64;
    for y in 0..SSIM_WINDOW {
        for x in 0..SSIM_WINDOW {
            let va = a[(by + y) * width + (bx + x)] as f64;
            let vb = b[(by + y) * width + (bx + x)] as f64;
            sum += (va - mean_a) * (vb - mean_b);
        }
    }
    sum / (SSIM_WINDOW * SSIM_WINDOW) as f64
}

/// Per-block edge strength of `img`, broadcast across each block's pixels
/// so it lines up with `mean_ssim`'s flat indexing.
fn edge_mask(img: &RgbaImage) -> Vec<f64> {
    let (w, h) = (img.width as usize, img.height as usize);
    let luma = to_luma(img);
    let mut mask = vec![0f64; w * h];
    if w < 3 || h < 3 {
        return mask;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = luma[y * w + x + 1] as i32 - luma[y * w + x - 1] as i32;
            let gy = luma[(y + 1) * w + x] as i32 - luma[(y - 1) * w + x] as i32;
            mask[y * w + x] = ((gx * gx + gy * gy) as f64).sqrt() / 255.0;
        }
    }
    mask
}

/// Stochastic block sampler (spec §4.3): draws 10 random 32x32 blocks,
/// compares each pair to catch flat gradients that lost distinct colours
/// under quantization, the signature of visible 8-bit banding. Returns a
/// risk in [0, 1]; 0 means no sampled flat block lost meaningful colour
/// resolution.
pub fn banding_risk(original: &RgbaImage, candidate: &RgbaImage) -> f64 {
    const BLOCK: usize = 32;
    const SAMPLES: usize = 10;

    let (w, h) = (original.width as usize, original.height as usize);
    if candidate.width as usize != w || candidate.height as usize != h || w < BLOCK || h < BLOCK {
        return 0.0;
    }
    let base_luma = to_luma(original);
    let mut rng = StdRng::seed_from_u64(BANDING_SEED);

    let mut risk_total = 0f64;
    for _ in 0..SAMPLES {
        let bx = rng.gen_range(0..=(w - BLOCK));
        let by = rng.gen_range(0..=(h - BLOCK));
        if !block_is_flat(&base_luma, w, bx, by, BLOCK) {
            continue;
        }
        let base_colors = count_distinct_colors(original, bx, by, BLOCK);
        let candidate_colors = count_distinct_colors(candidate, bx, by, BLOCK);
        if candidate_colors < base_colors {
            risk_total += (base_colors - candidate_colors) as f64 / base_colors as f64;
        }
    }

    risk_total / SAMPLES as f64
}

/// A base block is "flat" when every neighbouring pair of pixels along a
/// row differs by no more than a just-noticeable luma delta (spec §4.3).
fn block_is_flat(luma: &[u8], width: usize, bx: usize, by: usize, block: usize) -> bool {
    for y in 0..block {
        for x in 1..block {
            let idx = (by + y) * width + (bx + x);
            let delta = (luma[idx] as i32 - luma[idx - 1] as i32).abs();
            if delta > 5 {
                return false;
            }
        }
    }
    true
}

fn count_distinct_colors(img: &RgbaImage, bx: usize, by: usize, block: usize) -> usize {
    use std::collections::HashSet;
    let width = img.width as usize;
    let mut seen = HashSet::new();
    for y in 0..block {
        for x in 0..block {
            let idx = ((by + y) * width + (bx + x)) * 4;
            let px = &img.pixels[idx..idx + 4];
            seen.insert((px[0], px[1], px[2]));
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(color: [u8; 4], w: u32, h: u32) -> RgbaImage {
        RgbaImage {
            width: w,
            height: h,
            pixels: color.repeat((w * h) as usize),
        }
    }

    #[test]
    fn identical_images_score_mssim_one() {
        let img = solid([80, 120, 160, 255], 32, 32);
        let result = evaluate(&img, &img.clone());
        assert!((result.mssim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn banding_risk_is_deterministic_across_calls() {
        let original = solid([128, 128, 128, 255], 64, 64);
        let candidate = original.clone();
        assert_eq!(banding_risk(&original, &candidate), banding_risk(&original, &candidate));
    }

    #[test]
    fn flat_block_with_fewer_candidate_colors_accrues_risk() {
        let (w, h) = (64u32, 64u32);
        let mut original = RgbaImage {
            width: w,
            height: h,
            pixels: vec![0u8; (w * h * 4) as usize],
        };
        for y in 0..h {
            for x in 0..w {
                let idx = ((y * w + x) * 4) as usize;
                let blue = 100 + (x / 4) as u8;
                original.pixels[idx..idx + 4].copy_from_slice(&[100, 100, blue, 255]);
            }
        }
        let mut candidate = original.clone();
        for px in candidate.pixels.chunks_exact_mut(4) {
            px[2] = 100;
        }
        let risk = banding_risk(&original, &candidate);
        assert!(risk > 0.0);
    }

    #[test]
    fn noisy_image_scores_lower_mssim_than_identical() {
        let original = solid([100, 100, 100, 255], 32, 32);
        let mut noisy = original.clone();
        for (i, px) in noisy.pixels.chunks_exact_mut(4).enumerate() {
            if i % 2 == 0 {
                px[0] = px[0].wrapping_add(60);
            }
        }
        let degraded_score = mean_ssim(&original, &noisy, None);
        assert!(degraded_score < 1.0);
    }
}
