//! Image I/O & Analyzer (spec §4.2). Decodes a source file once, extracts
//! EXIF (via `kamadak-exif`, the pairing seen in `other_examples/manifests/
//! KAPKEPOT-PIXIE` and `geoals-picman`), and scores the decoded pixels with
//! heuristics the Candidate Builder uses to bias its quality search.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use exif::{In, Tag};

use crate::model::ImageFormat;
use crate::tools::RgbaImage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentKind {
    Photo,
    Graphic,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub is_grayscale: bool,
    pub unique_color_estimate: u32,
    pub edge_density: f64,
    pub texture_level: f64,
    pub flat_region_ratio: f64,
    pub content_kind: ContentKind,
    pub orientation: u16,
}

pub struct DecodedImage {
    pub rgba: RgbaImage,
    pub analysis: Analysis,
}

pub fn decode_and_analyze(path: &Path) -> Result<DecodedImage> {
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("unrecognized image extension: {}", path.display()))?;
    let dynamic = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
    let rgba = RgbaImage::from_dynamic(&dynamic);
    let orientation = read_orientation(path).unwrap_or(1);
    let analysis = analyze(&rgba, format, orientation);
    Ok(DecodedImage { rgba, analysis })
}

/// Reads the EXIF orientation tag, defaulting to 1 (no transform) when the
/// file carries no EXIF block at all, which is the common case for PNG/WebP.
fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif_reader = exif::Reader::new();
    let exif = exif_reader.read_from_container(&mut reader).ok()?;
    exif.get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(|v| v as u16)
}

pub fn analyze(rgba: &RgbaImage, format: ImageFormat, orientation: u16) -> Analysis {
    let has_alpha = !rgba.is_opaque();
    let is_grayscale = is_grayscale(rgba);
    let unique_color_estimate = sample_unique_colors(rgba);
    let edge_density = sobel_edge_density(rgba);
    let texture_level = laplacian_texture_level(rgba);
    let flat_region_ratio = flat_region_ratio(rgba);

    // A photo has real texture and isn't dominated by flat regions; anything
    // else (illustrations, flat UI screenshots, icons) is a graphic (spec §4.2).
    let is_photo = texture_level > 5.0 && flat_region_ratio < 0.8;
    let content_kind = if is_photo { ContentKind::Photo } else { ContentKind::Graphic };

    Analysis {
        format,
        width: rgba.width,
        height: rgba.height,
        has_alpha,
        is_grayscale,
        unique_color_estimate,
        edge_density,
        texture_level,
        flat_region_ratio,
        content_kind,
        orientation,
    }
}

fn is_grayscale(rgba: &RgbaImage) -> bool {
    rgba.pixels
        .chunks_exact(4)
        .all(|px| px[0] == px[1] && px[1] == px[2])
}

/// Counts distinct colors over a decimated grid rather than every pixel, to
/// keep large photos cheap to score; capped at a few thousand samples.
fn sample_unique_colors(rgba: &RgbaImage) -> u32 {
    use std::collections::HashSet;
    let total_pixels = (rgba.width as u64) * (rgba.height as u64);
    let stride = ((total_pixels / 8192).max(1)) as usize;

    let mut seen = HashSet::new();
    for px in rgba.pixels.chunks_exact(4).step_by(stride.max(1)) {
        seen.insert((px[0], px[1], px[2]));
        if seen.len() > 65_536 {
            break;
        }
    }
    seen.len() as u32
}

const GX_KERNEL: [i32; 9] = [-1, 0, 1, -2, 0, 2, -1, 0, 1];
const GY_KERNEL: [i32; 9] = [-1, -2, -1, 0, 0, 0, 1, 2, 1];

/// Horizontal Sobel gradient magnitude averaged over the luma plane,
/// normalized to roughly [0, 1] (spec §4.2, "edge density via Sobel X").
/// Also used as a weighting mask by the Metric Engine's edge-SSIM term.
pub fn sobel_edge_density(rgba: &RgbaImage) -> f64 {
    let (w, h) = (rgba.width as usize, rgba.height as usize);
    if w < 3 || h < 3 {
        return 0.0;
    }
    let luma = to_luma(rgba);

    let mut total = 0f64;
    let mut count = 0u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = convolve(&luma, w, x, y, &GX_KERNEL);
            total += gx.unsigned_abs() as f64;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (total / count as f64) / 255.0
}

/// Mean absolute Laplacian response over the luma plane (spec §4.2's
/// texture-level signal): near zero for flat illustrations, high for
/// photographic detail and noise.
fn laplacian_texture_level(rgba: &RgbaImage) -> f64 {
    const LAPLACIAN_KERNEL: [i32; 9] = [0, 1, 0, 1, -4, 1, 0, 1, 0];
    let (w, h) = (rgba.width as usize, rgba.height as usize);
    if w < 3 || h < 3 {
        return 0.0;
    }
    let luma = to_luma(rgba);

    let mut total = 0f64;
    let mut count = 0u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let response = convolve(&luma, w, x, y, &LAPLACIAN_KERNEL);
            total += response.unsigned_abs() as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn convolve(luma: &[u8], width: usize, x: usize, y: usize, kernel: &[i32; 9]) -> i32 {
    let mut acc = 0i32;
    let mut k = 0;
    for dy in [-1i32, 0, 1] {
        for dx in [-1i32, 0, 1] {
            let sample = luma[((y as i32 + dy) as usize) * width + (x as i32 + dx) as usize] as i32;
            acc += sample * kernel[k];
            k += 1;
        }
    }
    acc
}

/// Fraction of pixels whose full Sobel gradient magnitude falls below a
/// near-flat threshold (spec §4.2: "flat region ratio ... gradient
/// magnitude < 10"); a high ratio flags banding-prone skies/gradients that
/// the Candidate Builder and Metric Engine both bias against.
fn flat_region_ratio(rgba: &RgbaImage) -> f64 {
    let (w, h) = (rgba.width as usize, rgba.height as usize);
    if w < 3 || h < 3 {
        return 0.0;
    }
    let luma = to_luma(rgba);

    let mut flat_pixels = 0u64;
    let mut total_pixels = 0u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = convolve(&luma, w, x, y, &GX_KERNEL);
            let gy = convolve(&luma, w, x, y, &GY_KERNEL);
            let magnitude = ((gx * gx + gy * gy) as f64).sqrt();
            if magnitude < 10.0 {
                flat_pixels += 1;
            }
            total_pixels += 1;
        }
    }

    if total_pixels == 0 {
        0.0
    } else {
        flat_pixels as f64 / total_pixels as f64
    }
}

pub fn to_luma(rgba: &RgbaImage) -> Vec<u8> {
    rgba.pixels
        .chunks_exact(4)
        .map(|px| {
            let (r, g, b) = (px[0] as f64, px[1] as f64, px[2] as f64);
            (0.299 * r + 0.587 * g + 0.114 * b).round() as u8
        })
        .collect()
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
    fn solid_color_has_zero_edge_density() {
        let img = solid([128, 128, 128, 255], 16, 16);
        assert_eq!(sobel_edge_density(&img), 0.0);
    }

    #[test]
    fn grayscale_detection_matches_equal_channels() {
        let img = solid([50, 50, 50, 255], 4, 4);
        let analysis = analyze(&img, ImageFormat::Png, 1);
        assert!(analysis.is_grayscale);
    }

    #[test]
    fn flat_image_classified_as_graphic() {
        let img = solid([10, 200, 10, 255], 32, 32);
        let analysis = analyze(&img, ImageFormat::Png, 1);
        assert_eq!(analysis.content_kind, ContentKind::Graphic);
    }
}
