//! Palette reducer, grounded on the teacher's `compressor::quantize_image`
//! / `encode_indexed_png` (same `imagequant` + `png::Encoder` combination),
//! generalized from the teacher's single 1-100 "quality" knob into the
//! `(min, max)` pngquant quality range spec §4.4 names directly.

use imagequant::RGBA;
use png::{AdaptiveFilterType, BitDepth, ColorType, Compression, Encoder, FilterType};

use crate::errors::ToolError;
use crate::model::ImageFormat;
use crate::tools::{RgbaImage, ToolRunner};

pub struct PngquantRunner;

impl ToolRunner for PngquantRunner {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    /// `ToolRunner`'s single-quality contract, kept for trait conformance;
    /// the PNG candidate path calls `encode_range` directly instead.
    fn encode(&self, rgba: &RgbaImage, quality: u8) -> Result<Vec<u8>, ToolError> {
        let max = quality.clamp(1, 100);
        let min = max.saturating_sub(15).max(1);
        self.encode_range(rgba, (min, max), 4)
    }
}

impl PngquantRunner {
    /// Quantizes within the pngquant `(min, max)` quality range spec §4.4
    /// calls for, rather than the teacher's derived single-quality window.
    pub fn encode_range(&self, rgba: &RgbaImage, range: (u8, u8), speed: u8) -> Result<Vec<u8>, ToolError> {
        let (palette, indices) = quantize(rgba, range, speed).map_err(|e| ToolError::Failed(e.to_string()))?;
        encode_indexed(rgba.width, rgba.height, &palette, &indices, range.1)
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

fn quantize(rgba: &RgbaImage, (quality_min, quality_max): (u8, u8), speed: u8) -> Result<(Vec<RGBA>, Vec<u8>), imagequant::Error> {
    let pixels: Vec<RGBA> = rgba
        .pixels
        .chunks_exact(4)
        .map(|px| RGBA::new(px[0], px[1], px[2], px[3]))
        .collect();

    let mut attr = imagequant::new();
    attr.set_quality(quality_min, quality_max)?;
    attr.set_max_colors(select_palette_cap(quality_max))?;
    attr.set_speed(i32::from(speed.clamp(1, 10)))?;

    let mut liq_image = attr.new_image_borrowed(&pixels, rgba.width as usize, rgba.height as usize, 0.0)?;
    let mut result = attr.quantize(&mut liq_image)?;
    result.set_dithering_level(select_dithering(quality_max))?;
    result.remapped(&mut liq_image)
}

fn encode_indexed(width: u32, height: u32, palette: &[RGBA], indices: &[u8], quality: u8) -> anyhow::Result<Vec<u8>> {
    anyhow::ensure!(!palette.is_empty(), "quantizer returned an empty palette");
    anyhow::ensure!(palette.len() <= 256, "quantizer produced more than 256 colors");

    let mut palette_bytes = Vec::with_capacity(palette.len() * 3);
    let mut alpha_bytes = Vec::with_capacity(palette.len());
    for color in palette {
        palette_bytes.extend([color.r, color.g, color.b]);
        alpha_bytes.push(color.a);
    }
    while matches!(alpha_bytes.last(), Some(&255)) {
        alpha_bytes.pop();
    }

    let mut output = Vec::new();
    {
        let mut encoder = Encoder::new(&mut output, width, height);
        encoder.set_color(ColorType::Indexed);
        encoder.set_depth(BitDepth::Eight);
        encoder.set_palette(palette_bytes);
        if !alpha_bytes.is_empty() {
            encoder.set_trns(alpha_bytes);
        }
        encoder.set_compression(Compression::Best);
        if is_photo_quality(quality) {
            encoder.set_filter(FilterType::Paeth);
            encoder.set_adaptive_filter(AdaptiveFilterType::Adaptive);
        } else {
            encoder.set_filter(FilterType::NoFilter);
            encoder.set_adaptive_filter(AdaptiveFilterType::NonAdaptive);
        }

        let mut writer = encoder.write_header()?;
        writer.write_image_data(indices)?;
        writer.finish()?;
    }
    Ok(output)
}

/// Palette size cap scales with the top of the requested quality range: a
/// range topping out near lossless gets more colours to work with than an
/// aggressively narrowed one.
fn select_palette_cap(quality_max: u8) -> u32 {
    match quality_max {
        95..=100 => 256,
        85..=94 => 128,
        70..=84 => 64,
        50..=69 => 32,
        _ => 16,
    }
}

fn is_photo_quality(quality_max: u8) -> bool {
    quality_max >= 95
}

fn select_dithering(quality_max: u8) -> f32 {
    match quality_max {
        90..=100 => 1.0,
        75..=89 => 0.8,
        50..=74 => 0.6,
        _ => 0.4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantizes_gradient_to_valid_indexed_png() {
        let mut pixels = Vec::new();
        for y in 0..16u32 {
            for x in 0..16u32 {
                pixels.extend([x as u8 * 16, y as u8 * 16, 128, 255]);
            }
        }
        let img = RgbaImage { width: 16, height: 16, pixels };
        let runner = PngquantRunner;
        let bytes = runner.encode(&img, 80).unwrap();
        assert_eq!(&bytes[0..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn encode_range_respects_quality_bounds() {
        let mut pixels = Vec::new();
        for y in 0..16u32 {
            for x in 0..16u32 {
                pixels.extend([x as u8 * 16, y as u8 * 16, 128, 255]);
            }
        }
        let img = RgbaImage { width: 16, height: 16, pixels };
        let runner = PngquantRunner;
        let bytes = runner.encode_range(&img, (80, 95), 4).unwrap();
        assert_eq!(&bytes[0..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }
}
