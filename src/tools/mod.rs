//! Tool Runners (spec §4.1). The original spec frames these as wrappers
//! around external encoder binaries (`cjpeg`, `pngquant`, `oxipng`,
//! `cwebp`); this crate substitutes native Rust bindings to the same
//! libraries (`mozjpeg`, `imagequant`, `oxipng`, `webp`), which the wider
//! pack reaches for on exactly this kind of batch image tool (see
//! `other_examples/manifests/Gunzinger-imgc-rs` and `KAPKEPOT-PIXIE`). The
//! `ToolRunner` trait is the seam: it is what a future subprocess-based
//! runner would implement to slot back in unchanged.

pub mod mozjpeg_runner;
pub mod oxipng_runner;
pub mod pngquant_runner;
pub mod webp_runner;

use crate::errors::ToolError;
use crate::model::ImageFormat;

/// A single tool runner's encode contract: raw pixels plus a quality knob
/// in, compressed bytes out. Runners never see paths; I/O is the caller's
/// job, which keeps them unit-testable without a filesystem.
pub trait ToolRunner {
    fn format(&self) -> ImageFormat;
    fn encode(&self, rgba: &RgbaImage, quality: u8) -> Result<Vec<u8>, ToolError>;
}

/// Decoded pixel buffer shared by every runner and by the analyzer/metric
/// engine, so a single decode pass feeds the whole candidate-build loop.
#[derive(Debug, Clone)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaImage {
    pub fn from_dynamic(img: &image::DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.pixels.chunks_exact(4).all(|px| px[3] == 255)
    }
}
