//! JPEG encoder, grounded on `mozjpeg`'s standard compress API (the same
//! native-binding substitution used in `other_examples/manifests/
//! Gunzinger-imgc-rs`, which pairs `mozjpeg` with `image` the same way).

use std::panic::{self, AssertUnwindSafe};

use mozjpeg::{ColorSpace, Compress, ScanMode};

use crate::errors::ToolError;
use crate::model::ImageFormat;
use crate::tools::{RgbaImage, ToolRunner};

pub struct MozjpegRunner {
    pub progressive: bool,
}

impl Default for MozjpegRunner {
    fn default() -> Self {
        Self { progressive: true }
    }
}

impl ToolRunner for MozjpegRunner {
    fn format(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    fn encode(&self, rgba: &RgbaImage, quality: u8) -> Result<Vec<u8>, ToolError> {
        let rgb = drop_alpha(rgba);
        let progressive = self.progressive;
        let width = rgba.width as usize;
        let height = rgba.height as usize;

        // mozjpeg-sys aborts via longjmp on malformed input; catch_unwind
        // keeps a single bad file from taking the worker thread down with it.
        let result = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Vec<u8>, String> {
            let mut compress = Compress::new(ColorSpace::JCS_RGB);
            compress.set_size(width, height);
            compress.set_quality(f32::from(quality));
            if progressive {
                compress.set_scan_optimization_mode(ScanMode::Auto);
            }
            let mut started = compress.start_compress(Vec::new()).map_err(|e| e.to_string())?;
            started
                .write_scanlines(&rgb)
                .map_err(|e| e.to_string())?;
            started.finish().map_err(|e| e.to_string())
        }));

        match result {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(msg)) => Err(ToolError::Failed(msg)),
            Err(_) => Err(ToolError::Failed("mozjpeg encoder panicked".to_string())),
        }
    }
}

fn drop_alpha(rgba: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgba.pixels.len() / 4 * 3);
    for px in rgba.pixels.chunks_exact(4) {
        out.extend_from_slice(&px[..3]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_solid_color_block() {
        let img = RgbaImage {
            width: 8,
            height: 8,
            pixels: vec![200, 100, 50, 255].repeat(64),
        };
        let runner = MozjpegRunner::default();
        let bytes = runner.encode(&img, 80).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
    }
}
