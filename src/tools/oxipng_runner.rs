//! Lossless PNG recompression pass, grounded on the teacher's
//! `optimizer::configure_options` (max-compression oxipng options with an
//! optional Zopfli deflate backend). Runs after `PngquantRunner` in the
//! optimize-and-palette path, or standalone for lossless-only requests.

use std::num::NonZeroU8;

use oxipng::{Deflaters, Options, StripChunks};

use crate::errors::ToolError;

pub struct OxipngRunner {
    pub aggressive: bool,
    pub zopfli_iterations: Option<u8>,
}

impl Default for OxipngRunner {
    fn default() -> Self {
        Self {
            aggressive: false,
            zopfli_iterations: Some(15),
        }
    }
}

impl OxipngRunner {
    /// Recompresses an already-encoded PNG. Metadata handling is the
    /// Metadata Processor's job; this runner always keeps whatever chunks
    /// the input already has (`StripChunks::None`), by design.
    pub fn recompress(&self, png_bytes: &[u8]) -> Result<Vec<u8>, ToolError> {
        let mut options = Options::max_compression();
        options.fast_evaluation = false;
        options.strip = StripChunks::None;
        if self.aggressive {
            options.bit_depth_reduction = true;
            options.color_type_reduction = true;
            options.palette_reduction = true;
            options.grayscale_reduction = true;
        }
        if let Some(iterations) = self.zopfli_iterations {
            if let Some(iterations) = NonZeroU8::new(iterations) {
                options.deflate = Deflaters::Zopfli { iterations };
            }
        }

        oxipng::optimize_from_memory(png_bytes, &options).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recompresses_without_changing_pixels() {
        let mut buf = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buf, 2, 2);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer
                .write_image_data(&[255u8; 2 * 2 * 4])
                .unwrap();
        }
        let runner = OxipngRunner::default();
        let recompressed = runner.recompress(&buf).unwrap();
        assert!(!recompressed.is_empty());
    }
}
