//! WebP encoder, grounded on `other_examples/.../dodogabrie-space_media_
//! optimizer/src/image_processor.rs`'s native `webp::Encoder` usage
//! (`webp::Encoder::from_rgb(...).encode(quality)`), generalized to take
//! RGBA and to support near-lossless mode (spec §4.1, `near_lossless` flag).

use webp::{Encoder, WebPMemory};

use crate::errors::ToolError;
use crate::model::ImageFormat;
use crate::tools::{RgbaImage, ToolRunner};

pub struct WebpRunner {
    pub near_lossless: bool,
}

impl Default for WebpRunner {
    fn default() -> Self {
        Self { near_lossless: false }
    }
}

impl ToolRunner for WebpRunner {
    fn format(&self) -> ImageFormat {
        ImageFormat::WebP
    }

    fn encode(&self, rgba: &RgbaImage, quality: u8) -> Result<Vec<u8>, ToolError> {
        let encoder = Encoder::from_rgba(&rgba.pixels, rgba.width, rgba.height);
        let memory: WebPMemory = if self.near_lossless {
            encoder.encode_lossless()
        } else {
            encoder.encode(f32::from(quality.clamp(1, 100)))
        };
        if memory.is_empty() {
            return Err(ToolError::Failed("webp encoder returned an empty buffer".to_string()));
        }
        Ok(memory.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_small_image() {
        let img = RgbaImage {
            width: 4,
            height: 4,
            pixels: vec![10, 20, 30, 255].repeat(16),
        };
        let runner = WebpRunner::default();
        let bytes = runner.encode(&img, 75).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(&bytes[0..4], b"RIFF");
    }
}
