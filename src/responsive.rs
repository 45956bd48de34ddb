//! Responsive Derivative Engine (spec §4.8). Plans a set of resized
//! derivatives from one source image, resamples with Lanczos3 (the
//! `image` crate's `imageops::resize` filter, same crate the rest of the
//! pipeline already decodes with), and emits an HTML `srcset` snippet plus
//! a JSON manifest describing what was produced.

use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;
use serde_json::json;

use crate::settings::{FormatPolicy, ResponsiveConfig, ResponsiveMode};

#[derive(Debug, Clone, Serialize)]
pub struct DerivativePlan {
    pub width: u32,
    pub label: String,
    pub is_webp: bool,
}

/// Expands a `ResponsiveConfig` into concrete widths to render, dropping
/// any that would upscale unless explicitly allowed (spec §4.8 edge case).
pub fn plan_derivatives(config: &ResponsiveConfig, source_width: u32) -> Vec<DerivativePlan> {
    let widths: Vec<u32> = match config.mode {
        ResponsiveMode::Width => config.widths.clone(),
        ResponsiveMode::Dpr => vec![
            config.dpr_base_width,
            config.dpr_base_width * 2,
            config.dpr_base_width * 3,
        ],
    };

    widths
        .into_iter()
        .filter(|w| config.allow_upscale || *w <= source_width)
        .map(|width| DerivativePlan {
            label: format!("{width}w"),
            is_webp: matches!(config.format_policy, FormatPolicy::WebpOnly),
            width,
        })
        .collect()
}

/// Resizes `source` to `target_width`, preserving aspect ratio, using
/// Lanczos3 (spec §4.8 names this filter explicitly for derivative quality).
pub fn resize_to_width(source: &DynamicImage, target_width: u32) -> DynamicImage {
    if target_width >= source.width() {
        return source.clone();
    }
    let ratio = f64::from(target_width) / f64::from(source.width());
    let target_height = (f64::from(source.height()) * ratio).round().max(1.0) as u32;
    source.resize_exact(target_width, target_height, FilterType::Lanczos3)
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub width: u32,
    pub path: String,
    pub format: String,
    pub bytes: u64,
}

/// Renders the `<img srcset>` snippet for a completed set of derivatives.
pub fn render_srcset(entries: &[ManifestEntry], fallback_src: &str) -> String {
    let srcset = entries
        .iter()
        .map(|e| format!("{} {}w", e.path, e.width))
        .collect::<Vec<_>>()
        .join(", ");
    format!(r#"<img src="{fallback_src}" srcset="{srcset}" loading="lazy">"#)
}

/// JSON manifest describing every derivative produced for one source image
/// (spec §4.8, machine-readable companion to the HTML snippet).
pub fn render_manifest(source_name: &str, entries: &[ManifestEntry]) -> serde_json::Value {
    json!({
        "source": source_name,
        "derivatives": entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upscale_widths_are_dropped_by_default() {
        let config = ResponsiveConfig {
            widths: vec![320, 640, 4000],
            ..ResponsiveConfig::default()
        };
        let plans = plan_derivatives(&config, 1000);
        assert!(plans.iter().all(|p| p.width <= 1000));
    }

    #[test]
    fn allow_upscale_keeps_all_widths() {
        let config = ResponsiveConfig {
            widths: vec![320, 4000],
            allow_upscale: true,
            ..ResponsiveConfig::default()
        };
        let plans = plan_derivatives(&config, 1000);
        assert_eq!(plans.len(), 2);
    }

    #[test]
    fn srcset_snippet_lists_every_derivative() {
        let entries = vec![
            ManifestEntry { width: 320, path: "a-320.jpg".into(), format: "jpg".into(), bytes: 100 },
            ManifestEntry { width: 640, path: "a-640.jpg".into(), format: "jpg".into(), bytes: 200 },
        ];
        let html = render_srcset(&entries, "a-640.jpg");
        assert!(html.contains("a-320.jpg 320w"));
        assert!(html.contains("a-640.jpg 640w"));
    }
}
