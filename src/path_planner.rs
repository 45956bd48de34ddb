//! Path Planner (spec §4.6). Resolves where a job's output lands, given
//! `OutputMode` and the naming template. Generalizes the teacher's single
//! `derive_output_path(input, suffix)` helper (one fixed suffix per mode)
//! into a small template substitution plus TIFF's forced re-extensioning.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use sha1::{Digest, Sha1};

use crate::atomic_writer::{resolve_collision, truncate_stem};
use crate::model::ImageFormat;
use crate::settings::{EffectiveSettings, OutputMode};

pub struct NamingContext<'a> {
    pub name: &'a str,
    pub extension: &'a str,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub scale: Option<&'a str>,
    pub format: Option<&'a str>,
    pub hash: Option<&'a str>,
}

/// Substitutes `{name}`, `{ext}`, `{width}`, `{height}`, `{scale}`,
/// `{format}`, `{hash}` placeholders (spec §4.6 naming template variables).
pub fn render_template(template: &str, ctx: &NamingContext<'_>) -> String {
    let mut out = template.to_string();
    out = out.replace("{name}", ctx.name);
    out = out.replace("{ext}", ctx.extension);
    if let Some(width) = ctx.width {
        out = out.replace("{width}", &width.to_string());
    }
    if let Some(height) = ctx.height {
        out = out.replace("{height}", &height.to_string());
    }
    if let Some(scale) = ctx.scale {
        out = out.replace("{scale}", scale);
    }
    if let Some(format) = ctx.format {
        out = out.replace("{format}", format);
    }
    if let Some(hash) = ctx.hash {
        out = out.replace("{hash}", hash);
    }
    out
}

/// Output format a given input format and run mode settles on. TIFF is
/// decode-only (spec §4.6 edge case): optimizing a TIFF always yields a
/// JPEG unless the caller picked WebP explicitly.
pub fn resolve_output_format(input_format: ImageFormat, prefer_webp: bool) -> ImageFormat {
    match input_format {
        ImageFormat::Tiff => {
            if prefer_webp {
                ImageFormat::WebP
            } else {
                ImageFormat::Jpeg
            }
        }
        other => {
            if prefer_webp {
                ImageFormat::WebP
            } else {
                other
            }
        }
    }
}

/// Detects the `@2x` density suffix spec §4.6 documents: an explicit
/// `@2x.` marker in the original filename, or both dimensions being even
/// (a best-effort fallback, since nothing else signals density for a
/// source image that was never named with one).
fn detect_scale(input: &Path, width: u32, height: u32) -> &'static str {
    let named = input.file_name().map(|n| n.to_string_lossy().contains("@2x.")).unwrap_or(false);
    if named || (width > 0 && height > 0 && width % 2 == 0 && height % 2 == 0) {
        "@2x"
    } else {
        ""
    }
}

/// Short content hash for the `{hash}` naming placeholder: the first 4
/// bytes of the encoded candidate's SHA-1, hex-encoded (same digest the
/// Watch Service's `FileFingerprint` uses, truncated for filename use).
fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

pub fn plan_output_path(
    input: &Path,
    common_root: &Path,
    output_format: ImageFormat,
    settings: &EffectiveSettings,
    width: u32,
    height: u32,
    content_bytes: &[u8],
) -> Result<PathBuf> {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("input file {:?} lacks a valid stem", input))?;
    let stem = truncate_stem(stem);

    // Subfolder mode mirrors each input's position relative to the common
    // root under a single top-level `Optimized` directory (spec §6), rather
    // than scattering a sibling `Optimized` folder next to every input dir.
    let target_dir = match settings.output_mode {
        OutputMode::Replace => parent.to_path_buf(),
        OutputMode::Subfolder => {
            let relative_parent = parent.strip_prefix(common_root).unwrap_or(parent);
            common_root.join("Optimized").join(relative_parent)
        }
    };

    let scale = detect_scale(input, width, height);
    let hash = content_hash(content_bytes);
    let ctx = NamingContext {
        name: &stem,
        extension: output_format.extension(),
        width: Some(width),
        height: Some(height),
        scale: Some(scale),
        format: Some(output_format.extension()),
        hash: Some(&hash),
    };
    let filename = render_template(&settings.naming_template, &ctx);
    Ok(target_dir.join(filename))
}

/// Final path for a job, including collision resolution and a `-2`/`-3`...
/// suffix when the planned name already exists and overwrite wasn't asked
/// for (spec §4.6 collision policy).
pub fn finalize_output_path(
    input: &Path,
    common_root: &Path,
    output_format: ImageFormat,
    settings: &EffectiveSettings,
    overwrite: bool,
    width: u32,
    height: u32,
    content_bytes: &[u8],
) -> Result<PathBuf> {
    let planned = plan_output_path(input, common_root, output_format, settings, width, height, content_bytes)
        .with_context(|| format!("planning output path for {}", input.display()))?;
    Ok(resolve_collision(planned, overwrite))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiff_without_webp_preference_becomes_jpeg() {
        assert_eq!(resolve_output_format(ImageFormat::Tiff, false), ImageFormat::Jpeg);
    }

    #[test]
    fn tiff_with_webp_preference_becomes_webp() {
        assert_eq!(resolve_output_format(ImageFormat::Tiff, true), ImageFormat::WebP);
    }

    #[test]
    fn replace_mode_keeps_same_directory() {
        let settings = EffectiveSettings {
            output_mode: OutputMode::Replace,
            ..EffectiveSettings::default()
        };
        let path =
            plan_output_path(Path::new("/photos/a.png"), Path::new("/photos"), ImageFormat::Png, &settings, 100, 100, b"data")
                .unwrap();
        assert_eq!(path, PathBuf::from("/photos/a.png"));
    }

    #[test]
    fn subfolder_mode_nests_under_optimized() {
        let settings = EffectiveSettings::default();
        let path =
            plan_output_path(Path::new("/photos/a.png"), Path::new("/photos"), ImageFormat::Png, &settings, 100, 100, b"data")
                .unwrap();
        assert_eq!(path, PathBuf::from("/photos/Optimized/a.png"));
    }

    #[test]
    fn subfolder_mode_mirrors_nested_input_directories_under_one_optimized_root() {
        let settings = EffectiveSettings::default();
        let path = plan_output_path(
            Path::new("/photos/vacation/beach.png"),
            Path::new("/photos"),
            ImageFormat::Png,
            &settings,
            100,
            100,
            b"data",
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/photos/Optimized/vacation/beach.png"));
    }

    #[test]
    fn naming_template_substitutes_width_height_scale_and_hash() {
        let settings = EffectiveSettings {
            naming_template: "{name}-{width}x{height}{scale}-{hash}.{ext}".to_string(),
            ..EffectiveSettings::default()
        };
        let path =
            plan_output_path(Path::new("/photos/a.png"), Path::new("/photos"), ImageFormat::Png, &settings, 200, 100, b"data")
                .unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("a-200x100@2x-"), "unexpected name: {name}");
        assert!(!name.contains("{hash}"));
    }

    #[test]
    fn scale_heuristic_matches_explicit_at_2x_suffix() {
        assert_eq!(detect_scale(Path::new("icon@2x.png"), 31, 31), "@2x");
        assert_eq!(detect_scale(Path::new("icon.png"), 31, 31), "");
    }
}
