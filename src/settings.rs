//! `EffectiveSettings` — the statically typed, normalized settings record
//! that replaces the source's dynamic settings objects (spec §9, "Dynamic
//! settings objects" redesign note). Variants are expressed as tagged sums
//! rather than stringly-typed fields.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Optimize,
    ConvertWebp,
    OptimizeAndWebp,
    Smart,
    Responsive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    Subfolder,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportPreset {
    Original,
    Web,
    Design,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityMode {
    Auto,
    Fixed(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmartTarget {
    VisuallyLossless,
    High,
    Balanced,
    Small,
    Custom(u8),
}

impl SmartTarget {
    /// MSSIM threshold this target demands (spec §4.4).
    pub fn threshold(self) -> f64 {
        match self {
            SmartTarget::VisuallyLossless => 0.999,
            SmartTarget::High => 0.995,
            SmartTarget::Balanced => 0.99,
            SmartTarget::Small => 0.98,
            SmartTarget::Custom(guardrail) => f64::from(guardrail.min(100)) / 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speed {
    Fast,
    Balanced,
    Thorough,
}

impl Speed {
    /// Number of binary-search iterations for the smart candidate path.
    pub fn smart_iterations(self) -> u32 {
        match self {
            Speed::Fast => 4,
            Speed::Balanced => 6,
            Speed::Thorough => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataPreset {
    WebSafe,
    MaxCompression,
    KeepCopyright,
    KeepCameraInfo,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IccMode {
    ConvertToSrgb,
    Keep,
    Strip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataCleanup {
    pub enabled: bool,
    pub preset: MetadataPreset,
    pub strip_exif: bool,
    pub strip_xmp: bool,
    pub strip_iptc: bool,
    pub icc: IccMode,
    pub gps_clean: bool,
    pub keep_camera_info: bool,
}

impl MetadataCleanup {
    pub fn from_preset(preset: MetadataPreset) -> Self {
        match preset {
            MetadataPreset::WebSafe => Self {
                enabled: true,
                preset,
                strip_exif: true,
                strip_xmp: true,
                strip_iptc: true,
                icc: IccMode::ConvertToSrgb,
                gps_clean: true,
                keep_camera_info: false,
            },
            MetadataPreset::MaxCompression => Self {
                enabled: true,
                preset,
                strip_exif: true,
                strip_xmp: true,
                strip_iptc: true,
                icc: IccMode::Strip,
                gps_clean: true,
                keep_camera_info: false,
            },
            MetadataPreset::KeepCopyright => Self {
                enabled: true,
                preset,
                strip_exif: true,
                strip_xmp: false,
                strip_iptc: false,
                icc: IccMode::Keep,
                gps_clean: true,
                keep_camera_info: false,
            },
            MetadataPreset::KeepCameraInfo => Self {
                enabled: true,
                preset,
                strip_exif: false,
                strip_xmp: false,
                strip_iptc: false,
                icc: IccMode::Keep,
                gps_clean: true,
                keep_camera_info: true,
            },
            MetadataPreset::Custom => Self {
                enabled: true,
                preset,
                strip_exif: true,
                strip_xmp: true,
                strip_iptc: true,
                icc: IccMode::Keep,
                gps_clean: false,
                keep_camera_info: false,
            },
        }
    }

    /// Escalate "keep camera info" to a full EXIF strip when it contradicts
    /// GPS cleaning (spec §4.5, documented fallback).
    pub fn resolve_contradiction(&mut self) {
        if self.keep_camera_info && self.gps_clean {
            self.strip_exif = true;
            self.keep_camera_info = false;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Concurrency {
    Auto,
    Fixed(NonZeroUsize),
}

impl Concurrency {
    pub fn resolve(self) -> usize {
        match self {
            Concurrency::Auto => {
                let cores = std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1);
                1.max(4.min(cores.saturating_sub(1).max(1)))
            }
            Concurrency::Fixed(n) => n.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsiveMode {
    Width,
    Dpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatPolicy {
    Keep,
    WebpFallback,
    WebpOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsiveConfig {
    pub mode: ResponsiveMode,
    pub widths: Vec<u32>,
    pub dpr_base_width: u32,
    pub format_policy: FormatPolicy,
    pub allow_upscale: bool,
    pub include_original: bool,
    pub optimization_preset: ExportPreset,
    pub sizes_template: Option<String>,
    pub custom_sizes: Option<String>,
}

impl Default for ResponsiveConfig {
    fn default() -> Self {
        Self {
            mode: ResponsiveMode::Width,
            widths: vec![320, 640, 960, 1280, 1920],
            dpr_base_width: 640,
            format_policy: FormatPolicy::WebpFallback,
            allow_upscale: false,
            include_original: false,
            optimization_preset: ExportPreset::Web,
            sizes_template: None,
            custom_sizes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveSettings {
    pub output_mode: OutputMode,
    pub export_preset: ExportPreset,
    pub naming_template: String,
    pub jpeg_quality: QualityMode,
    pub webp_quality: QualityMode,
    pub webp_effort: u8,
    pub near_lossless: bool,
    pub aggressive_png: bool,
    pub concurrency: Concurrency,
    pub allow_larger_output: bool,
    pub ssim_guard: bool,
    pub smart_target: SmartTarget,
    pub speed: Speed,
    pub metadata: MetadataCleanup,
    pub responsive: ResponsiveConfig,
    pub allow_dangerous_replace: bool,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        Self {
            output_mode: OutputMode::Subfolder,
            export_preset: ExportPreset::Web,
            naming_template: "{name}.{ext}".to_string(),
            jpeg_quality: QualityMode::Auto,
            webp_quality: QualityMode::Auto,
            webp_effort: 4,
            near_lossless: false,
            aggressive_png: false,
            concurrency: Concurrency::Auto,
            allow_larger_output: false,
            ssim_guard: true,
            smart_target: SmartTarget::High,
            speed: Speed::Balanced,
            metadata: MetadataCleanup::from_preset(MetadataPreset::WebSafe),
            responsive: ResponsiveConfig::default(),
            allow_dangerous_replace: false,
        }
    }
}

impl EffectiveSettings {
    /// Normalize at entry: clamp quality/effort into their documented
    /// ranges, resolve metadata contradictions (spec §3 invariants).
    pub fn normalize(mut self) -> Self {
        self.jpeg_quality = clamp_quality(self.jpeg_quality);
        self.webp_quality = clamp_quality(self.webp_quality);
        self.webp_effort = self.webp_effort.clamp(4, 6);
        self.metadata.resolve_contradiction();
        if let SmartTarget::Custom(guardrail) = &mut self.smart_target {
            *guardrail = (*guardrail).min(100);
        }
        self
    }

    /// MSSIM acceptance threshold for the ladder candidate path (spec §4.4).
    pub fn ladder_threshold(&self) -> f64 {
        if self.aggressive_png { 0.99 } else { 0.995 }
    }
}

fn clamp_quality(mode: QualityMode) -> QualityMode {
    match mode {
        QualityMode::Fixed(q) => QualityMode::Fixed(q.clamp(1, 100)),
        QualityMode::Auto => QualityMode::Auto,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_quality_and_effort() {
        let settings = EffectiveSettings {
            jpeg_quality: QualityMode::Fixed(250),
            webp_effort: 9,
            ..EffectiveSettings::default()
        }
        .normalize();

        assert_eq!(settings.jpeg_quality, QualityMode::Fixed(100));
        assert_eq!(settings.webp_effort, 6);
    }

    #[test]
    fn keep_camera_info_escalates_to_strip_when_gps_clean_set() {
        let mut metadata = MetadataCleanup::from_preset(MetadataPreset::KeepCameraInfo);
        assert!(!metadata.strip_exif);
        metadata.resolve_contradiction();
        assert!(metadata.strip_exif);
        assert!(!metadata.keep_camera_info);
    }

    #[test]
    fn concurrency_auto_is_bounded() {
        let n = Concurrency::Auto.resolve();
        assert!((1..=4).contains(&n));
    }
}
