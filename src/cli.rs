//! Command-line interface. Generalizes the teacher's single flat `Cli`
//! struct (one mode flag, one quality flag) into the subcommand surface
//! spec §6 calls for; `clap`'s derive API and the `--overwrite`/`--dry-run`/
//! `--threads` flag shapes are carried over unchanged.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::settings::{
    Concurrency, EffectiveSettings, ExportPreset, MetadataPreset, OutputMode, QualityMode, RunMode,
    SmartTarget, Speed,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Batch image optimization engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity; repeat for more detail (-v, -vv, -vvv).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the optimization pipeline over one or more paths.
    Run(RunArgs),
    /// Undo the most recent run using its saved backups.
    Restore,
    /// Report what a run would do without writing any files.
    Scan(RunArgs),
    /// Alias for `scan`, kept for command-line discoverability.
    Preview(RunArgs),
    /// Manage folders monitored by the background watch service.
    Watch {
        #[command(subcommand)]
        action: WatchAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum WatchAction {
    Add { path: PathBuf },
    Remove { path: PathBuf },
    List,
    Toggle { path: PathBuf, #[arg(value_enum)] state: ToggleState },
    /// Start watching all enabled folders until interrupted.
    Start,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ToggleState {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Optimize,
    ConvertWebp,
    OptimizeAndWebp,
    Smart,
    Responsive,
}

impl From<ModeArg> for RunMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Optimize => RunMode::Optimize,
            ModeArg::ConvertWebp => RunMode::ConvertWebp,
            ModeArg::OptimizeAndWebp => RunMode::OptimizeAndWebp,
            ModeArg::Smart => RunMode::Smart,
            ModeArg::Responsive => RunMode::Responsive,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PresetArg {
    Original,
    Web,
    Design,
}

impl From<PresetArg> for ExportPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Original => ExportPreset::Original,
            PresetArg::Web => ExportPreset::Web,
            PresetArg::Design => ExportPreset::Design,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MetadataArg {
    WebSafe,
    MaxCompression,
    KeepCopyright,
    KeepCameraInfo,
}

impl From<MetadataArg> for MetadataPreset {
    fn from(arg: MetadataArg) -> Self {
        match arg {
            MetadataArg::WebSafe => MetadataPreset::WebSafe,
            MetadataArg::MaxCompression => MetadataPreset::MaxCompression,
            MetadataArg::KeepCopyright => MetadataPreset::KeepCopyright,
            MetadataArg::KeepCameraInfo => MetadataPreset::KeepCameraInfo,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SmartTargetArg {
    VisuallyLossless,
    High,
    Balanced,
    Small,
}

impl From<SmartTargetArg> for SmartTarget {
    fn from(arg: SmartTargetArg) -> Self {
        match arg {
            SmartTargetArg::VisuallyLossless => SmartTarget::VisuallyLossless,
            SmartTargetArg::High => SmartTarget::High,
            SmartTargetArg::Balanced => SmartTarget::Balanced,
            SmartTargetArg::Small => SmartTarget::Small,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SpeedArg {
    Fast,
    Balanced,
    Thorough,
}

impl From<SpeedArg> for Speed {
    fn from(arg: SpeedArg) -> Self {
        match arg {
            SpeedArg::Fast => Speed::Fast,
            SpeedArg::Balanced => Speed::Balanced,
            SpeedArg::Thorough => Speed::Thorough,
        }
    }
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// One or more image paths (files or directories are expanded).
    #[arg(required = true, value_name = "PATH", num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = ModeArg::Optimize)]
    pub mode: ModeArg,

    #[arg(long, value_enum, default_value_t = PresetArg::Web)]
    pub preset: PresetArg,

    /// Replace files in place instead of writing to an `optimized/` subfolder.
    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub replace: bool,

    /// Required alongside `--replace` when it could delete a source file
    /// outright (e.g. converting to WebP in replace mode).
    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub allow_dangerous_replace: bool,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: Option<u8>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub webp_quality: Option<u8>,

    #[arg(long, value_enum, default_value_t = SmartTargetArg::High)]
    pub smart_target: SmartTargetArg,

    #[arg(long, value_enum, default_value_t = SpeedArg::Balanced)]
    pub speed: SpeedArg,

    #[arg(long, value_enum, default_value_t = MetadataArg::WebSafe)]
    pub metadata: MetadataArg,

    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub allow_larger_output: bool,

    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub overwrite: bool,

    #[arg(long, value_parser = clap::value_parser!(NonZeroUsize))]
    pub threads: Option<NonZeroUsize>,

    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub no_progress: bool,
}

impl RunArgs {
    pub fn into_settings(self) -> (Vec<PathBuf>, RunMode, EffectiveSettings, bool) {
        let mut settings = EffectiveSettings {
            output_mode: if self.replace { OutputMode::Replace } else { OutputMode::Subfolder },
            export_preset: self.preset.into(),
            jpeg_quality: self.jpeg_quality.map(QualityMode::Fixed).unwrap_or(QualityMode::Auto),
            webp_quality: self.webp_quality.map(QualityMode::Fixed).unwrap_or(QualityMode::Auto),
            concurrency: self.threads.map(Concurrency::Fixed).unwrap_or(Concurrency::Auto),
            allow_larger_output: self.allow_larger_output,
            smart_target: self.smart_target.into(),
            speed: self.speed.into(),
            metadata: crate::settings::MetadataCleanup::from_preset(self.metadata.into()),
            allow_dangerous_replace: self.allow_dangerous_replace,
            ..EffectiveSettings::default()
        }
        .normalize();
        settings.metadata.resolve_contradiction();

        (self.inputs, self.mode.into(), settings, self.overwrite)
    }
}
