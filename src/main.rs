mod analyzer;
mod atomic_writer;
mod candidates;
mod cli;
mod coordinator;
mod errors;
mod job;
mod logging;
mod metadata;
mod metrics;
mod model;
mod path_planner;
mod pool;
mod responsive;
mod restore;
mod settings;
mod state;
mod tools;
mod ui;
mod watch;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::Parser;

use crate::cli::{Cli, Command, RunArgs, WatchAction};
use crate::coordinator::{execute, new_run_cancel_flag, RunOptions};
use crate::state::{processed_index_path, FileFingerprint, WatchConfig};
use crate::ui::{attach_indicatif, ProgressBus, ProgressKind};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match cli.command {
        Command::Run(args) => run_command(args, false),
        Command::Scan(args) | Command::Preview(args) => run_command(args, true),
        Command::Restore => restore_command(),
        Command::Watch { action } => watch_command(action),
    }
}

fn app_data_dir() -> std::path::PathBuf {
    dirs_app_data()
}

/// The teacher has no persistent app-data concept; this crate needs one
/// for `last-run.json`/backups/logs, so it follows the common CLI-tool
/// convention of a dotdir under the user's home.
fn dirs_app_data() -> std::path::PathBuf {
    std::env::var_os("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".pixelforge")
}

fn generate_run_id() -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    format!("run-{secs}")
}

fn run_command(args: RunArgs, dry_run_override: bool) -> Result<()> {
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads.get())
            .build_global()
            .context("configuring rayon thread pool")?;
    }

    let no_progress = args.no_progress;
    let (inputs, mode, settings, overwrite) = args.into_settings();

    if inputs.is_empty() {
        bail!("no input paths provided");
    }

    let targets = coordinator::resolve_inputs(&inputs);
    if targets.is_empty() {
        bail!("no supported image files found in the provided inputs");
    }

    let bus = ProgressBus::new();
    let kind = if no_progress { ProgressKind::Quiet } else { ProgressKind::Fancy };
    let _token = attach_indicatif(&bus, kind, targets.len());

    let run_id = generate_run_id();
    let options = RunOptions {
        inputs: targets,
        mode,
        settings,
        overwrite,
        dry_run: dry_run_override,
        app_data_dir: app_data_dir(),
        bus: Some(&bus),
    };
    let cancel = new_run_cancel_flag();

    let summary = execute(run_id, options, cancel)?;

    println!(
        "{} processed, {} converted, {} skipped, {} failed; saved {} bytes",
        summary.processed_files,
        summary.converted_files,
        summary.skipped_files,
        summary.failed_files,
        summary.total_saved_bytes
    );
    for (path, message) in &summary.failures {
        eprintln!("  failed: {} ({message})", path.display());
    }

    if summary.failed_files > 0 {
        bail!("{} file(s) failed during this run", summary.failed_files);
    }
    Ok(())
}

fn restore_command() -> Result<()> {
    let app_data_dir = app_data_dir();
    let state = crate::state::load_last_run_state(&app_data_dir)?
        .ok_or_else(|| anyhow::anyhow!("no previous run recorded in {}", app_data_dir.display()))?;

    let summary = restore::restore(&state);
    println!("restored {} file(s), removed {} generated file(s)", summary.restored, summary.removed);
    for (path, message) in &summary.failures {
        eprintln!("  failed to restore {path}: {message}");
    }
    if !summary.failures.is_empty() {
        bail!("{} file(s) failed to restore", summary.failures.len());
    }
    Ok(())
}

fn watch_command(action: WatchAction) -> Result<()> {
    let config_path = app_data_dir().join("watch-config.json");
    let mut config = WatchConfig::load(&config_path)?;

    match action {
        WatchAction::Add { path } => {
            config.add_folder(path);
            config.save(&config_path)?;
            println!("watching {} folder(s)", config.folders.len());
        }
        WatchAction::Remove { path } => {
            config.remove_folder(&path);
            config.save(&config_path)?;
        }
        WatchAction::List => {
            for folder in &config.folders {
                println!("{} [{}]", folder.path.display(), if folder.enabled { "on" } else { "off" });
            }
        }
        WatchAction::Toggle { path, state } => {
            config.toggle_folder(&path, matches!(state, cli::ToggleState::On));
            config.save(&config_path)?;
        }
        WatchAction::Start => {
            run_watch_loop(&config)?;
        }
    }
    Ok(())
}

/// Drives the watch loop: drains stable/retry-due files, runs each through
/// the pipeline individually (so success/failure is attributable per file),
/// and persists the processed index so a stable file is never reprocessed
/// on the next poll (spec §4.12 point 6, §8 processed-index idempotence).
fn run_watch_loop(config: &WatchConfig) -> Result<()> {
    let (_watcher, rx) = watch::start_watcher(config).context("starting filesystem watcher")?;
    let mut gate = watch::StabilityGate::default();
    let mut retry_queue: Vec<watch::RetryEntry> = Vec::new();
    let mut retry_attempts: HashMap<PathBuf, u32> = HashMap::new();

    log::info!("watching {} folder(s); press Ctrl+C to stop", config.folders.len());
    loop {
        let index_path = config
            .folders
            .iter()
            .find(|f| f.enabled)
            .map(|f| processed_index_path(&f.path));
        let mut index = index_path
            .as_ref()
            .and_then(|p| crate::state::ProcessedIndex::load(p).ok())
            .unwrap_or_default();

        let mut batch = watch::drain_stable(&rx, &mut gate, &index, config, Duration::from_secs(5));
        batch.extend(watch::due_retries(&mut retry_queue));
        if batch.is_empty() {
            continue;
        }

        log::info!("{} file(s) ready to process", batch.len());
        for path in batch {
            let options = RunOptions {
                inputs: vec![path.clone()],
                mode: settings::RunMode::Optimize,
                settings: config.global.settings.clone(),
                overwrite: false,
                dry_run: false,
                app_data_dir: app_data_dir(),
                bus: None,
            };
            let cancel = new_run_cancel_flag();
            let succeeded = match execute(generate_run_id(), options, cancel) {
                Ok(summary) => summary.failed_files == 0,
                Err(err) => {
                    log::error!("watch run failed for {}: {err}", path.display());
                    false
                }
            };

            if succeeded {
                retry_attempts.remove(&path);
                if let Ok(fingerprint) = FileFingerprint::compute(&path) {
                    index.mark_processed(&path, fingerprint);
                }
            } else {
                let attempts = retry_attempts.entry(path.clone()).or_insert(0);
                *attempts += 1;
                watch::schedule_retry(&mut retry_queue, path, *attempts);
            }
        }

        if let Some(index_path) = &index_path {
            if let Err(err) = index.save(index_path) {
                log::error!("failed to persist processed index {}: {err}", index_path.display());
            }
        }
    }
}
