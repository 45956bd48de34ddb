//! Progress reporting (spec §9, "dynamic settings objects"-adjacent redesign
//! note on replacing ad-hoc callbacks with a message-passing channel):
//! observers subscribe to a `ProgressBus` and get a deregistration token
//! back, rather than the teacher's single `ProgressDispatcher` being the
//! only possible consumer of progress. The default observer renders with
//! `indicatif`, adapted from the teacher's `ProgressDispatcher`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::model::JobStage;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    FileStarted { path: PathBuf },
    FileStage { path: PathBuf, stage: JobStage },
    FileFinished { path: PathBuf, outcome: FileOutcome },
    FileFailed { path: PathBuf, message: String },
    RunFinished { total: usize, processed: usize },
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub original_size: u64,
    pub output_size: u64,
    pub elapsed: Duration,
    pub notes: Option<String>,
}

pub type Token = u64;

type Handler = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Broadcasts `ProgressEvent`s to every registered observer. A `Run` owns
/// one bus; the CLI's indicatif renderer and, e.g., a future JSON-lines
/// logger can both subscribe to the same stream independently.
#[derive(Default)]
pub struct ProgressBus {
    handlers: Mutex<Vec<(Token, Handler)>>,
    next_token: AtomicU64,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: Handler) -> Token {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().unwrap().push((token, handler));
        token
    }

    pub fn unsubscribe(&self, token: Token) {
        self.handlers.lock().unwrap().retain(|(t, _)| *t != token);
    }

    pub fn emit(&self, event: ProgressEvent) {
        for (_, handler) in self.handlers.lock().unwrap().iter() {
            handler(&event);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    Fancy,
    Quiet,
}

/// Subscribes an indicatif-rendering observer to `bus` and returns its
/// deregistration token. Mirrors the teacher's `ProgressDispatcher`
/// rendering exactly; only the plumbing that feeds it changed.
pub fn attach_indicatif(bus: &ProgressBus, kind: ProgressKind, total: usize) -> Token {
    if kind == ProgressKind::Quiet {
        return bus.subscribe(Box::new(|_event| {}));
    }

    let multi = Arc::new(MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(20)));
    let overall = multi.add(ProgressBar::new(total as u64));
    overall.set_style(overall_style());
    overall.set_message(format!("0/{total} files"));

    let spinners: Mutex<std::collections::HashMap<PathBuf, ProgressBar>> = Mutex::new(std::collections::HashMap::new());
    let processed = AtomicU64::new(0);

    bus.subscribe(Box::new(move |event| match event {
        ProgressEvent::FileStarted { path } => {
            let spinner = multi.add(ProgressBar::new_spinner());
            spinner.set_style(spinner_style());
            spinner.set_message(format!("processing {}", path.display()));
            spinner.enable_steady_tick(Duration::from_millis(80));
            spinners.lock().unwrap().insert(path.clone(), spinner);
        }
        ProgressEvent::FileStage { .. } => {}
        ProgressEvent::FileFinished { path, outcome } => {
            if let Some(spinner) = spinners.lock().unwrap().remove(path) {
                spinner.finish_with_message(format_success(path, outcome));
            }
            tick(&overall, &processed, total);
        }
        ProgressEvent::FileFailed { path, message } => {
            if let Some(spinner) = spinners.lock().unwrap().remove(path) {
                spinner.abandon_with_message(format!("✗ {} ({message})", path.display()));
            }
            tick(&overall, &processed, total);
        }
        ProgressEvent::RunFinished { .. } => {
            overall.finish_with_message("All files processed");
        }
    }))
}

fn tick(overall: &ProgressBar, processed: &AtomicU64, total: usize) {
    let count = processed.fetch_add(1, Ordering::SeqCst) + 1;
    overall.set_position(count);
    overall.set_message(format!("{count}/{total} files"));
}

fn format_success(path: &Path, outcome: &FileOutcome) -> String {
    let mut parts = vec![
        format!("{} → {}", format_bytes(outcome.original_size), format_bytes(outcome.output_size)),
        format_savings(outcome.original_size, outcome.output_size),
        format_duration(outcome.elapsed),
    ];
    if let Some(notes) = &outcome.notes {
        parts.push(notes.clone());
    }
    format!("✓ {} ({})", path.display(), parts.join(", "))
}

fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let as_f64 = bytes as f64;
    if as_f64 >= GB {
        format!("{:.2} GiB", as_f64 / GB)
    } else if as_f64 >= MB {
        format!("{:.2} MiB", as_f64 / MB)
    } else if as_f64 >= KB {
        format!("{:.2} KiB", as_f64 / KB)
    } else {
        format!("{bytes} B")
    }
}

fn format_savings(original: u64, optimized: u64) -> String {
    if original == 0 || optimized >= original {
        let delta = optimized.saturating_sub(original);
        format!("+{}", format_bytes(delta))
    } else {
        let saved = original - optimized;
        let percent = (saved as f64 / original as f64) * 100.0;
        format!("-{} ({percent:.1}% saved)", format_bytes(saved))
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs_f64() >= 1.0 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{} ms", duration.as_millis())
    }
}

fn overall_style() -> ProgressStyle {
    ProgressStyle::with_template("{bar:36.green/black} {pos:>2}/{len} files")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠁", "⠂", "⠄", "⠂"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = ProgressBus::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let token = bus.subscribe(Box::new(move |_event| {
            fired_clone.store(true, Ordering::SeqCst);
        }));
        bus.unsubscribe(token);
        bus.emit(ProgressEvent::RunFinished { total: 1, processed: 1 });
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn subscribed_handler_receives_event() {
        let bus = ProgressBus::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        bus.subscribe(Box::new(move |_event| {
            fired_clone.store(true, Ordering::SeqCst);
        }));
        bus.emit(ProgressEvent::RunFinished { total: 1, processed: 1 });
        assert!(fired.load(Ordering::SeqCst));
    }
}
