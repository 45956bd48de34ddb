//! Structured logging setup. The teacher repo has none; `log` + `env_logger`
//! is the lightweight pairing the wider pack reaches for on CLI tools of
//! this shape (see `other_examples/manifests/KAPKEPOT-PIXIE`).

use env_logger::Builder;
use log::LevelFilter;

/// Initializes the global logger. `-v`/`-vv` on the CLI raise the level;
/// `RUST_LOG` always wins when set, matching `env_logger`'s own precedence.
pub fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = Builder::new();
    builder.filter_level(default_level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    let _ = builder.try_init();
}
