//! Install log setup.
//!
//! Everything logged through the `log` facade or `tracing` lands in the
//! install log file. The console is reserved for operator messages
//! (see [`crate::console`]).

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Open (append) the log file and install the global subscriber.
///
/// `RUST_LOG` overrides the default `info` filter. If the log file cannot
/// be opened, logging falls back to stderr so the run is not blocked.
pub fn init(log_path: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = (|| -> io::Result<fs::File> {
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(log_path)
    })();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false);

    // try_init: a second call (tests, extension runs) keeps the first subscriber
    let _ = match file {
        Ok(file) => builder.with_writer(Mutex::new(file)).try_init(),
        Err(e) => {
            eprintln!("Cannot open log file {}: {}", log_path.display(), e);
            builder.with_writer(io::stderr).try_init()
        }
    };
}
