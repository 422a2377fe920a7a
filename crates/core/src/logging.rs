use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter directives read before `RUST_LOG`, e.g. `NUTPIPE_LOG=nutpipe_core::dao=debug`.
pub const LOG_ENV: &str = "NUTPIPE_LOG";

/// Directory receiving the rolling log files: `NUTPIPE_LOG_DIR`, else `~/.nutpipe/logs`.
pub fn log_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("NUTPIPE_LOG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nutpipe")
        .join("logs")
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Keep the guard alive until exit or buffered lines are lost.
///
/// A second call leaves the first subscriber in place.
pub fn init_logging(component: &str, to_stderr: bool) -> WorkerGuard {
    let dir = log_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("nutpipe: cannot create {}: {}", dir.display(), e);
    }

    // nutpipe-<component>.log.<date>
    let appender = tracing_appender::rolling::daily(&dir, format!("nutpipe-{component}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let files = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_names(true);
    let console = to_stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
    });

    let installed = tracing_subscriber::registry()
        .with(filter())
        .with(files)
        .with(console)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Logging already initialized, keeping the existing subscriber");
    }
    guard
}
