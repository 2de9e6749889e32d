//! Log setup shared by the HTTP server and the CLI.
//!
//! Pipeline milestones (ingestion, corpus loads, answered questions) are emitted as structured
//! `tracing` events. They are printed to the terminal and appended to a log file so an ingestion
//! run from the CLI and the server that later serves the corpus leave one trail. The file is
//! `DOCQA_LOG_FILE` when set, otherwise `logs/docqa.log`; missing parent directories are created.
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "DOCQA_LOG_FILE";
const DEFAULT_LOG_PATH: &str = "logs/docqa.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the terminal and file subscribers.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Calling this more than once keeps the
/// first subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let terminal = fmt::layer().with_target(false).compact();
    let file = open_log_file(&log_file_path(std::env::var_os(LOG_FILE_ENV)))
        .map(|writer| fmt::layer().with_writer(writer).with_ansi(false).compact());

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(terminal)
        .with(file)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Tracing already initialized");
    }
}

fn log_file_path(configured: Option<std::ffi::OsString>) -> PathBuf {
    configured
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH))
}

/// Open `path` for appending behind a non-blocking writer.
///
/// Logging to the terminal continues when the file cannot be opened.
fn open_log_file(path: &Path) -> Option<NonBlocking> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {err}", parent.display());
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(writer)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_defaults_when_unset_or_blank() {
        assert_eq!(log_file_path(None), PathBuf::from("logs/docqa.log"));
        assert_eq!(
            log_file_path(Some("".into())),
            PathBuf::from("logs/docqa.log")
        );
        assert_eq!(
            log_file_path(Some("/var/log/docqa.log".into())),
            PathBuf::from("/var/log/docqa.log")
        );
    }

    #[test]
    fn log_file_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/run/docqa.log");

        assert!(open_log_file(&path).is_some());
        assert!(path.exists());
    }
}
