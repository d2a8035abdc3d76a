//! Tracing setup shared by the server and the CLI.
//!
//! Events go to stdout and to a log file. `GRAPHPREP_LOG_FILE` names a file to append to;
//! without it events land in a daily-rotated `logs/graphprep.log`. File output is written by
//! `tracing-appender`'s background worker, whose guard lives until the process exits.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_VAR: &str = "GRAPHPREP_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_NAME: &str = "graphprep.log";

static FILE_WORKER: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` overrides the default `info` filter.
///
/// A log file that cannot be opened only disables the file layer.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = file_writer().map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .init();
}

fn file_writer() -> Option<NonBlocking> {
    let (writer, guard) = match std::env::var(LOG_FILE_VAR) {
        Ok(path) => append_to(Path::new(&path))?,
        Err(_) => daily_in(Path::new(DEFAULT_LOG_DIR))?,
    };
    let _ = FILE_WORKER.set(guard);
    Some(writer)
}

fn append_to(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => Some(tracing_appender::non_blocking(file)),
        Err(err) => {
            eprintln!("Cannot open log file {}: {err}", path.display());
            None
        }
    }
}

fn daily_in(dir: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("Cannot create log directory {}: {err}", dir.display());
        return None;
    }
    let appender = tracing_appender::rolling::daily(dir, DEFAULT_LOG_NAME);
    Some(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_log_file_is_created_for_appending() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("graphprep-test.log");
        assert!(append_to(&path).is_some());
        assert!(path.exists());
    }

    #[test]
    fn unwritable_log_file_disables_file_output() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("missing").join("graphprep.log");
        assert!(append_to(&path).is_none());
    }

    #[test]
    fn rotating_writer_creates_its_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let logs = dir.path().join("nested").join("logs");
        assert!(daily_in(&logs).is_some());
        assert!(logs.is_dir());
    }
}
