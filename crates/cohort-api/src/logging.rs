//! Logging setup
//!
//! Installs a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
//! Output goes to `LOG_FILE_PATH` when set and writable, otherwise stderr.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LogFormat;

/// Log destination: the file at `path` in append mode, or stderr if there is
/// no path or the file cannot be opened. The open error is returned so it can
/// be reported once logging is up.
pub fn make_writer(path: Option<&Path>) -> (BoxMakeWriter, bool, Option<io::Error>) {
    let Some(path) = path else {
        return (BoxMakeWriter::new(io::stderr), true, None);
    };

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => (BoxMakeWriter::new(Mutex::new(file)), false, None),
        Err(e) => (BoxMakeWriter::new(io::stderr), true, Some(e)),
    }
}

pub fn init_logging(format: LogFormat, log_file_path: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (writer, is_stderr, open_error) = make_writer(log_file_path);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_current_span(false)
                        .with_writer(writer),
                )
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_ansi(is_stderr).with_writer(writer))
                .init();
        }
    }

    if let (Some(path), Some(e)) = (log_file_path, open_error) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "Can't open log file, logging to stderr"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_defaults_to_stderr() {
        let (_, is_stderr, err) = make_writer(None);
        assert!(is_stderr);
        assert!(err.is_none());
    }

    #[test]
    fn test_writer_opens_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cohort.log");

        let (_, is_stderr, err) = make_writer(Some(&path));
        assert!(!is_stderr);
        assert!(err.is_none());
        assert!(path.exists());
    }

    #[test]
    fn test_writer_falls_back_on_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("cohort.log");

        let (_, is_stderr, err) = make_writer(Some(&path));
        assert!(is_stderr);
        assert!(err.is_some());
    }
}
