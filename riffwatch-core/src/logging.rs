//! Logging for riffwatch
//!
//! The daemon logs to a daily-rotated file, by default
//! `~/.local/state/riffwatch/riffwatch.log` (see [`LoggingConfig::file_path`]).
//! Nothing is written to the terminal, which stays free for CLI diagnostics.

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Hold the returned guard until
/// exit; dropping it flushes buffered lines.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_file = config.file_path();
    let (log_dir, file_name) = split_log_file(&log_file)?;

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, file_name);

    // Non-blocking writer keeps file I/O off the polling task
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::info!(
        log_file = %log_file.display(),
        level = %config.level,
        version = env!("CARGO_PKG_VERSION"),
        "riffwatch logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Subscriber for tests, writing through the libtest capture.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Keeps the non-blocking log writer alive.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Directory and file-name prefix for the rolling appender.
fn split_log_file(path: &Path) -> Result<(PathBuf, OsString)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("log file {} has no file name", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name.to_os_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_file_splits_into_state_dir() {
        let config = LoggingConfig::default();
        let (dir, name) = split_log_file(&config.file_path()).unwrap();
        assert!(dir.ends_with("riffwatch"));
        assert_eq!(name, "riffwatch.log");
    }

    #[test]
    fn test_override_file_is_used() {
        let config = LoggingConfig {
            file: Some(PathBuf::from("/var/tmp/overlay/debug.log")),
            ..Default::default()
        };
        let (dir, name) = split_log_file(&config.file_path()).unwrap();
        assert_eq!(dir, PathBuf::from("/var/tmp/overlay"));
        assert_eq!(name, "debug.log");
    }

    #[test]
    fn test_bare_file_name_logs_to_working_dir() {
        let (dir, name) = split_log_file(Path::new("riffwatch.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "riffwatch.log");
    }

    #[test]
    fn test_path_without_file_name_is_rejected() {
        assert!(matches!(split_log_file(Path::new("/")), Err(Error::Config(_))));
    }
}
