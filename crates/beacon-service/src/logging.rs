//! Tracing setup for a process hosting the monitor.
//!
//! Hosts deployed on a device write JSON lines to a daily log file and a
//! compact copy to stdout; local runs get pretty stdout output with span
//! open/close events.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the default filter when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "BEACON_LOG_LEVEL";

/// File name prefix of the rolling log files.
const LOG_FILE_PREFIX: &str = "beacon-monitor";

/// Writer guards. Dropping one flushes and closes its writer, so they live
/// for the rest of the process.
static WRITER_GUARDS: OnceLock<[WorkerGuard; 2]> = OnceLock::new();

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG`, then `BEACON_LOG_LEVEL`, then `info`.
///
/// # Errors
///
/// Fails if the filter does not parse, the log directory cannot be created,
/// or a global subscriber is already installed.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let filter = build_filter(std::env::var(LOG_LEVEL_ENV).ok().as_deref())?;
    if is_production {
        install_device_logging(filter)
    } else {
        install_local_logging(filter)
    }
}

fn build_filter(fallback: Option<&str>) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    Ok(EnvFilter::try_new(fallback.unwrap_or("info"))?)
}

fn install_device_logging(filter: EnvFilter) -> anyhow::Result<()> {
    let dir = log_directory();
    std::fs::create_dir_all(&dir)?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        &dir,
        LOG_FILE_PREFIX,
    ));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout_writer)
                .with_ansi(false),
        )
        .try_init()?;

    let _ = WRITER_GUARDS.set([file_guard, stdout_guard]);
    Ok(())
}

fn install_local_logging(filter: EnvFilter) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
        )
        .try_init()?;
    Ok(())
}

/// Directory the production log files are written to.
#[must_use]
pub fn log_directory() -> PathBuf {
    directories::ProjectDirs::from("", "", LOG_FILE_PREFIX)
        .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_valid_path() {
        let dir = log_directory();
        assert!(dir.ends_with("logs"));
    }

    #[test]
    fn test_fallback_level_must_parse() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        assert!(build_filter(Some("debug")).is_ok());
        assert!(build_filter(None).is_ok());
        assert!(build_filter(Some("beacon_core=verbose")).is_err());
    }

    #[test]
    fn test_second_init_is_rejected() {
        assert!(init(false).is_ok());
        assert!(init(false).is_err());
    }
}
