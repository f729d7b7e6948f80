//! Console and diagnostic-file logging.
//!
//! Console output is the daemon's human-readable status line. When the
//! diagnostics directory is writable, the same events also go to a daily
//! rolling file there. The JSONL activity log is not written through here.

use std::env;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEBUG_ENV: &str = "DEVWATCH_DEBUG_LOG";
const FILE_PREFIX: &str = "devwatch-daemon.log";

/// Installs the global subscriber. Keep the returned guard alive for the
/// whole process or buffered file output is lost.
pub fn init(diagnostics_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard, file_error) = match diagnostics_dir.map(file_writer) {
        Some(Ok((writer, guard))) => (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
            None,
        ),
        Some(Err(err)) => (None, None, Some(err)),
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer())
        .with(file_layer)
        .init();

    if let Some(err) = file_error {
        tracing::warn!(error = %err, "Diagnostic log file disabled");
    }
    guard
}

fn filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn file_writer(
    dir: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), String> {
    fs_err::create_dir_all(dir).map_err(|err| err.to_string())?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(FILE_PREFIX)
        .build(dir)
        .map_err(|err| format!("{}: {}", dir.display(), err))?;
    Ok(tracing_appender::non_blocking(appender))
}
