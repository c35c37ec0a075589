//! Process-wide `tracing` subscriber: coloured stderr plus a JSON log file.

use std::ffi::OsStr;
use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub const DEFAULT_LOG_FILE: &str = "logs/transit_board.log";

/// Installs the global subscriber.
///
/// The stderr layer follows `RUST_LOG` (default `info`), the daily-rolling
/// JSON file layer follows `RUST_LOG_JSON` (default `warn`). Keep the
/// returned guard alive for the whole run or buffered file lines are lost.
pub fn init(log_file_path: &str) -> anyhow::Result<WorkerGuard> {
    let path = Path::new(log_file_path);
    let log_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let log_file_name = path.file_name().unwrap_or(OsStr::new("transit_board.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter("RUST_LOG", "info")?);

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(env_filter("RUST_LOG_JSON", "warn")?);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .context("cannot install tracing subscriber")?;

    Ok(guard)
}

fn env_filter(var: &str, default: &str) -> anyhow::Result<EnvFilter> {
    match std::env::var(var) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(&directives).with_context(|| format!("invalid {var}: {directives}"))
        }
        _ => Ok(EnvFilter::new(default)),
    }
}
