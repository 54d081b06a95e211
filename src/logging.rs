//! Tracing setup: a daily-rotated text log, a daily-rotated JSON log and a
//! compact stdout stream, all filtered by `RUST_LOG` (default `info`).

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Config;

/// Keeps the file writers alive. Buffered events are flushed when it drops,
/// so hold it until the program exits.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber, writing files under `log_dir`.
///
/// Creates `crawler.log` (text) and `crawler.json.log` (one JSON object per
/// event), both rotated daily. Fails if a global subscriber is already set.
///
/// `RUST_LOG=rust_crawler=debug,reqwest=warn` shows per-URL decisions
/// without transport noise.
pub fn init_logging<P: AsRef<Path>>(log_dir: P) -> Result<LogGuard, Box<dyn std::error::Error>> {
    let log_path = log_dir.as_ref();
    std::fs::create_dir_all(log_path)?;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new("info")?,
    };

    let text_file_appender = tracing_appender::rolling::daily(log_path, "crawler.log");
    let (text_writer, text_guard) = tracing_appender::non_blocking(text_file_appender);

    let json_file_appender = tracing_appender::rolling::daily(log_path, "crawler.json.log");
    let (json_writer, json_guard) = tracing_appender::non_blocking(json_file_appender);

    let text_layer = fmt::layer()
        .with_writer(text_writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_ansi(false)
        .compact()
        .with_filter(env_filter.clone());

    let json_layer = fmt::layer()
        .json()
        .with_writer(json_writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_filter(env_filter.clone());

    let stdout_layer = fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .with(stdout_layer)
        .try_init()?;

    tracing::debug!("Logging to {}", log_path.display());
    Ok(LogGuard {
        _guards: vec![text_guard, json_guard],
    })
}

/// [`init_logging`] into `<data_dir>/logs`.
pub fn init_logging_in_data_dir<P: AsRef<Path>>(
    data_dir: P,
) -> Result<LogGuard, Box<dyn std::error::Error>> {
    init_logging(data_dir.as_ref().join(Config::LOG_DIR))
}
