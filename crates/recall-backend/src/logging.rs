//! Tracing setup: env-filtered stdout output, plus a daily-rolling file
//! layer when `Config::log_dir` is set.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "recall.log";

/// Installs the global subscriber. The returned guard must be held for the
/// life of the process; dropping it flushes and stops the background file
/// writer.
pub fn init(config: &Config) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match file_writer(config.log_dir.as_deref()) {
        Some((writer, guard)) => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    guard
}

fn file_writer(
    log_dir: Option<&str>,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = log_dir?;
    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("log directory {dir} unusable: {err}");
        return None;
    }
    Some(tracing_appender::non_blocking(rolling::daily(
        dir,
        LOG_FILE_PREFIX,
    )))
}
