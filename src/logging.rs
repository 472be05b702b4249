//! Logging setup
//!
//! Rolling-file output (non-blocking) plus a colored stdout layer for
//! dev runs; JSON file output for aggregation when `use_json` is set.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialise the global subscriber.
///
/// The returned guard must live as long as the process; dropping it
/// loses buffered log lines.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (file_writer, guard) =
        tracing_appender::non_blocking(rolling_appender(config));

    // RUST_LOG wins over the configured level when set
    let default_filter = if config.enable_tracing {
        EnvFilter::new(&config.log_level)
    } else {
        EnvFilter::new(format!("{},bounty_ledger=off", config.log_level))
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or(default_filter);

    if config.use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true) // Keep target in JSON for structured queries
                    .with_writer(file_writer)
                    .with_ansi(false),
            )
            .init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(file_writer)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stdout_layer)
            .init();
    }

    guard
}

fn rolling_appender(config: &AppConfig) -> RollingFileAppender {
    match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    }
}
