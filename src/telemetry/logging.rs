//! Logging initialization

use anyhow::Result;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TelemetryConfig;

const LOG_FILE_PREFIX: &str = "learning-engine.log";

/// Install the global subscriber.
///
/// When `log_dir` is set, a daily-rolling file copy is written through a
/// non-blocking writer; keep the returned guard alive to flush it.
pub fn init_logging(config: &TelemetryConfig) -> Result<Option<WorkerGuard>> {
    let log_level = parse_log_level(&config.log_level);

    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let (file_writer, guard) = match config.log_dir.as_deref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    if config.json_logs {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        let file_layer = file_writer.map(|writer| {
            fmt::layer().json().with_ansi(false).with_writer(writer)
        });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact();
        let file_layer = file_writer.map(|writer| {
            fmt::layer().compact().with_ansi(false).with_writer(writer)
        });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .try_init()?;
    }

    Ok(guard)
}

fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
