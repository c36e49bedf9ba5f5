//! Structured logging setup (spec ambient stack).
//!
//! Grounded on `abathur::infrastructure::logging::logger::LoggerImpl`:
//! an `EnvFilter`-gated `tracing-subscriber` registry, JSON or pretty
//! formatted, optionally teed to a rotating file via `tracing-appender`.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format for the stdout log layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Logging configuration (spec ambient stack, not a spec module).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_format")]
    pub format: LogFormat,
    /// Directory for rotated JSON log files; stdout-only when `None`.
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_level(), format: default_format(), log_dir: None }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> LogFormat {
    LogFormat::Json
}

fn parse_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(format!("invalid log level: {other}")),
    }
}

/// Holds the non-blocking file-appender guard alive for the process
/// lifetime; dropping it flushes and stops the writer thread.
pub struct LoggerGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global `tracing` subscriber per `config`. Call once, at
/// process start.
pub fn init(config: &LogConfig) -> Result<LoggerGuard, String> {
    let default_level = parse_level(&config.level)?;
    let env_filter = EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();

    let stdout_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stdout)
            .with_target(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(io::stdout)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    let file_guard = if let Some(log_dir) = &config.log_dir {
        let appender = tracing_appender::rolling::daily(log_dir, "castellan.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer().json().with_writer(non_blocking).with_ansi(false);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer)
            .with(file_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(env_filter).with(stdout_layer).init();
        None
    };

    tracing::info!(level = %config.level, format = ?config.format, file_output = config.log_dir.is_some(), "logger initialized");
    Ok(LoggerGuard { _file_guard: file_guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels_case_insensitively() {
        assert!(matches!(parse_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(parse_level("warn"), Ok(Level::WARN)));
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(parse_level("verbose").is_err());
    }
}
