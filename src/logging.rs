//! Structured logging and tracing for sevc
//!
//! Logging goes through the tracing ecosystem. The global subscriber is set
//! up once from [`LoggingConfig`]; components then log through a
//! [`StructuredLogger`] handed to them at construction time, which stamps
//! every line with the component name and any extra context.

use crate::config::LoggingConfig;
use crate::error::{Result, SevcError};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Once;
use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod level;
mod structured;

pub use level::parse_log_level;
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

// Keep the non-blocking worker guard alive for the entire process lifetime
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceCell<String> = OnceCell::new();

/// Initialize logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        if let Err(e) = init_subscriber(config) {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = INIT_ERROR.get() {
        return Err(SevcError::config(err.clone()));
    }
    Ok(())
}

fn init_subscriber(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = build_env_filter(level);

    let use_file = !config.file.trim().is_empty() && !should_use_console_only();

    let file_layer = if use_file {
        let (dir, prefix) = split_log_path(&config.file);
        let appender = rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .max_log_files(config.backup_count.max(1) as usize)
            .build(dir)
            .map_err(|e| SevcError::io(format!("Failed to create log file appender: {}", e)))?;
        let (writer, guard) = non_blocking(appender);
        let _ = LOG_GUARD.set(guard);

        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_ids(false)
            .with_file(false);
        Some(if config.json_format {
            base.json().boxed()
        } else {
            base.boxed()
        })
    } else {
        None
    };

    // Never end up with no output at all
    let console_layer = if config.console_output || file_layer.is_none() {
        let base = fmt::layer()
            .with_writer(std::io::stdout)
            .with_thread_ids(false)
            .with_file(false);
        Some(if config.json_format {
            base.json().boxed()
        } else {
            base.boxed()
        })
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| SevcError::config(format!("Failed to install subscriber: {}", e)))?;

    info!(
        "Logging initialized - level: {:?}, file: {}",
        level,
        if use_file { config.file.as_str() } else { "-" }
    );
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "solar_ev_charger={},sevc={},rumqttc=warn,zbus=warn",
            level, level
        )
        .into()
    })
}

fn should_use_console_only() -> bool {
    cfg!(test) || std::env::var_os("SEVC_DISABLE_FILE_LOG").is_some()
}

/// Split a configured log location into directory and file prefix.
/// A path with an extension names a file; anything else is a directory.
fn split_log_path(file: &str) -> (&Path, String) {
    let p = Path::new(file);
    if p.extension().is_some() {
        let prefix = p
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "sevc".to_string());
        (p.parent().unwrap_or_else(|| Path::new(".")), prefix)
    } else {
        (p, "sevc".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path() {
        let (dir, prefix) = split_log_path("/var/log/sevc/charger.log");
        assert_eq!(dir, Path::new("/var/log/sevc"));
        assert_eq!(prefix, "charger");

        let (dir, prefix) = split_log_path("/var/log/sevc");
        assert_eq!(dir, Path::new("/var/log/sevc"));
        assert_eq!(prefix, "sevc");
    }

    #[test]
    fn init_is_idempotent() {
        let config = LoggingConfig::default();
        // A second call must not try to install another subscriber
        let first = init_logging(&config);
        let second = init_logging(&config);
        assert_eq!(first.is_ok(), second.is_ok());
    }
}
