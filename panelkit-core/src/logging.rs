//! src/logging.rs
//! ============================================================================
//! # Logging: tracing subscriber setup
//!
//! Installs one global `tracing` subscriber:
//! - `EnvFilter` seeded from the configured level, `RUST_LOG` directives on top
//! - human-readable console layer on stderr
//! - optional JSON-lines file layer through a rolling, non-blocking appender
//!
//! The returned [`WorkerGuard`] must be held for as long as file output is
//! wanted; dropping it flushes the appender.

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Directory for JSON log files. Console only when unset.
    pub log_dir: Option<PathBuf>,

    pub log_file_prefix: CompactString,

    pub log_level: CompactString,

    pub console: bool,

    pub max_log_files: usize,

    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Daily,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            log_file_prefix: CompactString::const_new("panelkit"),
            log_level: CompactString::const_new("info"),
            console: true,
            max_log_files: 10,
            rotation: LogRotation::Daily,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Invalid log directory: {0}")]
    InvalidLogDirectory(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to install global tracing subscriber: {0}")]
    SubscriberInit(String),
}

static LOGGER_INSTALLED: AtomicBool = AtomicBool::new(false);

// Logger builder
pub struct LoggerBuilder {
    config: LoggerConfig,
}

impl LoggerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: &str) -> Self {
        self.config.log_level = CompactString::new(level);
        self
    }

    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = Some(log_dir.into());
        self
    }

    /// Install the subscriber. Returns the file appender guard when a log
    /// directory is configured.
    pub fn build(self) -> Result<Option<WorkerGuard>, LoggingError> {
        validate_config(&self.config)?;

        if LOGGER_INSTALLED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LoggingError::AlreadyInitialized);
        }

        let installed = self.install();
        if installed.is_err() {
            LOGGER_INSTALLED.store(false, Ordering::Release);
        }
        installed
    }

    fn install(&self) -> Result<Option<WorkerGuard>, LoggingError> {
        let filter: EnvFilter = make_filter(&self.config.log_level)?;

        let console_layer = self.config.console.then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact()
        });

        let (file_layer, guard) = match &self.config.log_dir {
            Some(log_dir) => {
                std::fs::create_dir_all(log_dir)?;

                let rotation: Rotation = match self.config.rotation {
                    LogRotation::Never => Rotation::NEVER,
                    LogRotation::Daily => Rotation::DAILY,
                };

                let appender: RollingFileAppender = RollingFileAppender::builder()
                    .rotation(rotation)
                    .filename_prefix(self.config.log_file_prefix.as_str())
                    .filename_suffix("jsonl")
                    .max_log_files(self.config.max_log_files)
                    .build(log_dir)
                    .map_err(|e| LoggingError::ConfigError(e.to_string()))?;

                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(writer);

                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| LoggingError::SubscriberInit(e.to_string()))?;

        Ok(guard)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn make_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    let directive: Directive = Directive::from_str(level)
        .map_err(|e| LoggingError::ConfigError(format!("Invalid log level `{level}`: {e}")))?;

    Ok(EnvFilter::from_default_env().add_directive(directive))
}

fn validate_config(config: &LoggerConfig) -> Result<(), LoggingError> {
    if config.log_level.trim().is_empty() {
        return Err(LoggingError::ConfigError(
            "Log level must not be empty".to_string(),
        ));
    }

    if config.log_file_prefix.is_empty() {
        return Err(LoggingError::ConfigError(
            "Log file prefix must not be empty".to_string(),
        ));
    }

    if let Some(log_dir) = &config.log_dir {
        validate_log_directory(log_dir)?;
    }

    Ok(())
}

fn validate_log_directory(path: &Path) -> Result<(), LoggingError> {
    if path.components().count() == 0 {
        return Err(LoggingError::InvalidLogDirectory("Empty path".to_string()));
    }

    if path.components().any(|c: Component<'_>| c == Component::ParentDir) {
        return Err(LoggingError::InvalidLogDirectory(
            "Path contains parent directory references".to_string(),
        ));
    }

    Ok(())
}

pub fn init_logging_with_config(config: LoggerConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    LoggerBuilder::new().with_config(config).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_configuration() {
        let empty_level = LoggerBuilder::new().with_level("  ").build();
        assert!(matches!(empty_level, Err(LoggingError::ConfigError(_))));

        let escaping = LoggerBuilder::new().with_log_dir("../outside").build();
        assert!(matches!(escaping, Err(LoggingError::InvalidLogDirectory(_))));
    }

    #[test]
    fn test_level_directive_parsing() {
        assert!(make_filter("debug").is_ok());
        assert!(make_filter("panelkit_core=trace").is_ok());
        assert!(matches!(make_filter("panelkit_core=verbose"), Err(LoggingError::ConfigError(_))));
    }

    #[test]
    fn test_config_defaults_from_partial_toml() {
        let config: LoggerConfig = toml::from_str("log_level = \"warn\"\nrotation = \"never\"").unwrap();

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.rotation, LogRotation::Never);
        assert_eq!(config.log_file_prefix, "panelkit");
        assert!(config.log_dir.is_none());
    }
}
