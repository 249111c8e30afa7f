//! Logging setup on top of `tracing`.
//!
//! # Environment Variables
//!
//! - `CHATDESK_LOG`: filter directive (like `RUST_LOG`), e.g. `chatdesk_session=debug`
//! - `CHATDESK_LOG_FORMAT`: stderr format, one of `pretty`, `json`, `compact`
//! - `CHATDESK_LOG_DIR`: directory for the rolling log file
//!
//! Prompt text, model output and the API key are never passed to `tracing`;
//! events carry lengths, counts and request ids instead.

use crate::config::{FileLoggingConfig, LoggingConfig as ConfigLoggingConfig};
use crate::error::{Error, Result};
use std::env;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format for stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output with colors
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
    /// Single-line output
    Compact,
}

impl LogFormat {
    pub const VALUES: &[LogFormat] = &[LogFormat::Pretty, LogFormat::Json, LogFormat::Compact];

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        }
    }
}

/// Resolved logging settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// Format requested by configuration; `CHATDESK_LOG_FORMAT` overrides it
    pub format: Option<LogFormat>,
    pub file: Option<FileLoggingConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "warn".to_string(), format: None, file: None }
    }
}

impl From<ConfigLoggingConfig> for LoggingConfig {
    fn from(config: ConfigLoggingConfig) -> Self {
        Self {
            level: config.level,
            format: LogFormat::parse_str(&config.format),
            file: if config.file.enabled { Some(config.file) } else { None },
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_file_logging(mut self, config: FileLoggingConfig) -> Self {
        self.file = Some(config);
        self
    }

    /// Filter directive: `CHATDESK_LOG`, then `RUST_LOG`, then the configured level
    fn filter_directive(&self) -> String {
        env::var("CHATDESK_LOG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| env::var("RUST_LOG").ok().filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| self.level.clone())
    }

    fn build_env_filter(&self) -> EnvFilter {
        let directive = self.filter_directive();
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"))
    }

    fn detect_format(&self) -> LogFormat {
        if let Ok(fmt_str) = env::var("CHATDESK_LOG_FORMAT")
            && let Some(fmt) = LogFormat::parse_str(&fmt_str)
        {
            return fmt;
        }

        if let Some(format) = self.format {
            return format;
        }

        if io::stderr().is_terminal() { LogFormat::Pretty } else { LogFormat::Compact }
    }

    fn log_dir(&self) -> Result<PathBuf> {
        if let Ok(custom_dir) = env::var("CHATDESK_LOG_DIR") {
            return Ok(PathBuf::from(custom_dir));
        }

        if let Some(dir) = self.file.as_ref().and_then(|f| f.dir.clone()) {
            return Ok(dir);
        }

        let home = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .map_err(|_| Error::Config("Could not determine home directory".to_string()))?;

        Ok(PathBuf::from(home).join(".chatdesk").join("logs"))
    }
}

/// Install the global subscriber.
///
/// When file logging is enabled the returned guard flushes the background
/// writer on drop; the caller keeps it alive for the life of the process.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<Option<WorkerGuard>> {
    let config = config.unwrap_or_default();
    let env_filter = config.build_env_filter();
    let format = config.detect_format();
    let ansi = io::stderr().is_terminal();

    let registry = Registry::default().with(env_filter);

    if config.file.is_some() {
        let log_dir = config.log_dir()?;
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| Error::Config(format!("Failed to create log directory: {}", e)))?;

        let file_appender = tracing_appender::rolling::daily(log_dir, "chatdesk.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let installed = match format {
            LogFormat::Pretty => registry
                .with(fmt::layer().pretty().with_writer(io::stderr).with_ansi(ansi))
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_writer(io::stderr))
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init(),
            LogFormat::Compact => registry
                .with(fmt::layer().compact().with_writer(io::stderr).with_ansi(ansi))
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init(),
        };
        installed.map_err(|e| Error::Config(format!("Failed to install logger: {}", e)))?;
        Ok(Some(guard))
    } else {
        let installed = match format {
            LogFormat::Pretty => registry
                .with(fmt::layer().pretty().with_writer(io::stderr).with_ansi(ansi))
                .try_init(),
            LogFormat::Json => registry.with(fmt::layer().json().with_writer(io::stderr)).try_init(),
            LogFormat::Compact => registry
                .with(fmt::layer().compact().with_writer(io::stderr).with_ansi(ansi))
                .try_init(),
        };
        installed.map_err(|e| Error::Config(format!("Failed to install logger: {}", e)))?;
        Ok(None)
    }
}
