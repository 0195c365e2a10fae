//! Logging setup shared by the modstate binaries
//!
//! Dispatch routing, unhandled events and tree construction are reported
//! through `tracing`. This module wires a `tracing-subscriber` formatter to
//! stderr so stdout stays free for state snapshots.
//!
//! # Examples
//!
//! ```no_run
//! use libmodstate::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "debug").init();
//!
//! // Or honor MODSTATE_LOG_FORMAT / MODSTATE_LOG_LEVEL
//! libmodstate::logging::init_default();
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::config::LogSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain single-line output
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line, colored
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                other
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        })
    }
}

/// Subscriber settings resolved from flags, config or environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    /// Parse error for a format that fell back to text, reported by `init`
    fallback: Option<String>,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
            fallback: None,
        }
    }

    /// Build from the `[logging]` section of the config file.
    ///
    /// An unparseable format falls back to text with a warning once the
    /// subscriber is up.
    pub fn from_settings(settings: &LogSettings) -> Self {
        match settings.format.parse() {
            Ok(format) => Self::new(format, settings.level.clone()),
            Err(err) => Self {
                fallback: Some(err),
                ..Self::new(LogFormat::Text, settings.level.clone())
            },
        }
    }

    /// Why the configured format was replaced by text, if it was
    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Raise the level to `debug` (for `--verbose` flags).
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.level = "debug".to_string();
        }
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }

    /// Install the global subscriber.
    ///
    /// Returns `false` when a subscriber was already installed (tests, or a
    /// binary that initialized early); the existing one is kept.
    pub fn init(&self) -> bool {
        let filter = self.filter();
        let installed = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .flatten_event(true)
                .with_current_span(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .try_init(),
        };
        if let Some(reason) = &self.fallback {
            tracing::warn!("{}; using text", reason);
        }
        installed.is_ok()
    }
}

/// Initialize logging from `MODSTATE_LOG_FORMAT` and `MODSTATE_LOG_LEVEL`.
///
/// Defaults to text at `warn`.
pub fn init_default() -> bool {
    let format = std::env::var("MODSTATE_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    let level = std::env::var("MODSTATE_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());

    LoggingConfig::new(format, level).init()
}
