//! # Logging
//!
//! `tracing` subscriber setup for hosts embedding the decoder core.
//!
//! Decoder workers log from their own named thread inside a
//! `decoder_session` span carrying the session id, so a session can be
//! followed through the output even when several run back to back.
//! [`LoggingConfig::decoder_debug`] turns on everything needed for that.
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogLevel, LoggingConfig};
//!
//! init_logging(LoggingConfig::default().with_level(LogLevel::Debug))?;
//! tracing::info!("host started");
//! ```
//!
//! [`LoggingConfig::from_env`] reads `DECODER_LOG` (an `EnvFilter`
//! directive string) and `DECODER_LOG_FORMAT` (`pretty`, `json` or
//! `compact`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::str::FromStr;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tracing_subscriber::{Layer, Registry};

/// Environment variable holding a filter directive string.
pub const FILTER_ENV: &str = "DECODER_LOG";
/// Environment variable selecting the output format.
pub const FORMAT_ENV: &str = "DECODER_LOG_FORMAT";

/// Crates logged at the configured level; everything else logs warnings.
const WORKSPACE_CRATES: &[&str] = &["decoder_workspace", "core_runtime", "core_decoder"];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// Output format of the `fmt` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored; for development.
    Pretty,
    /// One JSON object per event.
    Json,
    /// Single-line text.
    Compact,
}

impl Default for LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(Error::Config(format!("Unknown log format: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for the workspace crates.
    pub level: LogLevel,
    /// Full `EnvFilter` directive string; replaces the level-based default.
    pub filter: Option<String>,
    /// Log span open/close and attach span fields to events.
    pub enable_spans: bool,
    pub display_target: bool,
    /// Show thread names and ids (decoder workers are named).
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            enable_spans: true,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl LoggingConfig {
    /// Compact single-line output with the decoder at trace level and
    /// thread names shown, for following worker/controller interplay.
    pub fn decoder_debug() -> Self {
        Self {
            format: LogFormat::Compact,
            level: LogLevel::Debug,
            filter: Some("warn,core_runtime=debug,core_decoder=trace".to_string()),
            enable_spans: true,
            display_target: false,
            display_thread_info: true,
        }
    }

    /// Defaults overridden by [`FILTER_ENV`] and [`FORMAT_ENV`] when set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(filter) = std::env::var(FILTER_ENV) {
            if !filter.trim().is_empty() {
                config.filter = Some(filter);
            }
        }
        if let Ok(format) = std::env::var(FORMAT_ENV) {
            config.format = format.parse()?;
        }
        Ok(config)
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }

    /// The directive string [`init_logging`] will install.
    pub fn filter_directives(&self) -> String {
        match &self.filter {
            Some(filter) => filter.clone(),
            None => {
                let mut directives = vec!["warn".to_string()];
                directives.extend(
                    WORKSPACE_CRATES
                        .iter()
                        .map(|krate| format!("{krate}={}", self.level.as_str())),
                );
                directives.join(",")
            }
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// [`Error::Config`] if the filter does not parse or a global subscriber
/// is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    tracing_subscriber::registry()
        .with(fmt_layer(&config))
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {e}")))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(config.filter_directives())
        .map_err(|e| Error::Config(format!("Invalid log filter: {e}")))
}

fn fmt_layer(config: &LoggingConfig) -> BoxedLayer {
    let spans = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
        .with_writer(io::stdout);

    match config.format {
        LogFormat::Pretty => layer.pretty().with_span_events(spans).boxed(),
        LogFormat::Compact => layer.compact().with_span_events(spans).boxed(),
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(config.enable_spans)
            .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_level(LogLevel::Debug)
            .with_spans(false)
            .with_thread_info(true);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.enable_spans);
        assert!(config.display_thread_info);
    }

    #[test]
    fn test_default_directives_cover_workspace() {
        let directives = LoggingConfig::default()
            .with_level(LogLevel::Debug)
            .filter_directives();
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("core_decoder=debug"));
        assert!(directives.contains("core_runtime=debug"));
    }

    #[test]
    fn test_custom_filter_replaces_default() {
        let config = LoggingConfig::default().with_filter("core_decoder=trace");
        assert_eq!(config.filter_directives(), "core_decoder=trace");
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        let config = LoggingConfig::default().with_filter("core_decoder=notalevel");
        assert!(matches!(build_filter(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_decoder_debug_preset() {
        let config = LoggingConfig::decoder_debug();
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.display_thread_info);
        assert!(config.filter_directives().contains("core_decoder=trace"));
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!(matches!("xml".parse::<LogFormat>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_level_ordering_and_conversion() {
        assert!(LogLevel::Trace < LogLevel::Error);
        assert_eq!(LogLevel::from(tracing::Level::WARN), LogLevel::Warn);
        assert_eq!(
            serde_json::to_string(&LogLevel::Info).unwrap(),
            "\"info\""
        );
    }
}
