//! Tracing subscriber initialisation.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(LoggerError::InvalidFormat(s.to_owned())),
        }
    }
}

/// Logger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Line format.
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `harbormaster=debug,warn`.
    pub level: String,
    /// Whether the event target is printed.
    pub with_targets: bool,
    /// Whether ANSI colours are used by the text format.
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_owned(),
            with_targets: true,
            use_color: false,
        }
    }
}

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Unknown format name.
    #[error("invalid logger format: {0} (expected: text|json)")]
    InvalidFormat(String),
    /// The level is not a valid filter directive.
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
    /// A global subscriber is already installed.
    #[error("logger has already been initialized")]
    AlreadyInitialized,
}

/// Installs the global tracing subscriber described by `config`.
///
/// # Errors
///
/// Returns [`LoggerError::InvalidLogLevel`] for a malformed filter and
/// [`LoggerError::AlreadyInitialized`] when a subscriber is already set.
pub fn logger_init(config: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|_| LoggerError::InvalidLogLevel(config.level.clone()))?;
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LoggerFormat::Text => registry
            .with(
                fmt::layer()
                    .with_ansi(config.use_color)
                    .with_target(config.with_targets),
            )
            .try_init(),
        LoggerFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_target(config.with_targets),
            )
            .try_init(),
    }
    .map_err(|_| LoggerError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::{LoggerConfig, LoggerError, LoggerFormat, logger_init};
    use rstest::rstest;

    #[rstest]
    #[case("text", LoggerFormat::Text)]
    #[case(" JSON ", LoggerFormat::Json)]
    fn parses_known_formats(#[case] raw: &str, #[case] expected: LoggerFormat) {
        assert_eq!(raw.parse::<LoggerFormat>().ok(), Some(expected));
    }

    #[rstest]
    fn rejects_unknown_format() {
        let parsed = "journald".parse::<LoggerFormat>();
        assert!(matches!(parsed, Err(LoggerError::InvalidFormat(name)) if name == "journald"));
    }

    #[rstest]
    fn rejects_malformed_level() {
        let config = LoggerConfig {
            level: "harbormaster=loudest".to_owned(),
            ..LoggerConfig::default()
        };
        assert!(matches!(
            logger_init(&config),
            Err(LoggerError::InvalidLogLevel(_))
        ));
    }
}
