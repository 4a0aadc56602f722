//! Logging infrastructure.
//!
//! Structured logging via the tracing ecosystem. `RUST_LOG` overrides
//! the configured level through the env filter.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level.
    pub level: Level,
    /// Whether to emit JSON lines instead of human-readable output.
    pub json_format: bool,
    /// Whether to include span open/close events.
    pub include_spans: bool,
    /// Whether to include the target (module path).
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_spans: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration for local development.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            json_format: false,
            include_spans: true,
            include_target: true,
        }
    }

    /// JSON configuration for production log shipping.
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            json_format: true,
            include_spans: false,
            include_target: true,
        }
    }
}

/// Initializes the global subscriber.
///
/// Returns an error if a subscriber is already installed (e.g. when
/// called twice from tests).
pub fn init_logging(config: &LoggingConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let layer = fmt::layer()
            .json()
            .with_target(config.include_target)
            .with_span_events(span_events);
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .map_err(|e| e.to_string())
    } else {
        let layer = fmt::layer()
            .with_target(config.include_target)
            .with_span_events(span_events);
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ() {
        let dev = LoggingConfig::development();
        let prod = LoggingConfig::production();
        assert_eq!(dev.level, Level::DEBUG);
        assert!(!dev.json_format);
        assert!(prod.json_format);
    }

    #[test]
    fn init_twice_reports_error() {
        let config = LoggingConfig::default();
        // First call may succeed or fail depending on test ordering;
        // the second must fail because a subscriber is installed.
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
