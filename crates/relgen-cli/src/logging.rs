//! Logging setup.
//!
//! Logs go to stderr so that reports on stdout stay machine-readable.
//! `RUST_LOG` overrides the configured level.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::LoggingSettings;

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// JSON lines (true) or text (false)
    pub json_format: bool,
    /// Level used when `RUST_LOG` is not set
    pub default_level: Level,
    /// Emit span enter/exit events
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::WARN,
            include_spans: false,
        }
    }
}

impl LoggingConfig {
    pub fn json() -> Self {
        Self {
            json_format: true,
            ..Default::default()
        }
    }

    pub fn text() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            json_format: settings.json,
            default_level: parse_log_level(&settings.level),
            include_spans: false,
        }
    }
}

/// Map a configured level name to a [`Level`]; unknown names fall back to WARN.
pub fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

/// Install the global subscriber. Later calls have no effect.
pub fn init_logging(config: LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

    let span_events = if config.include_spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(span_events)
                .with_current_span(true)
                .with_target(true),
        );
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(span_events)
                .with_target(false),
        );
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// JSON subscriber writing to `writer`, for capturing logs in tests.
pub fn json_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(EnvFilter::new("trace"))
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        )
}
