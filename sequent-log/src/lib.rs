//! Sequent Logging
//!
//! Installs a `tracing` subscriber configured from environment variables.
//! Library crates in the workspace only emit events through `tracing`;
//! applications call [`init`] once at startup to see them.
//!
//! # Usage
//!
//! ```rust,ignore
//! fn main() {
//!     sequent_log::init();
//!     tracing::info!("ready");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `SEQUENT_DEBUG=1` - Shorthand for debug level
//! - `SEQUENT_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `SEQUENT_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `SEQUENT_LOG_COLOR=1|0` - Enable/disable colors
//! - `SEQUENT_LOG_TIMESTAMPS=1|0` - Include timestamps
//! - `SEQUENT_LOG_MODULE=1|0` - Include the event target
//!
//! `RUST_LOG`, when set, overrides the level with a full filter directive.

use once_cell::sync::OnceCell;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, TestWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

// ============================================================================
// Log Levels
// ============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl FromStr for Level {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "off" | "none" => Ok(Level::Off),
            _ => Err(LogError::UnknownLevel(s.to_string())),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl FromStr for Format {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Format::Pretty),
            "compact" => Ok(Format::Compact),
            "json" => Ok(Format::Json),
            _ => Err(LogError::UnknownFormat(s.to_string())),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Logging setup errors
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Unknown log level: {0}")]
    UnknownLevel(String),

    #[error("Unknown log format: {0}")]
    UnknownFormat(String),

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include the event target
    pub module_path: bool,
    /// Write through libtest's captured output instead of stdout
    pub test_writer: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Json,
            color: false, // JSON output doesn't use colors
            timestamps: true,
            module_path: true,
            test_writer: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        };

        let debug = flag("SEQUENT_DEBUG").unwrap_or(false);

        let level = lookup("SEQUENT_LOG_LEVEL")
            .and_then(|s| s.parse().ok())
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("SEQUENT_LOG_FORMAT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(Format::Json);

        let color = flag("SEQUENT_LOG_COLOR").unwrap_or_else(|| {
            format != Format::Json && lookup("NO_COLOR").is_none() && lookup("TERM").is_some()
        });

        Self {
            level,
            format,
            color,
            timestamps: flag("SEQUENT_LOG_TIMESTAMPS").unwrap_or(true),
            module_path: flag("SEQUENT_LOG_MODULE").unwrap_or(true),
            test_writer: false,
        }
    }

    /// Route output through the test harness so `cargo test` captures it.
    pub fn with_test_writer(mut self) -> Self {
        self.test_writer = true;
        self
    }

    /// Level filter; `RUST_LOG` takes precedence when set.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
        let writer = if self.test_writer {
            BoxMakeWriter::new(TestWriter::new())
        } else {
            BoxMakeWriter::new(std::io::stdout)
        };

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(self.module_path)
            .with_ansi(self.color);

        match (self.format, self.timestamps) {
            (Format::Json, true) => layer.json().flatten_event(true).boxed(),
            (Format::Json, false) => layer.json().flatten_event(true).without_time().boxed(),
            (Format::Compact, true) => layer.compact().boxed(),
            (Format::Compact, false) => layer.compact().without_time().boxed(),
            (Format::Pretty, true) => layer.pretty().boxed(),
            (Format::Pretty, false) => layer.pretty().without_time().boxed(),
        }
    }

    /// Build a subscriber for this configuration without installing it.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::registry()
            .with(self.fmt_layer())
            .with(self.filter())
    }
}

// ============================================================================
// Installation
// ============================================================================

static INSTALLED: OnceCell<LogConfig> = OnceCell::new();

/// Install the global subscriber for `config`.
///
/// Fails if another global subscriber was installed first.
pub fn try_init(config: LogConfig) -> Result<(), LogError> {
    INSTALLED
        .get_or_try_init(|| {
            config
                .subscriber()
                .try_init()
                .map_err(|e| LogError::Init(e.to_string()))?;
            Ok(config)
        })
        .map(|_| ())
}

/// Install the global subscriber from the environment.
///
/// Safe to call more than once; only the first call has an effect.
pub fn init() {
    if let Err(e) = try_init(LogConfig::from_env()) {
        eprintln!("sequent-log: {}", e);
    }
}

/// Configuration of the installed subscriber, if any.
pub fn installed() -> Option<&'static LogConfig> {
    INSTALLED.get()
}

// ============================================================================
// Tests
// ============================================================================
