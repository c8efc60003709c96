//! Structured logging for the mesh simulator
//!
//! A single flood can recurse through every simulated node within one call
//! stack, so plain log lines quickly become impossible to attribute. This
//! crate sets up a `tracing` subscriber that knows which node is currently
//! handling a packet.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines format (default)
//! - **Pretty Output**: Human-readable console output for development
//! - **Node Context Injection**: [`NodeContextGuard`] marks the active node
//! - **File Output**: Optional single-file or rotating output via tracing-appender
//!
//! # Quick Start
//!
//! ```ignore
//! use meshsim_logging::{LogConfig, MeshSubscriberBuilder};
//!
//! // JSONL to console
//! MeshSubscriberBuilder::new().init();
//!
//! // Development mode with pretty output
//! MeshSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard};
pub use layers::{NodeContextExtension, NodeContextLayer};

use std::fs::{self, File};

use thiserror::Error;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors that can occur while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

/// Builder for configuring and initializing the simulator's subscriber
///
/// By default, console output uses JSONL format. Use
/// `LogConfig::development()` for human-readable output.
pub struct MeshSubscriberBuilder {
    config: LogConfig,
}

impl MeshSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Use pretty (true) or JSONL (false) console output
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.config.console.pretty = pretty;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Current configuration
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Initialize the subscriber globally
    ///
    /// Returns a guard that must be kept alive for the duration of the
    /// program when file output is enabled.
    ///
    /// # Panics
    ///
    /// Panics if a global subscriber has already been set or the log file
    /// cannot be created. Use [`Self::try_init`] to handle those cases.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => panic!("failed to initialize logging: {e}"),
        }
    }

    /// Try to initialize the subscriber globally
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.default_level));

        let file_writer = match &self.config.file {
            Some(file_config) => Some(create_file_writer(file_config)?),
            None => None,
        };

        let registry = Registry::default()
            .with(env_filter)
            .with(NodeContextLayer::new());

        let jsonl = &self.config.jsonl;
        let console = &self.config.console;

        let (result, guard) = match (console.enabled, console.pretty, file_writer) {
            // Pretty console + File
            (true, true, Some((writer, guard))) => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true);
                let file_layer = jsonl_layer(jsonl, writer);
                (
                    registry.with(console_layer).with(file_layer).try_init(),
                    Some(guard),
                )
            }

            // JSONL console + File
            (true, false, Some((writer, guard))) => {
                let console_layer = jsonl_layer(jsonl, std::io::stdout);
                let file_layer = jsonl_layer(jsonl, writer);
                (
                    registry.with(console_layer).with(file_layer).try_init(),
                    Some(guard),
                )
            }

            // Pretty console only
            (true, true, None) => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true);
                (registry.with(console_layer).try_init(), None)
            }

            // JSONL console only (DEFAULT)
            (true, false, None) => {
                let console_layer = jsonl_layer(jsonl, std::io::stdout);
                (registry.with(console_layer).try_init(), None)
            }

            // File only (no console)
            (false, _, Some((writer, guard))) => {
                let file_layer = jsonl_layer(jsonl, writer);
                (registry.with(file_layer).try_init(), Some(guard))
            }

            // Nothing enabled - just base registry
            (false, _, None) => (registry.try_init(), None),
        };

        result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
        Ok(guard)
    }
}

impl Default for MeshSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// JSONL formatting layer configured from a [`JsonlConfig`]
pub fn jsonl_layer<S, W>(
    config: &JsonlConfig,
    writer: W,
) -> tracing_subscriber::fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(writer)
}

/// Create the file writer: truncates for `Never` rotation, appends otherwise
fn create_file_writer(file_config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let pair = match file_config.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&file_config.directory)?;
            let file_path = file_config
                .directory
                .join(format!("{}.log", file_config.prefix));
            tracing_appender::non_blocking(File::create(file_path)?)
        }
        RotationStrategy::Daily => tracing_appender::non_blocking(RollingFileAppender::new(
            Rotation::DAILY,
            &file_config.directory,
            &file_config.prefix,
        )),
        RotationStrategy::Hourly => tracing_appender::non_blocking(RollingFileAppender::new(
            Rotation::HOURLY,
            &file_config.directory,
            &file_config.prefix,
        )),
    };
    Ok(pair)
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() {
    MeshSubscriberBuilder::new().init();
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() {
    MeshSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// Initialize logging for testing (minimal output, ignores repeat calls)
pub fn init_testing() {
    let _ = MeshSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = MeshSubscriberBuilder::new();
        assert_eq!(builder.config().default_level, "info");
        assert!(!builder.config().console.pretty); // JSONL by default
    }

    #[test]
    fn test_builder_with_config() {
        let builder = MeshSubscriberBuilder::new().with_config(LogConfig::development());
        assert_eq!(builder.config().default_level, "debug");
        assert!(builder.config().console.pretty);
    }

    #[test]
    fn test_builder_setters() {
        let builder = MeshSubscriberBuilder::new()
            .with_level("trace")
            .with_console(false)
            .with_pretty(true);
        assert_eq!(builder.config().default_level, "trace");
        assert!(!builder.config().console.enabled);
        assert!(builder.config().console.pretty);
    }

    #[test]
    fn test_file_writer_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig {
            directory: dir.path().join("nested"),
            prefix: "run".to_string(),
            rotation: RotationStrategy::Never,
        };

        let (_writer, _guard) = create_file_writer(&config).unwrap();
        assert!(dir.path().join("nested").join("run.log").exists());
    }
}
