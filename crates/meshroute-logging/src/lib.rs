//! Logging setup for meshroute
//!
//! Every meshroute crate logs through `tracing`. This crate turns those
//! events into console output (pretty or JSONL) and optional rolling JSONL
//! files, and tags spans with the node they belong to so one log can hold
//! a whole simulated mesh.
//!
//! # Quick Start
//!
//! ```ignore
//! use meshroute_logging::{LogConfig, MeshSubscriberBuilder};
//!
//! // JSONL to console
//! MeshSubscriberBuilder::new().init();
//!
//! // Human-readable output while developing
//! MeshSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! # Node Context
//!
//! Use [`NodeContextGuard`] to mark which node the current code acts for:
//!
//! ```ignore
//! use meshroute_logging::NodeContextGuard;
//!
//! let _guard = NodeContextGuard::with_label(addr, "A");
//! engine.handle_timer(handle, timer)?;
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, FilterConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard};
pub use layers::{NodeContextExtension, NodeContextLayer};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::layer::Layered;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while setting up logging
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Configuration could not be parsed
    #[error("Invalid log configuration: {0}")]
    Config(#[source] serde_json::Error),

    /// Log file or directory could not be created
    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    /// Rolling appender could not be built
    #[error("Log appender error: {0}")]
    Appender(#[from] InitError),

    /// A global subscriber is already installed
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

type Filtered = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Filtered> + Send + Sync>;

/// Builder for the meshroute tracing subscriber
///
/// By default, console output uses JSONL. Use [`LogConfig::development`]
/// for human-readable output.
pub struct MeshSubscriberBuilder {
    config: LogConfig,
}

impl MeshSubscriberBuilder {
    /// Create a builder with the default configuration
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

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Install the subscriber globally, reporting failures on stderr
    ///
    /// Keep the returned guard alive for as long as file output should be
    /// flushed.
    pub fn init(self) -> Option<WorkerGuard> {
        self.try_init().unwrap_or_else(|err| {
            eprintln!("Warning: {err}");
            None
        })
    }

    /// Install the subscriber globally
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.filter_directives()));

        let mut layers: Vec<BoxedLayer> = vec![NodeContextLayer::new().boxed()];
        let mut guard = None;

        if self.config.console.enabled {
            layers.push(self.console_layer());
        }
        if let Some(file_config) = &self.config.file {
            let (writer, worker) = file_writer(file_config)?;
            guard = Some(worker);
            layers.push(self.file_layer(writer));
        }

        Registry::default().with(env_filter).with(layers).try_init()?;
        Ok(guard)
    }

    fn console_layer(&self) -> BoxedLayer {
        if self.config.console.pretty {
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_target(true)
                .boxed()
        } else {
            self.jsonl_layer(std::io::stdout)
        }
    }

    fn file_layer(&self, writer: NonBlocking) -> BoxedLayer {
        self.jsonl_layer(writer)
    }

    fn jsonl_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
    {
        let jsonl = &self.config.jsonl;
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(jsonl.include_spans)
            .with_span_list(jsonl.include_spans)
            .with_file(jsonl.include_location)
            .with_line_number(jsonl.include_location)
            .with_writer(writer)
            .boxed()
    }
}

impl Default for MeshSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the configured trace file; a per-run file is truncated, daily files append
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(&config.directory)?;
    match config.rotation {
        RotationStrategy::PerRun => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            Ok(tracing_appender::non_blocking(File::create(path)?))
        }
        RotationStrategy::Daily => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(&config.prefix)
                .filename_suffix("log")
                .build(&config.directory)?;
            Ok(tracing_appender::non_blocking(appender))
        }
    }
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Option<WorkerGuard> {
    MeshSubscriberBuilder::new().init()
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Option<WorkerGuard> {
    MeshSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Initialize logging for tests; repeated calls are harmless
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
        assert_eq!(builder.config.default_level, "info");
        assert!(!builder.config.console.pretty);
    }

    #[test]
    fn test_builder_with_config() {
        let builder = MeshSubscriberBuilder::new().with_config(LogConfig::development());
        assert_eq!(builder.config.default_level, "debug");
        assert!(builder.config.console.pretty);
    }

    #[test]
    fn test_builder_setters() {
        let builder = MeshSubscriberBuilder::new()
            .with_level("trace")
            .with_console(false)
            .with_file_output(FileConfig::default());
        assert_eq!(builder.config.default_level, "trace");
        assert!(!builder.config.console.enabled);
        assert!(builder.config.file.is_some());
    }

    #[test]
    fn test_single_file_writer_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig {
            directory: dir.path().join("nested"),
            prefix: "sim".to_string(),
            rotation: RotationStrategy::PerRun,
        };

        let (_writer, _guard) = file_writer(&config).unwrap();
        assert!(dir.path().join("nested").join("sim.log").exists());
    }

    #[test]
    fn test_init_testing_twice_is_harmless() {
        init_testing();
        init_testing();
        tracing::warn!("Logging initialized twice");
    }
}
