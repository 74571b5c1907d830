//! Logging configuration for simulation runs and live networks

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::LoggingError;

/// Where routing traces go and how much of them
///
/// `RUST_LOG` takes precedence over [`LogConfig::filter_directives`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub default_level: String,
    pub console: ConsoleConfig,
    /// Trace file; `None` keeps traces on the console only
    pub file: Option<FileConfig>,
    pub jsonl: JsonlConfig,
    pub filters: FilterConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: None,
            jsonl: JsonlConfig::default(),
            filters: FilterConfig::default(),
        }
    }
}

impl LogConfig {
    /// Human-readable engine decisions on the console
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            console: ConsoleConfig {
                enabled: true,
                pretty: true,
            },
            ..Default::default()
        }
    }

    /// JSONL traces in `log_dir`, one file per day, nothing on the console
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            console: ConsoleConfig {
                enabled: false,
                pretty: false,
            },
            file: Some(FileConfig {
                directory: log_dir,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Warnings only, so test output stays readable
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, LoggingError> {
        serde_json::from_str(json).map_err(LoggingError::Config)
    }

    /// Filter directive string: the default level, silenced crates, then
    /// per-target levels
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.default_level.clone()];
        for krate in &self.filters.silenced {
            directives.push(format!("{}=off", krate.replace('-', "_")));
        }
        for (target, level) in &self.filters.targets {
            directives.push(format!("{target}={level}"));
        }
        directives.join(",")
    }
}

/// Console output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Coloured human-readable lines instead of JSONL
    pub pretty: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pretty: false,
        }
    }
}

/// Trace file output, always JSONL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File name stem; `.log` is appended
    pub prefix: String,
    pub rotation: RotationStrategy,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "meshroute".to_string(),
            rotation: RotationStrategy::Daily,
        }
    }
}

/// When the trace file is rolled over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RotationStrategy {
    /// New file each day, appended to across runs
    #[default]
    Daily,
    /// One file truncated at startup, so it holds a single run
    PerRun,
}

/// Extra context carried by each JSONL line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonlConfig {
    /// Enclosing spans, which carry the node address and clock
    pub include_spans: bool,
    /// Source file and line of the event
    pub include_location: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            include_spans: true,
            include_location: false,
        }
    }
}

/// Per-target overrides of the default level
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Crates turned off entirely
    pub silenced: Vec<String>,
    /// Target to level, e.g. `meshroute_routing::aodv` to `trace`
    pub targets: BTreeMap<String, String>,
}
