//! Configuration module
//!
//! Handles job monitor definitions and monitoring settings

mod job;
mod settings;

pub use job::{FixupMap, JobConfig, MonitorSpec};
pub use settings::{LineEnding, MonitorSettings};

use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A monitor block lacks a required field
    #[error("Monitor {monitor:?} is missing required field '{field}'")]
    MissingField {
        /// Monitor name, or its position when the name itself is missing
        monitor: String,
        /// Missing field
        field: &'static str,
    },

    /// A marker is not a valid regular expression
    #[error("Monitor {monitor:?} has an invalid '{field}' pattern: {source}")]
    InvalidPattern {
        /// Monitor name
        monitor: String,
        /// Field holding the pattern
        field: &'static str,
        /// Regex compiler error
        #[source]
        source: regex::Error,
    },

    /// The result pattern cannot produce a test case id
    #[error("Monitor {0:?} pattern has no 'test_case_id' group")]
    MissingCaseGroup(String),

    /// Job lists no monitor blocks
    #[error("No monitors defined")]
    NoMonitors,

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// File could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File extension is not a known config format
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
}
