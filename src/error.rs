//! Error types for monitoring invocations

use crate::config::ConfigError;
use crate::core::stream::StreamError;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Fatal errors that abort a monitoring invocation.
///
/// Non-fatal conditions (timeouts, bad result values, a skipped precondition)
/// are reported through the outcome status instead.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Stream was never opened or is already closed
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// Measurement group did not hold a number
    #[error("Invalid measurement {value:?} for test case {case}: {source}")]
    InvalidMeasurement {
        /// Normalized test case id
        case: String,
        /// Raw captured text
        value: String,
        /// Parser error
        #[source]
        source: std::num::ParseFloatError,
    },

    /// Stream I/O failure
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Invalid job configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Result sink refused a record
    #[error("Result sink error: {0}")]
    Sink(String),
}

impl MonitorError {
    /// Infrastructure problems (as opposed to job/pattern defects)
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::ConnectionUnavailable(_) | Self::Stream(_))
    }
}
