//! Tracing setup for applications embedding the monitors
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the application or test harness.

use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStyle {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Install a global subscriber honouring `RUST_LOG`, defaulting to `info`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_logging(style: LogStyle) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match style {
        LogStyle::Text => builder.try_init().is_ok(),
        LogStyle::Json => builder.json().try_init().is_ok(),
    }
}

/// Subscriber for tests: output is captured per test
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
