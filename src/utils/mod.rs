//! Utility functions

pub mod logging;

pub use logging::{init_logging, init_test_logging, LogStyle};
