//! # Consolewatch Core Library
//!
//! Pattern-driven monitoring of a device console (serial, TCP, telnet, ...):
//! - Test monitoring: extract pass/fail/measurement records from free-form
//!   output between a start and an end marker
//! - Kernel message scan: detect exceptions, faults and panics during boot
//!   and recognise the milestones that mean the kernel came up
//!
//! ## Example
//!
//! ```rust,no_run
//! use consolewatch_core::{
//!     run_monitors, BootStatus, CollectingSink, IoStream, JobConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let job = JobConfig::from_yaml_str(
//!         r#"
//! monitors:
//!   - name: smoke
//!     start: "START"
//!     end: "END"
//!     pattern: '(?P<test_case_id>\S+) result: (?P<result>\w+)'
//! "#,
//!     )?;
//!
//!     let socket = tokio::net::TcpStream::connect("127.0.0.1:2000").await?;
//!     let mut stream = IoStream::new("ser2net", socket);
//!     let mut sink = CollectingSink::new();
//!
//!     let report = run_monitors(&job, &mut stream, BootStatus::Success, &mut sink).await?;
//!     println!("{}: {} record(s)", report.status, sink.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod core;
pub mod error;
pub mod utils;

// Re-exports for convenience
pub use crate::config::{ConfigError, FixupMap, JobConfig, LineEnding, MonitorSettings, MonitorSpec};
pub use crate::core::kernel::{
    KernelEvent, KernelLabel, KernelMessage, KernelMonitor, KernelReport, KernelScan,
};
pub use crate::core::matcher::{Captures, Console, MatchOutcome};
pub use crate::core::monitor::{
    build_record, monitor_table, run_monitor, run_monitors, JobReport, MonitorLabel, MonitorReport,
};
pub use crate::core::outcome::{ActionStatus, BootStatus};
pub use crate::core::pattern::{Marker, PatternEntry, PatternTable};
pub use crate::core::record::{normalize_case_id, TestRecord, TestResult};
pub use crate::core::retry::{run_with_retry, Attempt, RetryPolicy};
pub use crate::core::sink::{CollectingSink, JsonLinesSink, ResultEntry, ResultSink};
pub use crate::core::stream::{ConsoleStream, IoStream, StreamError};
pub use crate::error::{MonitorError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
