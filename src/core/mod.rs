//! Core module containing the monitoring engine
//!
//! This module provides:
//! - Console stream abstraction over any tokio reader/writer
//! - Ordered pattern tables
//! - Stream matcher with per-call timeouts and eof/timeout sentinels
//! - Test result monitoring with result remapping
//! - Kernel boot message classification
//! - Result sinks
//! - Retry wrapper for whole monitoring sequences

pub mod kernel;
pub mod matcher;
pub mod monitor;
pub mod outcome;
pub mod pattern;
pub mod record;
pub mod retry;
pub mod sink;
pub mod stream;
