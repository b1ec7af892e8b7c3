//! Result sinks
//!
//! Monitors hand every finished record to a [`ResultSink`] as soon as it is
//! produced and keep no reference to it afterwards.

use super::kernel::KernelEvent;
use super::record::TestRecord;
use crate::error::MonitorError;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::sync::Arc;

/// A record produced by a monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultEntry {
    /// Test case result
    Test(TestRecord),
    /// Kernel boot message
    Kernel(KernelEvent),
}

impl ResultEntry {
    /// Test record, if this is one
    pub fn as_test(&self) -> Option<&TestRecord> {
        match self {
            Self::Test(record) => Some(record),
            Self::Kernel(_) => None,
        }
    }

    /// Kernel event, if this is one
    pub fn as_kernel(&self) -> Option<&KernelEvent> {
        match self {
            Self::Kernel(event) => Some(event),
            Self::Test(_) => None,
        }
    }
}

/// Destination for finished records
pub trait ResultSink: Send {
    /// Accept one record
    fn emit(&mut self, entry: ResultEntry) -> Result<(), MonitorError>;
}

/// In-memory sink; clones share the same list
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    entries: Arc<Mutex<Vec<ResultEntry>>>,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far
    pub fn entries(&self) -> Vec<ResultEntry> {
        self.entries.lock().clone()
    }

    /// Test records received so far
    pub fn test_records(&self) -> Vec<TestRecord> {
        self.entries
            .lock()
            .iter()
            .filter_map(ResultEntry::as_test)
            .cloned()
            .collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// No records yet
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Clear all records
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl ResultSink for CollectingSink {
    fn emit(&mut self, entry: ResultEntry) -> Result<(), MonitorError> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

/// One line written by [`JsonLinesSink`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkLine {
    /// When the record was emitted
    pub timestamp: DateTime<Local>,
    /// The record
    #[serde(flatten)]
    pub entry: ResultEntry,
}

/// Writes each record as a timestamped JSON line
pub struct JsonLinesSink<W: Write> {
    writer: BufWriter<W>,
    count: u64,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Create a sink writing to `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            count: 0,
        }
    }

    /// Records written so far
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W, MonitorError> {
        self.writer
            .into_inner()
            .map_err(|e| MonitorError::Sink(e.error().to_string()))
    }
}

impl JsonLinesSink<std::fs::File> {
    /// Append to the file at `path`, creating it if needed
    pub fn create(path: &std::path::Path) -> Result<Self, MonitorError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| MonitorError::Sink(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
    fn emit(&mut self, entry: ResultEntry) -> Result<(), MonitorError> {
        let line = SinkLine {
            timestamp: Local::now(),
            entry,
        };
        let json = serde_json::to_string(&line).map_err(|e| MonitorError::Sink(e.to_string()))?;
        writeln!(self.writer, "{}", json).map_err(|e| MonitorError::Sink(e.to_string()))?;
        // records must survive a crash of the monitored run
        self.writer
            .flush()
            .map_err(|e| MonitorError::Sink(e.to_string()))?;
        self.count += 1;
        Ok(())
    }
}
