//! Stream matcher
//!
//! Waits on a [`ConsoleStream`] until one of the markers in a
//! [`PatternTable`] shows up, the per-call timeout expires, or the stream
//! closes. Matching starts at the current cursor; everything up to the end of
//! the match is consumed, anything after it stays buffered for the next call.
//! When the [`Console`] is dropped the unconsumed output goes back to the
//! stream, so the next stage reading from the same connection still sees it.

use super::pattern::{Marker, PatternTable};
use super::stream::{ConsoleStream, StreamError};
use crate::config::MonitorSettings;
use crate::error::{MonitorError, Result};
use bytes::BytesMut;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Text captured by a successful match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    /// Whole matched text
    pub text: String,
    /// Named groups that participated in the match
    pub groups: HashMap<String, String>,
}

impl Captures {
    /// Get a named group
    pub fn get(&self, name: &str) -> Option<&str> {
        self.groups.get(name).map(String::as_str)
    }

    /// Group is present in the match
    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }
}

/// Result of a single match call
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome<L> {
    /// Stream closed before any marker appeared
    Eof,
    /// No marker appeared within the timeout
    Timeout,
    /// A marker matched
    Label(L, Captures),
}

/// Matching state bound to one console stream for one invocation
pub struct Console<'s, S: ConsoleStream + ?Sized> {
    stream: &'s mut S,
    buffer: BytesMut,
    settings: MonitorSettings,
    closed: bool,
}

impl<'s, S> Console<'s, S>
where
    S: ConsoleStream + ?Sized,
{
    /// Borrow `stream` exclusively for matching
    pub fn new(stream: &'s mut S, settings: MonitorSettings) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(8192),
            settings,
            closed: false,
        }
    }

    /// Settings in effect
    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Stream can still produce output
    pub fn is_open(&self) -> bool {
        !self.closed && self.stream.is_open()
    }

    /// Bytes read but not consumed by a match yet
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Wait for the first marker in `table`, or a sentinel.
    ///
    /// Fails immediately with [`MonitorError::ConnectionUnavailable`] when the
    /// stream is not open at call time.
    pub async fn expect<L>(
        &mut self,
        table: &PatternTable<L>,
        timeout: Duration,
    ) -> Result<MatchOutcome<L>>
    where
        L: Copy + PartialEq + fmt::Debug,
    {
        if !self.is_open() {
            return Err(MonitorError::ConnectionUnavailable(self.stream.describe()));
        }

        // a timeout too large to represent is an unbounded wait
        let deadline = Instant::now().checked_add(timeout);

        loop {
            if let Some(outcome) = self.take_match(table) {
                return Ok(outcome);
            }

            let read = self.stream.read_chunk();
            let read = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, read).await,
                None => Ok(read.await),
            };
            let chunk = match read {
                Err(_) => {
                    tracing::debug!(
                        "No match within {:?} on {}",
                        timeout,
                        self.stream.describe()
                    );
                    return Ok(MatchOutcome::Timeout);
                }
                Ok(Err(StreamError::NotConnected)) | Ok(Ok(None)) => None,
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(Some(chunk))) => Some(chunk),
            };

            match chunk {
                Some(chunk) => {
                    self.buffer.extend_from_slice(&chunk);
                    self.trim_buffer();
                }
                None => {
                    self.closed = true;
                    // output that arrived with the close still counts
                    if let Some(outcome) = self.take_match(table) {
                        return Ok(outcome);
                    }
                    tracing::debug!("Stream {} closed", self.stream.describe());
                    return Ok(MatchOutcome::Eof);
                }
            }
        }
    }

    /// Advance the cursor past `marker`, using `timeout` as the only bound.
    pub async fn wait_for(&mut self, marker: &Marker, timeout: Duration) -> Result<MatchOutcome<()>> {
        let table = PatternTable::new().with((), marker.clone(), true);
        self.expect(&table, timeout).await
    }

    /// Send `text` followed by the configured line ending
    pub async fn send_line(&mut self, text: &str) -> Result<()> {
        if !self.stream.is_open() {
            return Err(MonitorError::ConnectionUnavailable(self.stream.describe()));
        }
        let ending = self.settings.line_ending.bytes();
        let mut line = Vec::with_capacity(text.len() + ending.len());
        line.extend_from_slice(text.as_bytes());
        line.extend_from_slice(ending);
        self.stream.write_all(&line).await?;
        Ok(())
    }

    fn take_match<L>(&mut self, table: &PatternTable<L>) -> Option<MatchOutcome<L>>
    where
        L: Copy + PartialEq + fmt::Debug,
    {
        let (label, captures, end) = {
            let (entry, caps) = table.find(&self.buffer)?;
            let whole = caps.get(0)?;
            let mut groups = HashMap::new();
            for name in entry.marker.regex_ref().capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    groups.insert(
                        name.to_string(),
                        String::from_utf8_lossy(m.as_bytes()).into_owned(),
                    );
                }
            }
            let captures = Captures {
                text: String::from_utf8_lossy(whole.as_bytes()).into_owned(),
                groups,
            };
            (entry.label, captures, whole.end())
        };

        let _ = self.buffer.split_to(end);
        Some(MatchOutcome::Label(label, captures))
    }

    fn trim_buffer(&mut self) {
        let max = self.settings.max_buffer;
        if max > 0 && self.buffer.len() > max {
            let drain_len = self.buffer.len() - max / 2;
            let _ = self.buffer.split_to(drain_len);
        }
    }
}

impl<S> Drop for Console<'_, S>
where
    S: ConsoleStream + ?Sized,
{
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            self.stream.unread(self.buffer.split().freeze());
        }
    }
}
