//! Kernel boot message classification
//!
//! Scans console output during boot for a fixed vocabulary of kernel
//! messages. Exceptions, faults and panics are collected and the scan goes on,
//! since a turbulent boot often produces several in a row. An init alert or
//! one of the "Freeing ... memory" milestones ends the scan.

use super::matcher::{Console, MatchOutcome};
use super::outcome::{ActionStatus, BootStatus};
use super::pattern::{Marker, PatternTable};
use super::sink::{ResultEntry, ResultSink};
use super::stream::ConsoleStream;
use crate::config::MonitorSettings;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Name reported by the kernel message scan
pub const KERNEL_MESSAGES: &str = "kernel-messages";

/// Kernel message kinds, in match priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelMessage {
    /// Oops / warning trace between "cut here" and "end trace"
    Exception,
    /// Unhandled fault
    Fault,
    /// Kernel panic
    Panic,
    /// Initramfs dropped to a shell because the root device is missing
    Alert,
    /// Kernel released its init sections
    FreeUnused,
    /// Architecture init memory released
    FreeInit,
}

impl KernelMessage {
    /// All kinds, highest priority first
    pub const ALL: [KernelMessage; 6] = [
        Self::Exception,
        Self::Fault,
        Self::Panic,
        Self::Alert,
        Self::FreeUnused,
        Self::FreeInit,
    ];

    /// Regular expression identifying this message
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Exception => r"(?s)-+\[ cut here \]-+\s+(.*?\s+-+\[ end trace (\w*) \]-+)",
            Self::Fault => r"(Unhandled fault.*)\r?\n",
            Self::Panic => r"Kernel panic - not syncing",
            Self::Alert => r"ALERT! .* does not exist\.\s+Dropping to a shell!",
            Self::FreeUnused => r"Freeing unused kernel memory: \d+K",
            Self::FreeInit => r"Freeing init memory: \d+K",
        }
    }

    /// Short name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exception => "exception",
            Self::Fault => "fault",
            Self::Panic => "panic",
            Self::Alert => "alert",
            Self::FreeUnused => "free_unused",
            Self::FreeInit => "free_init",
        }
    }

    /// Boot hazard rather than a milestone
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Exception | Self::Fault | Self::Panic)
    }

    /// Seeing this message ends the scan
    pub fn is_terminal(&self) -> bool {
        !self.is_failure()
    }
}

impl fmt::Display for KernelMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A kernel message seen on the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelEvent {
    /// Message kind
    pub kind: KernelMessage,
    /// Matched console text
    pub raw_text: String,
}

impl KernelEvent {
    /// Failure-classified event
    pub fn is_failure(&self) -> bool {
        self.kind.is_failure()
    }
}

/// Labels of the kernel pattern table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelLabel {
    /// One of the fixed kernel messages
    Message(KernelMessage),
    /// Caller-supplied prompt, by position
    Prompt(usize),
}

/// Which part of the boot is being watched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelScan {
    /// Kernel boot: the full vocabulary, milestones included
    #[default]
    Boot,
    /// Init: hazards and the alert only, init has no reliable milestones
    Init,
}

impl KernelScan {
    /// Messages watched in this scan
    pub fn messages(&self) -> &'static [KernelMessage] {
        match self {
            Self::Boot => &KernelMessage::ALL,
            Self::Init => &[
                KernelMessage::Exception,
                KernelMessage::Fault,
                KernelMessage::Panic,
                KernelMessage::Alert,
            ],
        }
    }
}

/// Summary of a kernel message scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelReport {
    /// Overall status
    pub status: ActionStatus,
    /// Events in the order they were seen
    pub events: Vec<KernelEvent>,
    /// Matched text of the single event on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure reason, for timeouts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KernelReport {
    fn skipped() -> Self {
        Self {
            status: ActionStatus::Skipped,
            events: Vec::new(),
            message: None,
            error: None,
        }
    }

    /// Classify collected events.
    ///
    /// Any hazard, or more than one event, is a failure. A single milestone is
    /// a success tagged with its text. Nothing at all means the scan is
    /// skipped.
    pub fn from_events(events: Vec<KernelEvent>) -> Self {
        let status = match events.as_slice() {
            [] => ActionStatus::Skipped,
            [only] if !only.is_failure() => ActionStatus::Passed,
            _ => ActionStatus::Failed,
        };
        let message = match (status, events.first()) {
            (ActionStatus::Passed, Some(event)) => Some(event.raw_text.clone()),
            _ => None,
        };
        Self {
            status,
            events,
            message,
            error: None,
        }
    }
}

/// How a scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanEnd {
    Milestone,
    Prompt,
    Closed,
    Timeout,
}

/// Kernel boot message monitor
#[derive(Debug, Clone, Default)]
pub struct KernelMonitor {
    scan: KernelScan,
    prompts: Vec<Marker>,
}

impl KernelMonitor {
    /// Monitor for the given scan
    pub fn new(scan: KernelScan) -> Self {
        Self {
            scan,
            prompts: Vec::new(),
        }
    }

    /// Also stop, without an event, when `prompt` appears.
    ///
    /// Prompts rank below every kernel message.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Marker) -> Self {
        self.prompts.push(prompt);
        self
    }

    /// Build the pattern table for one scan
    pub fn table(&self) -> PatternTable<KernelLabel> {
        let mut table = PatternTable::new();
        for message in self.scan.messages() {
            let marker = Marker::regex(message.marker())
                .unwrap_or_else(|e| unreachable!("built-in kernel marker {}: {}", message, e));
            table.push(KernelLabel::Message(*message), marker, message.is_terminal());
        }
        for (i, prompt) in self.prompts.iter().enumerate() {
            table.push(KernelLabel::Prompt(i), prompt.clone(), true);
        }
        table
    }

    /// Run the scan if the boot stage succeeded.
    ///
    /// Each event goes to `sink` as soon as it is seen.
    pub async fn run<S>(
        &self,
        stream: &mut S,
        settings: &MonitorSettings,
        boot: BootStatus,
        sink: &mut dyn ResultSink,
    ) -> Result<KernelReport>
    where
        S: ConsoleStream + ?Sized,
    {
        if !boot.allows_monitoring() {
            debug!("Skipping kernel message scan - previous boot attempt was not successful.");
            return Ok(KernelReport::skipped());
        }

        let mut console = Console::new(stream, settings.clone());
        let mut events = Vec::new();
        let end = self.parse_failures(&mut console, &mut events, sink).await?;

        let mut report = KernelReport::from_events(events);
        if end == ScanEnd::Timeout {
            report.status = ActionStatus::Failed;
            report.error = Some(format!("time out in {}", KERNEL_MESSAGES));
        }
        info!(
            "{}: {} ({} event(s))",
            KERNEL_MESSAGES,
            report.status,
            report.events.len()
        );
        Ok(report)
    }

    async fn parse_failures<S>(
        &self,
        console: &mut Console<'_, S>,
        events: &mut Vec<KernelEvent>,
        sink: &mut dyn ResultSink,
    ) -> Result<ScanEnd>
    where
        S: ConsoleStream + ?Sized,
    {
        let table = self.table();
        let timeout = console.settings().match_timeout();

        loop {
            let (label, captures) = match console.expect(&table, timeout).await? {
                MatchOutcome::Eof => return Ok(ScanEnd::Closed),
                MatchOutcome::Timeout => {
                    warn!("{}: timed out after {:?}", KERNEL_MESSAGES, timeout);
                    return Ok(ScanEnd::Timeout);
                }
                MatchOutcome::Label(label, captures) => (label, captures),
            };

            let kind = match label {
                KernelLabel::Prompt(i) => {
                    debug!("{}: prompt #{} reached", KERNEL_MESSAGES, i);
                    return Ok(ScanEnd::Prompt);
                }
                KernelLabel::Message(kind) => kind,
            };

            let event = KernelEvent {
                kind,
                raw_text: captures.text,
            };
            if event.is_failure() {
                warn!("{}: {} detected: {}", KERNEL_MESSAGES, kind, event.raw_text.trim());
            } else {
                info!("{}: {} reached", KERNEL_MESSAGES, kind);
            }
            sink.emit(ResultEntry::Kernel(event.clone()))?;
            events.push(event);

            match kind {
                KernelMessage::Exception | KernelMessage::Fault | KernelMessage::Panic => {}
                KernelMessage::Alert => {
                    // the remote shell waits for this before printing a prompt
                    let ack = console.settings().ack.clone();
                    console.send_line(&ack).await?;
                    return Ok(ScanEnd::Milestone);
                }
                KernelMessage::FreeUnused | KernelMessage::FreeInit => {
                    return Ok(ScanEnd::Milestone);
                }
            }
        }
    }
}
