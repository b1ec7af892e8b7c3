//! Monitoring settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every monitor block of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Timeout for each individual match while monitoring (seconds)
    pub match_timeout_secs: u64,
    /// Timeout while waiting for a monitor's start marker (seconds)
    pub start_timeout_secs: u64,
    /// Text sent back to the device to acknowledge a kernel init alert
    pub ack: String,
    /// Line ending appended to anything sent
    pub line_ending: LineEnding,
    /// Maximum number of unmatched bytes kept in the receive buffer
    pub max_buffer: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            match_timeout_secs: 120,
            start_timeout_secs: 120,
            ack: "#".to_string(),
            line_ending: LineEnding::Lf,
            max_buffer: 65536,
        }
    }
}

impl MonitorSettings {
    /// Per-match timeout
    pub fn match_timeout(&self) -> Duration {
        Duration::from_secs(self.match_timeout_secs)
    }

    /// Start marker timeout
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// Set per-match timeout
    #[must_use]
    pub fn with_match_timeout(mut self, secs: u64) -> Self {
        self.match_timeout_secs = secs;
        self
    }

    /// Set start marker timeout
    #[must_use]
    pub fn with_start_timeout(mut self, secs: u64) -> Self {
        self.start_timeout_secs = secs;
        self
    }

    /// Set acknowledgement text
    #[must_use]
    pub fn with_ack(mut self, ack: &str) -> Self {
        self.ack = ack.to_string();
        self
    }

    /// Set line ending
    #[must_use]
    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Set receive buffer limit (0 = unlimited)
    #[must_use]
    pub fn with_max_buffer(mut self, bytes: usize) -> Self {
        self.max_buffer = bytes;
        self
    }
}

/// Line ending type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// Carriage Return only
    Cr,
    /// Line Feed only
    #[default]
    Lf,
    /// Both CR and LF
    CrLf,
}

impl LineEnding {
    /// Get the byte sequence for this line ending
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Self::Cr => b"\r",
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = MonitorSettings::default();
        assert_eq!(settings.match_timeout(), Duration::from_secs(120));
        assert_eq!(settings.ack, "#");
        assert_eq!(settings.line_ending.bytes(), b"\n");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: MonitorSettings =
            toml::from_str("match_timeout_secs = 30\nline_ending = \"crlf\"\n").unwrap();
        assert_eq!(settings.match_timeout_secs, 30);
        assert_eq!(settings.line_ending, LineEnding::CrLf);
        assert_eq!(settings.max_buffer, 65536);
    }
}
