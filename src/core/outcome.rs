//! Invocation status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall status of one monitoring invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Terminal success marker reached
    Passed,
    /// Timeout, unexpected close, or kernel failure
    Failed,
    /// Precondition not met or nothing observed
    Skipped,
}

impl ActionStatus {
    /// Status name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the boot stage that precedes monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootStatus {
    /// Device booted
    Success,
    /// Boot failed
    Failed,
    /// No boot stage has reported
    Unknown,
}

impl BootStatus {
    /// Monitoring may touch the stream
    pub fn allows_monitoring(&self) -> bool {
        matches!(self, Self::Success)
    }
}
