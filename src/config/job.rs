//! Job monitor definitions
//!
//! A job lists one or more monitor blocks:
//!
//! ```yaml
//! monitors:
//!   - name: kernel selftests
//!     start: "BEGIN SELFTESTS"
//!     end: "END SELFTESTS"
//!     pattern: '(?P<test_case_id>\S+) result: (?P<result>\w+)'
//!     fixupdict:
//!       OK: pass
//!       FAILED: fail
//! ```
//!
//! Every block is validated and its patterns compiled when the job is loaded,
//! so a broken definition never reaches a live console.

use super::{ConfigError, MonitorSettings};
use crate::core::pattern::Marker;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Remapping of raw result strings to canonical ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixupMap {
    map: HashMap<String, String>,
}

impl FixupMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a remapping
    #[must_use]
    pub fn with(mut self, raw: &str, canonical: &str) -> Self {
        self.map.insert(raw.to_string(), canonical.to_string());
        self
    }

    /// Canonical value for `raw`, or `raw` itself when not remapped
    pub fn apply<'a>(&'a self, raw: &'a str) -> &'a str {
        self.map.get(raw).map_or(raw, String::as_str)
    }

    /// Number of remappings
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// No remappings configured
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl From<HashMap<String, String>> for FixupMap {
    fn from(map: HashMap<String, String>) -> Self {
        Self { map }
    }
}

/// A validated monitor block
#[derive(Debug, Clone)]
pub struct MonitorSpec {
    /// Test definition name
    pub name: String,
    /// Marker opening the monitoring window
    pub start: Marker,
    /// Marker closing the monitoring window
    pub end: Marker,
    /// Result line pattern with named groups
    pub pattern: Marker,
    /// Result value remapping
    pub fixupdict: FixupMap,
}

impl MonitorSpec {
    /// Build a monitor block from pattern strings
    pub fn new(name: &str, start: &str, end: &str, pattern: &str) -> Result<Self, ConfigError> {
        let compile = |field: &'static str, source: &str| {
            Marker::regex(source).map_err(|source| ConfigError::InvalidPattern {
                monitor: name.to_string(),
                field,
                source,
            })
        };

        let pattern = compile("pattern", pattern)?;
        if !pattern.has_group("test_case_id") {
            return Err(ConfigError::MissingCaseGroup(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            start: compile("start", start)?,
            end: compile("end", end)?,
            pattern,
            fixupdict: FixupMap::new(),
        })
    }

    /// Set result remapping
    #[must_use]
    pub fn with_fixup(mut self, fixupdict: FixupMap) -> Self {
        self.fixupdict = fixupdict;
        self
    }

    /// Definition name used on emitted records
    pub fn definition(&self) -> String {
        self.name.replace(' ', "-").to_lowercase()
    }
}

/// Monitor block as written in a job file, before validation
#[derive(Debug, Default, Deserialize)]
struct RawMonitor {
    name: Option<String>,
    start: Option<String>,
    end: Option<String>,
    pattern: Option<String>,
    fixupdict: Option<HashMap<String, String>>,
}

impl RawMonitor {
    fn validate(self, index: usize) -> Result<MonitorSpec, ConfigError> {
        let name = self.name.ok_or_else(|| ConfigError::MissingField {
            monitor: format!("#{}", index),
            field: "name",
        })?;
        let missing = |field: &'static str| ConfigError::MissingField {
            monitor: name.clone(),
            field,
        };
        let start = self.start.ok_or_else(|| missing("start"))?;
        let end = self.end.ok_or_else(|| missing("end"))?;
        let pattern = self.pattern.ok_or_else(|| missing("pattern"))?;

        let fixupdict = FixupMap::from(self.fixupdict.unwrap_or_default());
        for (raw, canonical) in &fixupdict.map {
            if crate::core::record::TestResult::parse(canonical).is_none() {
                tracing::warn!(
                    "Monitor {:?}: fixup {:?} -> {:?} does not map to a valid result",
                    name,
                    raw,
                    canonical
                );
            }
        }

        Ok(MonitorSpec::new(&name, &start, &end, &pattern)?.with_fixup(fixupdict))
    }
}

#[derive(Debug, Deserialize)]
struct RawJob {
    #[serde(default)]
    monitors: Vec<RawMonitor>,
    #[serde(default)]
    settings: MonitorSettings,
}

/// Monitor blocks and settings of one job
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Monitor blocks, run in order
    pub monitors: Vec<MonitorSpec>,
    /// Shared settings
    pub settings: MonitorSettings,
}

impl JobConfig {
    /// Create a job from already validated monitors
    pub fn new(monitors: Vec<MonitorSpec>) -> Self {
        Self {
            monitors,
            settings: MonitorSettings::default(),
        }
    }

    /// Set shared settings
    #[must_use]
    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Parse a YAML job definition
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawJob = serde_yaml::from_str(content)?;
        Self::from_raw(raw)
    }

    /// Parse a TOML job definition
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawJob = toml::from_str(content)?;
        Self::from_raw(raw)
    }

    /// Load a job definition, format chosen by file extension
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    fn from_raw(raw: RawJob) -> Result<Self, ConfigError> {
        if raw.monitors.is_empty() {
            return Err(ConfigError::NoMonitors);
        }
        let monitors = raw
            .monitors
            .into_iter()
            .enumerate()
            .map(|(i, m)| m.validate(i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            monitors,
            settings: raw.settings,
        })
    }
}
