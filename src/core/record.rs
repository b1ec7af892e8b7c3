//! Result records emitted by the monitors

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Test case result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    /// Test passed
    Pass,
    /// Test failed
    Fail,
    /// Test was skipped
    Skip,
    /// Outcome could not be determined
    Unknown,
}

impl TestResult {
    /// Parse a canonical result value. Only the exact lowercase names are valid.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            "skip" => Some(Self::Skip),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One test case result extracted from console output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Test definition (monitor name, lowercase, spaces as hyphens)
    pub definition: String,
    /// Normalized test case id
    pub case: String,
    /// Result
    pub result: TestResult,
    /// Optional measurement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement: Option<f64>,
    /// Units of the measurement, verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    /// Additional metadata (raw test case id)
    pub extra: BTreeMap<String, String>,
}

/// Turn a raw test case id into a stable identifier.
///
/// Trims, lowercases and collapses every run of non-word characters into a
/// single underscore. Applying it twice gives the same result as once.
pub fn normalize_case_id(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut in_run = false;

    for c in lowered.chars() {
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_case_id("  Foo Case  "), "foo_case");
        assert_eq!(normalize_case_id("net/ping - IPv4"), "net_ping_ipv4");
        assert_eq!(normalize_case_id("a__b"), "a__b");
        assert_eq!(normalize_case_id("a-_-b"), "a___b");
        assert_eq!(normalize_case_id("(x)"), "_x_");
        assert_eq!(normalize_case_id(""), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "foo_case",
            "  Mixed CASE id!! ",
            "tc-01: boot/time",
            "---",
            "a_ _b",
            "_lead and trail_ ",
            "ünïcode Test",
            "tab\tand\nnewline",
            "x__--__y",
        ];
        for s in samples {
            let once = normalize_case_id(s);
            assert_eq!(normalize_case_id(&once), once, "input {:?}", s);
        }
    }

    #[test]
    fn test_result_parse() {
        assert_eq!(TestResult::parse("pass"), Some(TestResult::Pass));
        assert_eq!(TestResult::parse("unknown"), Some(TestResult::Unknown));
        assert_eq!(TestResult::parse("PASS"), None);
        assert_eq!(TestResult::parse("bogus"), None);
    }

    #[test]
    fn test_record_json_omits_empty_measurement() {
        let record = TestRecord {
            definition: "smoke".to_string(),
            case: "foo_case".to_string(),
            result: TestResult::Pass,
            measurement: None,
            units: None,
            extra: BTreeMap::from([("test_case_id".to_string(), "foo_case".to_string())]),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["result"], "pass");
        assert!(json.get("measurement").is_none());
        assert_eq!(json["extra"]["test_case_id"], "foo_case");
    }
}
