//! Test result monitoring
//!
//! Watches console output between a monitor's start and end markers and turns
//! every line matching the result pattern into a [`TestRecord`].
//!
//! For each monitor block the cursor is first advanced to the start marker.
//! After that every match is checked against `end` before the result pattern,
//! so an end marker is never mistaken for a result line.

use super::matcher::{Captures, Console, MatchOutcome};
use super::outcome::{ActionStatus, BootStatus};
use super::pattern::PatternTable;
use super::record::{normalize_case_id, TestRecord, TestResult};
use super::sink::{ResultEntry, ResultSink};
use super::stream::ConsoleStream;
use crate::config::{JobConfig, MonitorSpec};
use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Name reported by test monitoring
pub const TEST_MONITOR: &str = "test-monitor";

/// Labels of the monitor pattern table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorLabel {
    /// End of the monitoring window
    End,
    /// A result line
    TestResult,
}

/// Build the pattern table for one monitor block: `end` first, then the
/// result pattern.
pub fn monitor_table(spec: &MonitorSpec) -> PatternTable<MonitorLabel> {
    PatternTable::new()
        .with(MonitorLabel::End, spec.end.clone(), true)
        .with(MonitorLabel::TestResult, spec.pattern.clone(), false)
}

/// Summary of one monitor block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Monitor name
    pub name: String,
    /// Status of the block
    pub status: ActionStatus,
    /// Records emitted, in order
    pub records: Vec<TestRecord>,
    /// Failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of all monitor blocks of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    /// Invocation id
    pub id: Uuid,
    /// Overall status
    pub status: ActionStatus,
    /// Per-block reports, in run order
    pub monitors: Vec<MonitorReport>,
}

impl JobReport {
    /// All records of all blocks, in order
    pub fn records(&self) -> impl Iterator<Item = &TestRecord> {
        self.monitors.iter().flat_map(|m| m.records.iter())
    }

    fn overall(monitors: &[MonitorReport]) -> ActionStatus {
        if monitors.iter().any(|m| m.status == ActionStatus::Failed) {
            ActionStatus::Failed
        } else if monitors.iter().any(|m| m.status == ActionStatus::Passed) {
            ActionStatus::Passed
        } else {
            ActionStatus::Skipped
        }
    }
}

/// What the loop does after classifying one match
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Continue,
    Finished {
        status: ActionStatus,
        error: Option<String>,
    },
}

/// Build a record from a result line.
///
/// A pattern declaring a `result` group always takes the result path, even
/// for lines where that group did not match. Returns `Ok(None)` when the line
/// does not produce a record: the result value is missing or not valid after
/// remapping, or the groups needed are missing.
pub fn build_record(spec: &MonitorSpec, captures: &Captures) -> Result<Option<TestRecord>> {
    if spec.pattern.has_group("result") {
        let Some(raw) = captures.get("result") else {
            error!("error: bad test results: None");
            return Ok(None);
        };
        let value = spec.fixupdict.apply(raw);
        let Some(result) = TestResult::parse(value) else {
            error!("error: bad test results: {}", value);
            return Ok(None);
        };
        let Some(raw_id) = captures.get("test_case_id") else {
            debug!("Result {} without a test case id", result);
            return Ok(None);
        };

        let case = normalize_case_id(raw_id);
        let measurement = match captures.get("measurement") {
            Some(m) if !m.trim().is_empty() => Some(parse_measurement(&case, m)?),
            _ => None,
        };
        return Ok(Some(new_record(spec, case, raw_id, result, measurement, captures)));
    }

    match (captures.get("test_case_id"), captures.get("measurement")) {
        (Some(raw_id), Some(m)) if !raw_id.is_empty() && !m.is_empty() => {
            let case = normalize_case_id(raw_id);
            let measurement = parse_measurement(&case, m)?;
            Ok(Some(new_record(
                spec,
                case,
                raw_id,
                TestResult::Pass,
                Some(measurement),
                captures,
            )))
        }
        _ => Ok(None),
    }
}

fn parse_measurement(case: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|source| MonitorError::InvalidMeasurement {
            case: case.to_string(),
            value: value.to_string(),
            source,
        })
}

fn new_record(
    spec: &MonitorSpec,
    case: String,
    raw_id: &str,
    result: TestResult,
    measurement: Option<f64>,
    captures: &Captures,
) -> TestRecord {
    debug!("test_case_id: {}", case);
    TestRecord {
        definition: spec.definition(),
        case,
        result,
        measurement,
        units: captures.get("units").map(str::to_string),
        extra: BTreeMap::from([("test_case_id".to_string(), raw_id.trim().to_string())]),
    }
}

fn classify(
    spec: &MonitorSpec,
    outcome: MatchOutcome<MonitorLabel>,
    timeout: Duration,
    records: &mut Vec<TestRecord>,
    sink: &mut dyn ResultSink,
) -> Result<Step> {
    match outcome {
        MatchOutcome::Eof => {
            warn!("err: stream closed before the end string was found");
            Ok(Step::Finished {
                status: ActionStatus::Failed,
                error: Some("connection closed before test monitoring ended".to_string()),
            })
        }
        MatchOutcome::Timeout => {
            warn!("err: test monitoring has timed out ({:?})", timeout);
            Ok(Step::Finished {
                status: ActionStatus::Failed,
                error: Some("test monitoring has timed out".to_string()),
            })
        }
        MatchOutcome::Label(MonitorLabel::End, _) => {
            info!("ok: end string found, test monitoring stopped");
            Ok(Step::Finished {
                status: ActionStatus::Passed,
                error: None,
            })
        }
        MatchOutcome::Label(MonitorLabel::TestResult, captures) => {
            info!("ok: test case found");
            if let Some(record) = build_record(spec, &captures)? {
                sink.emit(ResultEntry::Test(record.clone()))?;
                records.push(record);
            }
            Ok(Step::Continue)
        }
    }
}

/// Run one monitor block on an already borrowed console
pub async fn run_monitor<S>(
    console: &mut Console<'_, S>,
    spec: &MonitorSpec,
    sink: &mut dyn ResultSink,
) -> Result<MonitorReport>
where
    S: ConsoleStream + ?Sized,
{
    let mut report = MonitorReport {
        name: spec.name.clone(),
        status: ActionStatus::Failed,
        records: Vec::new(),
        error: None,
    };

    // find the start string before parsing any output
    let start_timeout = console.settings().start_timeout();
    match console.wait_for(&spec.start, start_timeout).await? {
        MatchOutcome::Label(..) => {
            info!("ok: start string found, test monitoring started");
        }
        MatchOutcome::Timeout => {
            warn!("err: start string {:?} not found", spec.start.as_str());
            report.error = Some(format!("start string {:?} not found", spec.start.as_str()));
            return Ok(report);
        }
        MatchOutcome::Eof => {
            warn!("err: stream closed while waiting for the start string");
            report.error = Some("connection closed before the start string".to_string());
            return Ok(report);
        }
    }

    let table = monitor_table(spec);
    let timeout = console.settings().match_timeout();
    loop {
        debug!("test monitoring timeout: {} seconds", timeout.as_secs());
        let outcome = console.expect(&table, timeout).await?;
        match classify(spec, outcome, timeout, &mut report.records, sink)? {
            Step::Continue => {}
            Step::Finished { status, error } => {
                report.status = status;
                report.error = error;
                return Ok(report);
            }
        }
    }
}

/// Run every monitor block of `job` against `stream`.
///
/// Nothing is read from the stream unless `boot` reports success. Records
/// are handed to `sink` as they are found; records already emitted stay
/// emitted when a later error aborts the run.
pub async fn run_monitors<S>(
    job: &JobConfig,
    stream: &mut S,
    boot: BootStatus,
    sink: &mut dyn ResultSink,
) -> Result<JobReport>
where
    S: ConsoleStream + ?Sized,
{
    let id = Uuid::new_v4();

    if !boot.allows_monitoring() {
        debug!("Skipping test monitoring - previous boot attempt was not successful.");
        return Ok(JobReport {
            id,
            status: ActionStatus::Skipped,
            monitors: Vec::new(),
        });
    }

    if !stream.is_open() {
        return Err(MonitorError::ConnectionUnavailable(stream.describe()));
    }

    let mut console = Console::new(stream, job.settings.clone());
    let mut monitors = Vec::with_capacity(job.monitors.len());

    for spec in &job.monitors {
        let span = tracing::info_span!("monitor", name = %spec.name, run = %id);
        let report = run_monitor(&mut console, spec, &mut *sink)
            .instrument(span)
            .await?;
        monitors.push(report);
        if !console.is_open() {
            // remaining blocks cannot see any output
            break;
        }
    }

    let status = JobReport::overall(&monitors);
    info!("{}: {}", TEST_MONITOR, status);
    Ok(JobReport {
        id,
        status,
        monitors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixupMap;
    use crate::core::sink::CollectingSink;
    use crate::core::stream::IoStream;
    use std::collections::HashMap;

    fn spec() -> MonitorSpec {
        MonitorSpec::new(
            "Smoke Tests",
            "START",
            "END",
            r"(?P<test_case_id>\w+) result: (?P<result>\w+)",
        )
        .unwrap()
    }

    fn bench_spec() -> MonitorSpec {
        MonitorSpec::new(
            "Bench",
            "START",
            "END",
            r"(?P<test_case_id>[\w ]+): (?P<measurement>\S*)(?: (?P<units>\w+))?",
        )
        .unwrap()
    }

    fn captures(groups: &[(&str, &str)]) -> Captures {
        Captures {
            text: String::new(),
            groups: groups
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_table_checks_end_first() {
        let table = monitor_table(&spec());
        assert_eq!(table.entries()[0].label, MonitorLabel::End);
        assert!(table.is_terminal(MonitorLabel::End));
        assert!(!table.is_terminal(MonitorLabel::TestResult));
    }

    #[test]
    fn test_end_wins_at_same_position() {
        // a result pattern loose enough to also match the end line
        let spec = MonitorSpec::new("t", "START", "END", r"(?P<test_case_id>\w+)(?P<result>)").unwrap();
        let table = monitor_table(&spec);
        let (entry, _) = table.find(b"END\n").unwrap();
        assert_eq!(entry.label, MonitorLabel::End);
    }

    #[test]
    fn test_build_record_with_result() {
        let record = build_record(&spec(), &captures(&[("test_case_id", " Foo Case "), ("result", "pass")]))
            .unwrap()
            .unwrap();
        assert_eq!(record.definition, "smoke-tests");
        assert_eq!(record.case, "foo_case");
        assert_eq!(record.result, TestResult::Pass);
        assert_eq!(record.extra["test_case_id"], "Foo Case");
        assert!(record.measurement.is_none());
    }

    #[test]
    fn test_fixup_is_applied_before_validation() {
        let spec = spec().with_fixup(FixupMap::new().with("OK", "pass").with("NOK", "fail"));
        for _ in 0..3 {
            let record = build_record(&spec, &captures(&[("test_case_id", "a"), ("result", "OK")]))
                .unwrap()
                .unwrap();
            assert_eq!(record.result, TestResult::Pass);
        }
        let record = build_record(&spec, &captures(&[("test_case_id", "a"), ("result", "NOK")]))
            .unwrap()
            .unwrap();
        assert_eq!(record.result, TestResult::Fail);
    }

    #[test]
    fn test_bad_result_is_discarded() {
        let outcome = build_record(&spec(), &captures(&[("test_case_id", "a"), ("result", "bogus")]));
        assert!(outcome.unwrap().is_none());
    }

    #[test]
    fn test_measurement_only_record() {
        let record = build_record(
            &bench_spec(),
            &captures(&[("test_case_id", "boot time"), ("measurement", "3.25"), ("units", "s")]),
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.case, "boot_time");
        assert_eq!(record.result, TestResult::Pass);
        assert_eq!(record.measurement, Some(3.25));
        assert_eq!(record.units.as_deref(), Some("s"));
    }

    #[test]
    fn test_empty_measurement_produces_nothing() {
        let outcome = build_record(&bench_spec(), &captures(&[("test_case_id", "a"), ("measurement", "")]));
        assert!(outcome.unwrap().is_none());
    }

    #[test]
    fn test_bad_measurement_is_an_error() {
        let err = build_record(&bench_spec(), &captures(&[("test_case_id", "a"), ("measurement", "fast")]))
            .unwrap_err();
        assert!(matches!(err, MonitorError::InvalidMeasurement { ref value, .. } if value == "fast"));
    }

    #[test]
    fn test_declared_result_group_without_value_is_discarded() {
        let spec = MonitorSpec::new(
            "t",
            "START",
            "END",
            r"(?P<test_case_id>\w+)(?: result: (?P<result>\w+))?(?: took (?P<measurement>\S+))?",
        )
        .unwrap();
        // the line matched but left the declared result group empty
        let outcome = build_record(&spec, &captures(&[("test_case_id", "a"), ("measurement", "3.5")]));
        assert!(outcome.unwrap().is_none());
    }

    #[test]
    fn test_result_with_measurement() {
        let record = build_record(
            &spec(),
            &captures(&[("test_case_id", "lat"), ("result", "fail"), ("measurement", "12"), ("units", "us")]),
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.result, TestResult::Fail);
        assert_eq!(record.measurement, Some(12.0));
        assert_eq!(record.units.as_deref(), Some("us"));
    }

    #[tokio::test]
    async fn test_skipped_when_boot_failed() {
        let mut stream = crate::core::stream::MockConsoleStream::new();
        stream.expect_is_open().never();
        stream.expect_read_chunk().never();
        let mut sink = CollectingSink::new();

        let report = run_monitors(&JobConfig::new(vec![spec()]), &mut stream, BootStatus::Unknown, &mut sink)
            .await
            .unwrap();
        assert_eq!(report.status, ActionStatus::Skipped);
        assert!(report.monitors.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_connection_is_fatal() {
        let mut stream = crate::core::stream::MockConsoleStream::new();
        stream.expect_is_open().return_const(false);
        stream.expect_describe().return_const("ttyS0".to_string());
        let mut sink = CollectingSink::new();

        let err = run_monitors(&JobConfig::new(vec![spec()]), &mut stream, BootStatus::Success, &mut sink)
            .await
            .unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[tokio::test]
    async fn test_output_before_start_is_ignored() {
        let mock = tokio_test::io::Builder::new()
            .read(b"early result: fail\nSTART\n")
            .read(b"late result: pass\nEND\n")
            .build();
        let mut stream = IoStream::new("mock", mock);
        let sink = CollectingSink::new();

        let report = run_monitors(
            &JobConfig::new(vec![spec()]),
            &mut stream,
            BootStatus::Success,
            &mut sink.clone(),
        )
        .await
        .unwrap();
        assert_eq!(report.status, ActionStatus::Passed);
        let cases: Vec<_> = sink.test_records().into_iter().map(|r| r.case).collect();
        assert_eq!(cases, vec!["late".to_string()]);
    }
}
