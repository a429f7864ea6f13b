//! Canonical flat text report for one run.
//!
//! The header block is `Key: value` lines terminated by a blank line, and is
//! what [`ReportSummary::parse`] reads back. Page, case and log sections follow.

use chrono::{DateTime, SecondsFormat, Utc};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{self, Write as _};

use super::page::CpuSummary;
use super::run::{RunCounters, RunData, RunStatistics};
use crate::error::{CoordinatorError, Result};

pub const REPORT_TITLE: &str = "QA Results Report";

pub fn render(data: &RunData) -> String {
    let mut out = String::new();
    // fmt::Write for String never fails.
    write_report(&mut out, data).ok();
    out
}

/// Writes the report for `data` into any text sink.
pub fn write_report<W: fmt::Write>(out: &mut W, data: &RunData) -> fmt::Result {
    let stats = data.statistics();
    let counters = data.counters();

    writeln!(out, "{}", REPORT_TITLE)?;
    writeln!(out, "Script: {}", data.script_name())?;
    writeln!(out, "Client: {}", data.client_name())?;
    writeln!(
        out,
        "Start: {}",
        data.start_date().to_rfc3339_opts(SecondsFormat::Millis, true)
    )?;
    writeln!(out, "Average case time (ms): {}", stats.average_ms)?;
    writeln!(out, "Median case time (ms): {}", stats.median_ms)?;
    writeln!(out, "Fastest case time (ms): {}", stats.fastest_ms)?;
    writeln!(out, "Slowest case time (ms): {}", stats.slowest_ms)?;
    writeln!(out, "Timed cases: {}", stats.timed_cases)?;
    writeln!(out, "Cases: {}", counters.cases)?;
    writeln!(out, "Passed: {}", counters.passed)?;
    writeln!(out, "Failed: {}", counters.failed)?;
    writeln!(out, "Errors: {}", counters.errors)?;
    writeln!(out, "Skipped: {}", counters.skipped)?;
    if let Some(cpu) = data.cpu_usage().filter(|c| c.has_cpu_ticks()) {
        writeln!(
            out,
            "CPU (min/avg/max %): {}/{}/{}",
            cpu.min_cpu(),
            cpu.avg_cpu(),
            cpu.max_cpu()
        )?;
    }
    writeln!(out)?;

    if !data.pages().is_empty() {
        writeln!(out, "Pages:")?;
        for page in data.pages() {
            writeln!(
                out,
                "  {} threads={} cases={} start={} ttfb={} ttlb={} sent={} received={} cpu={}",
                page.name(),
                page.thread_pool_size(),
                page.len(),
                page.start_time(),
                page.time_to_first_byte(),
                page.time_to_last_byte(),
                page.bytes_sent(),
                page.bytes_received(),
                page.cpu().avg,
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "Cases:")?;
    for (record, page) in data.cases() {
        write!(
            out,
            "  [{}] {} {}ms",
            record.status(),
            record.request_type(),
            record.duration_ms()
        )?;
        if let Some(page) = page.and_then(|i| data.pages().get(i)) {
            write!(out, " page={}", page.name())?;
        }
        if let Some(message) = record.message() {
            write!(out, " - {}", one_line(message))?;
        }
        writeln!(out)?;
    }

    if let Some(lines) = data.log_lines() {
        writeln!(out, "\nLog:")?;
        for line in lines {
            writeln!(out, "  {}", one_line(line))?;
        }
    }
    Ok(())
}

/// Free text keeps to one report line.
fn one_line(text: &str) -> Cow<'_, str> {
    if text.contains(|c| c == '\n' || c == '\r') {
        Cow::Owned(text.replace('\r', "\\r").replace('\n', "\\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Identity, statistics and counters recovered from a rendered report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub script_name: String,
    pub client_name: String,
    pub start_date: DateTime<Utc>,
    pub statistics: RunStatistics,
    pub counters: RunCounters,
    pub cpu: Option<CpuSummary>,
}

impl ReportSummary {
    pub fn parse(report: &str) -> Result<Self> {
        let mut lines = report.lines();
        if lines.next().map(str::trim) != Some(REPORT_TITLE) {
            return Err(CoordinatorError::invalid("not a QA results report"));
        }

        let header: HashMap<&str, &str> = lines
            .take_while(|line| !line.trim().is_empty())
            .filter_map(|line| line.split_once(": "))
            .collect();

        let text = |key: &str| {
            header
                .get(key)
                .map(|v| v.to_string())
                .ok_or_else(|| CoordinatorError::invalid(format!("report is missing '{}'", key)))
        };
        let number = |key: &str| -> Result<i64> {
            text(key)?.trim().parse::<i64>().map_err(|e| {
                CoordinatorError::invalid(format!("report field '{}' is not a number: {}", key, e))
            })
        };
        let count = |key: &str| -> Result<usize> {
            usize::try_from(number(key)?)
                .map_err(|_| CoordinatorError::invalid(format!("report field '{}' is negative", key)))
        };

        let start_date = DateTime::parse_from_rfc3339(text("Start")?.trim())
            .map_err(|e| CoordinatorError::invalid(format!("bad report start time: {}", e)))?
            .with_timezone(&Utc);

        let cpu = match header.get("CPU (min/avg/max %)") {
            Some(value) => Some(parse_cpu(value)?),
            None => None,
        };

        Ok(ReportSummary {
            script_name: text("Script")?,
            client_name: text("Client")?,
            start_date,
            statistics: RunStatistics {
                average_ms: number("Average case time (ms)")?,
                median_ms: number("Median case time (ms)")?,
                fastest_ms: number("Fastest case time (ms)")?,
                slowest_ms: number("Slowest case time (ms)")?,
                timed_cases: count("Timed cases")?,
            },
            counters: RunCounters {
                cases: count("Cases")?,
                passed: count("Passed")?,
                failed: count("Failed")?,
                errors: count("Errors")?,
                skipped: count("Skipped")?,
            },
            cpu,
        })
    }
}

fn parse_cpu(value: &str) -> Result<CpuSummary> {
    let parts: Vec<i64> = value
        .trim()
        .split('/')
        .map(|p| p.trim().parse::<i64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| CoordinatorError::invalid(format!("bad CPU summary '{}': {}", value, e)))?;
    match parts.as_slice() {
        [min, avg, max] => Ok(CpuSummary {
            min: *min,
            avg: *avg,
            max: *max,
        }),
        _ => Err(CoordinatorError::invalid(format!(
            "bad CPU summary '{}'",
            value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::record::TestStatus;
    use crate::results::run::RunResults;
    use crate::results::stats::PerformanceStats;
    use chrono::Duration;
    use serde_json::Value;

    fn sample() -> RunResults {
        let r = RunResults::new("search", "driver-7", true).unwrap();
        let start = Utc::now() - Duration::seconds(5);
        let a = r.create_test_at("GET /search", Value::Null, start).unwrap();
        r.finish_test_at(
            a,
            TestStatus::Passed,
            start + Duration::milliseconds(15),
            None,
            None,
        )
        .unwrap();
        r.start_page("results", 3).unwrap();
        let b = r.create_test_at("GET /page/2", Value::Null, start).unwrap();
        r.finish_test_at(
            b,
            TestStatus::Failed,
            start + Duration::milliseconds(25),
            Some("timeout".into()),
            None,
        )
        .unwrap();
        r.end_page().unwrap();
        r.log("warming cache");
        let mut cpu = PerformanceStats::new();
        cpu.add_cpu_tick(10).unwrap();
        cpu.add_cpu_tick(30).unwrap();
        r.set_cpu_usage(cpu);
        r
    }

    #[test]
    fn test_render_contains_sections() {
        let report = render(&sample().snapshot());
        assert!(report.starts_with(REPORT_TITLE));
        assert!(report.contains("Script: search"));
        assert!(report.contains("Client: driver-7"));
        assert!(report.contains("Average case time (ms): 20"));
        assert!(report.contains("CPU (min/avg/max %): 10/20/30"));
        assert!(report.contains("Pages:\n  results threads=3 cases=1"));
        assert!(report.contains("[FAILED] GET /page/2 25ms page=results - timeout"));
        assert!(report.contains("Log:\n  warming cache"));
    }

    #[test]
    fn test_log_section_absent_without_logging() {
        let r = RunResults::new("s", "c", false).unwrap();
        let report = render(&r.snapshot());
        assert!(!report.contains("Log:"));
    }

    #[test]
    fn test_parse_recovers_header() {
        let results = sample();
        let data = results.snapshot();
        let parsed = ReportSummary::parse(&render(&data)).unwrap();
        assert_eq!(parsed.script_name, "search");
        assert_eq!(parsed.client_name, "driver-7");
        assert_eq!(parsed.counters, results.counters());
        assert_eq!(parsed.statistics, results.compute_statistics());
        assert_eq!(
            parsed.start_date.timestamp_millis(),
            data.start_date().timestamp_millis()
        );
        assert_eq!(
            parsed.cpu,
            Some(CpuSummary {
                min: 10,
                avg: 20,
                max: 30
            })
        );
    }

    #[test]
    fn test_names_that_would_split_the_header_are_rejected() {
        assert!(RunResults::new("s", "d1\n", false).is_err());
        assert!(RunResults::new("s\n\nStart: x", "d1", false).is_err());
        let r = RunResults::new("s", "d1", false).unwrap();
        assert!(r.start_page("p\n", 1).is_err());
        assert!(r.create_test("GET /\r\n", Value::Null).is_err());
    }

    #[test]
    fn test_multiline_message_stays_on_one_case_line() {
        let r = RunResults::new("s", "d1", true).unwrap();
        let h = r.create_test("GET /", Value::Null).unwrap();
        r.fail_test(h, Some("expected 200\ngot 500".into()), None)
            .unwrap();
        r.log("line one\nline two");

        let report = render(&r.snapshot());
        assert!(report.contains("[FAILED] GET / "));
        assert!(report.contains(" - expected 200\\ngot 500\n"));
        assert!(report.contains("  line one\\nline two\n"));
        assert_eq!(ReportSummary::parse(&report).unwrap().counters, r.counters());
    }

    #[test]
    fn test_parse_rejects_other_text() {
        assert!(ReportSummary::parse("hello\nworld").is_err());
        assert!(ReportSummary::parse(&format!("{}\nScript: x\n\n", REPORT_TITLE)).is_err());
    }
}
