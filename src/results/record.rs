use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::stats::PerformanceStats;
use crate::error::{CoordinatorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Unknown,
    Passed,
    Failed,
    Error,
    Skipped,
}

impl TestStatus {
    pub fn is_terminal(self) -> bool {
        self != TestStatus::Unknown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Unknown => "UNKNOWN",
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Error => "ERROR",
            TestStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNKNOWN" => Some(TestStatus::Unknown),
            "PASSED" => Some(TestStatus::Passed),
            "FAILED" => Some(TestStatus::Failed),
            "ERROR" => Some(TestStatus::Error),
            "SKIPPED" => Some(TestStatus::Skipped),
            _ => None,
        }
    }
}

/// Names are printed as single report lines: not blank, no control characters.
pub(crate) fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CoordinatorError::invalid(format!("{} must not be empty", kind)));
    }
    if name.chars().any(char::is_control) {
        return Err(CoordinatorError::invalid(format!(
            "{} {:?} contains control characters",
            kind, name
        )));
    }
    Ok(())
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status and timing of one test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    request_type: String,
    detail: serde_json::Value,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: TestStatus,
    message: Option<String>,
    stats: PerformanceStats,
}

impl ResultRecord {
    pub fn new(request_type: impl Into<String>, detail: serde_json::Value) -> Result<Self> {
        Self::started_at(request_type, detail, Utc::now())
    }

    pub fn started_at(
        request_type: impl Into<String>,
        detail: serde_json::Value,
        start_time: DateTime<Utc>,
    ) -> Result<Self> {
        let request_type = request_type.into();
        check_name("request type", &request_type)?;
        Ok(Self {
            request_type,
            detail,
            start_time,
            end_time: None,
            status: TestStatus::Unknown,
            message: None,
            stats: PerformanceStats::new(),
        })
    }

    /// One-shot transition to a terminal status.
    pub fn finish(
        &mut self,
        status: TestStatus,
        end_time: DateTime<Utc>,
        message: Option<String>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(CoordinatorError::invalid(
                "a case cannot be finished with status UNKNOWN",
            ));
        }
        if self.status.is_terminal() {
            return Err(CoordinatorError::illegal(format!(
                "case '{}' already finished as {}",
                self.request_type, self.status
            )));
        }
        if end_time < self.start_time {
            return Err(CoordinatorError::invalid(format!(
                "case '{}' cannot end before it started",
                self.request_type
            )));
        }
        self.status = status;
        self.end_time = Some(end_time);
        self.message = message;
        Ok(())
    }

    /// Checks a record that arrived over the wire rather than through
    /// [`ResultRecord::finish`].
    pub(crate) fn check_reported(&mut self) -> Result<()> {
        check_name("request type", &self.request_type)?;
        match (self.status.is_terminal(), self.end_time) {
            (true, None) => {
                return Err(CoordinatorError::invalid(format!(
                    "case '{}' is {} but has no end time",
                    self.request_type, self.status
                )))
            }
            (false, Some(_)) => {
                return Err(CoordinatorError::invalid(format!(
                    "pending case '{}' has an end time",
                    self.request_type
                )))
            }
            (true, Some(end)) if end < self.start_time => {
                return Err(CoordinatorError::invalid(format!(
                    "case '{}' cannot end before it started",
                    self.request_type
                )))
            }
            _ => {}
        }
        self.stats.check_reported()
    }

    pub fn set_stats(&mut self, stats: PerformanceStats) {
        self.stats = stats;
    }

    pub fn stats_mut(&mut self) -> &mut PerformanceStats {
        &mut self.stats
    }

    pub fn request_type(&self) -> &str {
        &self.request_type
    }

    pub fn detail(&self) -> &serde_json::Value {
        &self.detail
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn status(&self) -> TestStatus {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn stats(&self) -> &PerformanceStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Elapsed milliseconds. Uses the current time while the case is pending.
    pub fn duration_ms(&self) -> i64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds().max(0)
    }
}
