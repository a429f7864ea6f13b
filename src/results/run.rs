use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use tracing::debug;

use super::page::PageResults;
use super::record::{check_name, ResultRecord, TestStatus};
use super::stats::{PerformanceStats, UNSET};
use crate::error::{CoordinatorError, Result};
use crate::writer::ResultsWriter;

/// Stable reference to a case created through [`RunResults::create_test`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestHandle(usize);

impl TestHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "in", rename_all = "snake_case")]
enum RecordSlot {
    Run { index: usize },
    Page { page: usize, index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunCounters {
    pub cases: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
}

impl RunCounters {
    pub fn finished(&self) -> usize {
        self.passed + self.failed + self.errors + self.skipped
    }
}

/// Duration statistics over finished, non-skipped cases, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub average_ms: i64,
    pub median_ms: i64,
    pub fastest_ms: i64,
    pub slowest_ms: i64,
    pub timed_cases: usize,
}

impl RunStatistics {
    pub const EMPTY: RunStatistics = RunStatistics {
        average_ms: UNSET,
        median_ms: UNSET,
        fastest_ms: UNSET,
        slowest_ms: UNSET,
        timed_cases: 0,
    };

    fn from_durations(mut durations: Vec<i64>) -> Self {
        if durations.is_empty() {
            return Self::EMPTY;
        }
        durations.sort_unstable();
        let n = durations.len();
        let sum: i64 = durations.iter().sum();
        let median = if n % 2 == 1 {
            durations[n / 2]
        } else {
            (durations[n / 2 - 1] + durations[n / 2]) / 2
        };
        RunStatistics {
            average_ms: (sum as f64 / n as f64).round() as i64,
            median_ms: median,
            fastest_ms: durations[0],
            slowest_ms: durations[n - 1],
            timed_cases: n,
        }
    }
}

/// Everything one driver recorded for one script run. [`RunResults`] wraps
/// this behind a lock; writers and reports work on a snapshot of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunData {
    script_name: String,
    client_name: String,
    start_date: DateTime<Utc>,
    records: Vec<ResultRecord>,
    pages: Vec<PageResults>,
    order: Vec<RecordSlot>,
    current_page: Option<usize>,
    counters: RunCounters,
    log: Option<Vec<String>>,
    cpu: Option<PerformanceStats>,
    #[serde(skip)]
    statistics: Option<RunStatistics>,
}

impl RunData {
    fn new(script_name: String, client_name: String, logging: bool) -> Self {
        Self {
            script_name,
            client_name,
            start_date: Utc::now(),
            records: Vec::new(),
            pages: Vec::new(),
            order: Vec::new(),
            current_page: None,
            counters: RunCounters::default(),
            log: logging.then(Vec::new),
            cpu: None,
            statistics: None,
        }
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn pages(&self) -> &[PageResults] {
        &self.pages
    }

    pub fn current_page(&self) -> Option<&PageResults> {
        self.current_page.and_then(|i| self.pages.get(i))
    }

    pub fn log_lines(&self) -> Option<&[String]> {
        self.log.as_deref()
    }

    pub fn cpu_usage(&self) -> Option<&PerformanceStats> {
        self.cpu.as_ref()
    }

    /// Every case in creation order, with the index of the page it ran in.
    pub fn cases(&self) -> impl Iterator<Item = (&ResultRecord, Option<usize>)> + '_ {
        self.order.iter().filter_map(move |slot| match *slot {
            RecordSlot::Run { index } => self.records.get(index).map(|r| (r, None)),
            RecordSlot::Page { page, index } => self
                .pages
                .get(page)
                .and_then(|p| p.records().get(index))
                .map(|r| (r, Some(page))),
        })
    }

    pub fn case(&self, handle: TestHandle) -> Option<&ResultRecord> {
        self.cases().nth(handle.0).map(|(r, _)| r)
    }

    /// Cached statistics, or a fresh computation when mutations made them stale.
    pub fn statistics(&self) -> RunStatistics {
        self.statistics.unwrap_or_else(|| self.compute_statistics())
    }

    fn compute_statistics(&self) -> RunStatistics {
        let durations = self
            .cases()
            .map(|(r, _)| r)
            .filter(|r| r.is_finished() && r.status() != TestStatus::Skipped)
            .map(ResultRecord::duration_ms)
            .collect();
        RunStatistics::from_durations(durations)
    }

    fn refresh_statistics(&mut self) -> RunStatistics {
        if let Some(stats) = self.statistics {
            return stats;
        }
        let stats = self.compute_statistics();
        self.statistics = Some(stats);
        stats
    }

    fn mark_dirty(&mut self) {
        self.statistics = None;
    }

    /// Checks a run that arrived over the wire: every case reachable exactly
    /// once, counters matching the case statuses, stats within bounds.
    fn check_reported(&mut self) -> Result<()> {
        check_name("script name", &self.script_name)?;
        check_name("client name", &self.client_name)?;

        if let Some(page) = self.current_page {
            if page >= self.pages.len() {
                return Err(CoordinatorError::invalid(format!(
                    "current page {} does not exist ({} pages)",
                    page,
                    self.pages.len()
                )));
            }
        }
        let current = self.current_page;
        for (i, page) in self.pages.iter_mut().enumerate() {
            page.check_reported(current == Some(i))?;
        }
        for record in &mut self.records {
            record.check_reported()?;
        }

        let total = self.records.len() + self.pages.iter().map(PageResults::len).sum::<usize>();
        let mut seen = HashSet::with_capacity(self.order.len());
        for slot in &self.order {
            let known = match *slot {
                RecordSlot::Run { index } => index < self.records.len(),
                RecordSlot::Page { page, index } => {
                    self.pages.get(page).is_some_and(|p| index < p.len())
                }
            };
            let key = match *slot {
                RecordSlot::Run { index } => (None, index),
                RecordSlot::Page { page, index } => (Some(page), index),
            };
            if !known || !seen.insert(key) {
                return Err(CoordinatorError::invalid(format!(
                    "case order entry {:?} points at no case or repeats one",
                    slot
                )));
            }
        }
        if seen.len() != total {
            return Err(CoordinatorError::invalid(format!(
                "case order lists {} of {} cases",
                seen.len(),
                total
            )));
        }

        let mut counted = RunCounters {
            cases: total,
            ..RunCounters::default()
        };
        for (record, _) in self.cases() {
            match record.status() {
                TestStatus::Passed => counted.passed += 1,
                TestStatus::Failed => counted.failed += 1,
                TestStatus::Error => counted.errors += 1,
                TestStatus::Skipped => counted.skipped += 1,
                TestStatus::Unknown => {}
            }
        }
        if counted != self.counters {
            return Err(CoordinatorError::invalid(format!(
                "counters {:?} do not match the reported cases {:?}",
                self.counters, counted
            )));
        }

        if let Some(cpu) = self.cpu.as_mut() {
            cpu.check_reported()?;
        }
        self.mark_dirty();
        Ok(())
    }

    fn record_mut(&mut self, handle: TestHandle) -> Result<&mut ResultRecord> {
        let slot = *self.order.get(handle.0).ok_or_else(|| {
            CoordinatorError::invalid(format!("unknown test handle {}", handle.0))
        })?;
        let record = match slot {
            RecordSlot::Run { index } => self.records.get_mut(index),
            RecordSlot::Page { page, index } => self
                .pages
                .get_mut(page)
                .and_then(|p| p.record_mut(index)),
        };
        record.ok_or_else(|| {
            CoordinatorError::illegal(format!("test handle {} points at no case", handle.0))
        })
    }
}

/// Results of one script run by one driver.
///
/// All operations take `&self` and serialise on one coarse lock so a
/// driver's worker threads can share an `Arc<RunResults>`.
#[derive(Debug)]
pub struct RunResults {
    inner: Mutex<RunData>,
}

impl RunResults {
    pub fn new(
        script_name: impl Into<String>,
        client_name: impl Into<String>,
        logging: bool,
    ) -> Result<Self> {
        let script_name = script_name.into();
        let client_name = client_name.into();
        check_name("script name", &script_name)?;
        check_name("client name", &client_name)?;
        Ok(Self::from_data(RunData::new(script_name, client_name, logging)))
    }

    /// Accepts a run reported by a driver once it passes the same checks the
    /// mutating operations enforce.
    pub fn from_report(mut data: RunData) -> Result<Self> {
        data.check_reported()?;
        Ok(Self::from_data(data))
    }

    fn from_data(data: RunData) -> Self {
        Self {
            inner: Mutex::new(data),
        }
    }

    pub fn script_name(&self) -> String {
        self.inner.lock().script_name.clone()
    }

    pub fn client_name(&self) -> String {
        self.inner.lock().client_name.clone()
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.inner.lock().start_date
    }

    pub fn create_test(
        &self,
        request_type: impl Into<String>,
        detail: serde_json::Value,
    ) -> Result<TestHandle> {
        self.create_test_at(request_type, detail, Utc::now())
    }

    /// Creates a pending case and appends it to the open page, if any.
    pub fn create_test_at(
        &self,
        request_type: impl Into<String>,
        detail: serde_json::Value,
        start_time: DateTime<Utc>,
    ) -> Result<TestHandle> {
        let record = ResultRecord::started_at(request_type, detail, start_time)?;
        let mut data = self.inner.lock();

        let slot = match data.current_page {
            Some(page) => {
                let index = data.pages[page].add_test_result(record)?;
                RecordSlot::Page { page, index }
            }
            None => {
                data.records.push(record);
                RecordSlot::Run {
                    index: data.records.len() - 1,
                }
            }
        };
        data.order.push(slot);
        data.counters.cases += 1;
        data.mark_dirty();
        Ok(TestHandle(data.order.len() - 1))
    }

    pub fn pass_test(
        &self,
        handle: TestHandle,
        message: Option<String>,
        stats: Option<PerformanceStats>,
    ) -> Result<()> {
        self.finish_test(handle, TestStatus::Passed, message, stats)
    }

    pub fn fail_test(
        &self,
        handle: TestHandle,
        message: Option<String>,
        stats: Option<PerformanceStats>,
    ) -> Result<()> {
        self.finish_test(handle, TestStatus::Failed, message, stats)
    }

    pub fn error_test(
        &self,
        handle: TestHandle,
        message: Option<String>,
        stats: Option<PerformanceStats>,
    ) -> Result<()> {
        self.finish_test(handle, TestStatus::Error, message, stats)
    }

    pub fn skip_test(
        &self,
        handle: TestHandle,
        message: Option<String>,
        stats: Option<PerformanceStats>,
    ) -> Result<()> {
        self.finish_test(handle, TestStatus::Skipped, message, stats)
    }

    pub fn finish_test(
        &self,
        handle: TestHandle,
        status: TestStatus,
        message: Option<String>,
        stats: Option<PerformanceStats>,
    ) -> Result<()> {
        self.finish_test_at(handle, status, Utc::now(), message, stats)
    }

    pub fn finish_test_at(
        &self,
        handle: TestHandle,
        status: TestStatus,
        end_time: DateTime<Utc>,
        message: Option<String>,
        stats: Option<PerformanceStats>,
    ) -> Result<()> {
        let mut data = self.inner.lock();
        let record = data.record_mut(handle)?;
        record.finish(status, end_time, message)?;
        if let Some(stats) = stats {
            record.set_stats(stats);
        }

        let counters = &mut data.counters;
        match status {
            TestStatus::Passed => counters.passed += 1,
            TestStatus::Failed => counters.failed += 1,
            TestStatus::Error => counters.errors += 1,
            TestStatus::Skipped => counters.skipped += 1,
            TestStatus::Unknown => {}
        }
        data.mark_dirty();
        Ok(())
    }

    /// Opens a page block. Pages do not nest: the open page must be ended
    /// before another can start.
    pub fn start_page(&self, name: impl Into<String>, thread_pool_size: usize) -> Result<()> {
        let page = PageResults::new(name, thread_pool_size)?;
        let mut data = self.inner.lock();
        if let Some(open) = data.current_page() {
            return Err(CoordinatorError::illegal(format!(
                "page '{}' is still open; cannot start '{}'",
                open.name(),
                page.name()
            )));
        }
        debug!(script = %data.script_name, page = page.name(), "Page started");
        data.pages.push(page);
        data.current_page = Some(data.pages.len() - 1);
        Ok(())
    }

    pub fn end_page(&self) -> Result<()> {
        let mut data = self.inner.lock();
        let index = data
            .current_page
            .take()
            .ok_or_else(|| CoordinatorError::illegal("no page is open"))?;
        data.pages[index].close()?;
        data.mark_dirty();
        Ok(())
    }

    pub fn current_page_name(&self) -> Option<String> {
        self.inner.lock().current_page().map(|p| p.name().to_string())
    }

    pub fn counters(&self) -> RunCounters {
        self.inner.lock().counters
    }

    pub fn case(&self, handle: TestHandle) -> Option<ResultRecord> {
        self.inner.lock().case(handle).cloned()
    }

    /// Recomputes average, median, fastest and slowest when a mutation has
    /// happened since the last call.
    pub fn compute_statistics(&self) -> RunStatistics {
        self.inner.lock().refresh_statistics()
    }

    /// Appends a free-form line when logging was enabled at construction.
    pub fn log(&self, line: impl Into<String>) -> bool {
        match self.inner.lock().log.as_mut() {
            Some(log) => {
                log.push(line.into());
                true
            }
            None => false,
        }
    }

    pub fn logging_enabled(&self) -> bool {
        self.inner.lock().log.is_some()
    }

    pub fn set_cpu_usage(&self, cpu: PerformanceStats) {
        self.inner.lock().cpu = Some(cpu);
    }

    /// Consistent copy for writers and reports, with statistics filled in.
    pub fn snapshot(&self) -> RunData {
        let mut data = self.inner.lock();
        data.refresh_statistics();
        data.clone()
    }

    pub fn write(&self, writer: &dyn ResultsWriter) -> Result<()> {
        writer.write(self)
    }
}

impl Serialize for RunResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.inner.lock().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RunResults {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let data = RunData::deserialize(deserializer)?;
        RunResults::from_report(data).map_err(serde::de::Error::custom)
    }
}
