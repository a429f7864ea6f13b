use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;

use super::record::{check_name, ResultRecord, TestStatus};
use super::stats::{known, UNSET};
use crate::error::{CoordinatorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSummary {
    pub min: i64,
    pub avg: i64,
    pub max: i64,
}

impl CpuSummary {
    pub const UNSET: CpuSummary = CpuSummary {
        min: UNSET,
        avg: UNSET,
        max: UNSET,
    };

    pub fn is_set(&self) -> bool {
        self.avg != UNSET
    }
}

#[derive(Debug, Clone, Default)]
struct PageCache {
    start_time: OnceCell<i64>,
    first_byte: OnceCell<i64>,
    last_byte: OnceCell<i64>,
    bytes_sent: OnceCell<i64>,
    bytes_received: OnceCell<i64>,
    cpu: OnceCell<CpuSummary>,
}

/// Cases grouped under one named execution block.
///
/// Records can only be added while the page is executing; aggregates are
/// computed on demand, each cached on its own until the next mutation.
/// Records whose relevant field is unset are skipped by the aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResults {
    name: String,
    thread_pool_size: usize,
    records: Vec<ResultRecord>,
    executing: bool,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    cache: PageCache,
}

impl PageResults {
    pub fn new(name: impl Into<String>, thread_pool_size: usize) -> Result<Self> {
        let name = name.into();
        check_name("page name", &name)?;
        if thread_pool_size == 0 {
            return Err(CoordinatorError::invalid(format!(
                "page '{}' needs a thread pool size of at least 1",
                name
            )));
        }
        Ok(Self {
            name,
            thread_pool_size,
            records: Vec::new(),
            executing: true,
            opened_at: Utc::now(),
            closed_at: None,
            cache: PageCache::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_pool_size(&self) -> usize {
        self.thread_pool_size
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a record and returns its index within the page.
    pub fn add_test_result(&mut self, record: ResultRecord) -> Result<usize> {
        if !self.executing {
            return Err(CoordinatorError::illegal(format!(
                "page '{}' is closed",
                self.name
            )));
        }
        self.records.push(record);
        self.invalidate();
        Ok(self.records.len() - 1)
    }

    pub fn close(&mut self) -> Result<()> {
        if !self.executing {
            return Err(CoordinatorError::illegal(format!(
                "page '{}' is already closed",
                self.name
            )));
        }
        self.executing = false;
        self.closed_at = Some(Utc::now());
        Ok(())
    }

    /// Checks a page that arrived over the wire. `open` says whether the run
    /// still has this page as its current one.
    pub(crate) fn check_reported(&mut self, open: bool) -> Result<()> {
        check_name("page name", &self.name)?;
        if self.thread_pool_size == 0 {
            return Err(CoordinatorError::invalid(format!(
                "page '{}' needs a thread pool size of at least 1",
                self.name
            )));
        }
        if self.executing != open || self.closed_at.is_some() == open {
            return Err(CoordinatorError::invalid(format!(
                "page '{}' open/closed state does not match the run",
                self.name
            )));
        }
        for record in &mut self.records {
            record.check_reported()?;
        }
        self.invalidate();
        Ok(())
    }

    /// Mutable access for finishing a case that lives in this page. Closed
    /// pages still accept late finishes from their worker threads.
    pub(crate) fn record_mut(&mut self, index: usize) -> Option<&mut ResultRecord> {
        self.invalidate();
        self.records.get_mut(index)
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.records.iter().filter(|r| r.status() == status).count()
    }

    /// Earliest request time among the page's cases, or `UNSET`.
    pub fn start_time(&self) -> i64 {
        *self.cache.start_time.get_or_init(|| {
            self.records
                .iter()
                .filter_map(|r| known(r.stats().request_time()))
                .min()
                .unwrap_or(UNSET)
        })
    }

    /// Milliseconds from the page start to the earliest first byte.
    pub fn time_to_first_byte(&self) -> i64 {
        let first = *self.cache.first_byte.get_or_init(|| {
            self.records
                .iter()
                .filter_map(|r| known(r.stats().first_byte_time()))
                .min()
                .unwrap_or(UNSET)
        });
        self.since_start(first)
    }

    /// Milliseconds from the page start to the latest last byte.
    pub fn time_to_last_byte(&self) -> i64 {
        let last = *self.cache.last_byte.get_or_init(|| {
            self.records
                .iter()
                .filter_map(|r| known(r.stats().last_byte_time()))
                .max()
                .unwrap_or(UNSET)
        });
        self.since_start(last)
    }

    pub fn bytes_sent(&self) -> i64 {
        *self
            .cache
            .bytes_sent
            .get_or_init(|| sum_known(self.records.iter().map(|r| r.stats().bytes_sent())))
    }

    pub fn bytes_received(&self) -> i64 {
        *self
            .cache
            .bytes_received
            .get_or_init(|| sum_known(self.records.iter().map(|r| r.stats().bytes_received())))
    }

    /// Min/avg/max over every CPU tick recorded by the page's cases.
    pub fn cpu(&self) -> CpuSummary {
        *self.cache.cpu.get_or_init(|| {
            let ticks: Vec<i64> = self
                .records
                .iter()
                .flat_map(|r| r.stats().all_cpu_ticks().iter().map(|t| t.percent))
                .collect();
            if ticks.is_empty() {
                return CpuSummary::UNSET;
            }
            let sum: i64 = ticks.iter().sum();
            CpuSummary {
                min: ticks.iter().copied().min().unwrap_or(UNSET),
                avg: (sum as f64 / ticks.len() as f64).round() as i64,
                max: ticks.iter().copied().max().unwrap_or(UNSET),
            }
        })
    }

    fn since_start(&self, mark: i64) -> i64 {
        match (known(self.start_time()), known(mark)) {
            (Some(start), Some(mark)) => (mark - start).max(0),
            _ => UNSET,
        }
    }

    fn invalidate(&mut self) {
        self.cache = PageCache::default();
    }
}

fn sum_known(values: impl Iterator<Item = i64>) -> i64 {
    values
        .filter_map(known)
        .fold(None, |acc: Option<i64>, v| Some(acc.unwrap_or(0) + v))
        .unwrap_or(UNSET)
}
