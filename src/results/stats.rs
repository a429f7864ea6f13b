use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;

use crate::error::{CoordinatorError, Result};

/// Sentinel for a timestamp, counter or CPU figure that has not been recorded.
pub const UNSET: i64 = -1;

/// Returns `Some(value)` unless `value` is the unset sentinel.
pub fn known(value: i64) -> Option<i64> {
    (value != UNSET).then_some(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTick {
    pub timestamp_ms: i64,
    pub percent: i64,
}

/// Samples for one unit of work: byte timing marks, byte counters and CPU
/// ticks. All timestamps are epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceStats {
    request_time: i64,
    connect_time: i64,
    first_byte_time: i64,
    last_byte_time: i64,
    bytes_sent: i64,
    bytes_received: i64,
    cpu_ticks: Vec<CpuTick>,
    min_cpu: i64,
    max_cpu: i64,
    #[serde(skip)]
    avg_cpu: OnceCell<i64>,
}

impl Default for PerformanceStats {
    fn default() -> Self {
        Self::new()
    }
}

fn set_once(slot: &mut i64, value: i64, field: &str) -> Result<()> {
    if value < 0 {
        return Err(CoordinatorError::invalid(format!(
            "{} must not be negative (got {})",
            field, value
        )));
    }
    if *slot != UNSET {
        return Err(CoordinatorError::illegal(format!(
            "{} already set to {}",
            field, *slot
        )));
    }
    *slot = value;
    Ok(())
}

fn non_negative(value: i64, field: &str) -> Result<i64> {
    if value < 0 {
        return Err(CoordinatorError::invalid(format!(
            "{} must not be negative (got {})",
            field, value
        )));
    }
    Ok(value)
}

impl PerformanceStats {
    pub fn new() -> Self {
        Self {
            request_time: UNSET,
            connect_time: UNSET,
            first_byte_time: UNSET,
            last_byte_time: UNSET,
            bytes_sent: UNSET,
            bytes_received: UNSET,
            cpu_ticks: Vec::new(),
            min_cpu: UNSET,
            max_cpu: UNSET,
            avg_cpu: OnceCell::new(),
        }
    }

    pub fn set_request_time(&mut self, ms: i64) -> Result<()> {
        set_once(&mut self.request_time, ms, "request time")
    }

    pub fn set_connect_time(&mut self, ms: i64) -> Result<()> {
        set_once(&mut self.connect_time, ms, "connect time")
    }

    pub fn set_first_byte_time(&mut self, ms: i64) -> Result<()> {
        set_once(&mut self.first_byte_time, ms, "first byte time")
    }

    pub fn set_last_byte_time(&mut self, ms: i64) -> Result<()> {
        set_once(&mut self.last_byte_time, ms, "last byte time")
    }

    pub fn set_bytes_sent(&mut self, bytes: i64) -> Result<()> {
        self.bytes_sent = non_negative(bytes, "bytes sent")?;
        Ok(())
    }

    pub fn set_bytes_received(&mut self, bytes: i64) -> Result<()> {
        self.bytes_received = non_negative(bytes, "bytes received")?;
        Ok(())
    }

    pub fn request_time(&self) -> i64 {
        self.request_time
    }

    pub fn connect_time(&self) -> i64 {
        self.connect_time
    }

    pub fn first_byte_time(&self) -> i64 {
        self.first_byte_time
    }

    pub fn last_byte_time(&self) -> i64 {
        self.last_byte_time
    }

    pub fn bytes_sent(&self) -> i64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> i64 {
        self.bytes_received
    }

    /// Milliseconds from request to first byte, or `UNSET`.
    pub fn time_to_first_byte(&self) -> i64 {
        match (known(self.request_time), known(self.first_byte_time)) {
            (Some(req), Some(first)) => (first - req).max(0),
            _ => UNSET,
        }
    }

    /// Milliseconds from request to last byte, or `UNSET`.
    pub fn time_to_last_byte(&self) -> i64 {
        match (known(self.request_time), known(self.last_byte_time)) {
            (Some(req), Some(last)) => (last - req).max(0),
            _ => UNSET,
        }
    }

    pub fn add_cpu_tick(&mut self, percent: i64) -> Result<()> {
        self.add_cpu_tick_at(Utc::now().timestamp_millis(), percent)
    }

    pub fn add_cpu_tick_at(&mut self, timestamp_ms: i64, percent: i64) -> Result<()> {
        if !(0..=100).contains(&percent) {
            return Err(CoordinatorError::invalid(format!(
                "CPU percent must be within 0..=100 (got {})",
                percent
            )));
        }

        self.cpu_ticks.push(CpuTick {
            timestamp_ms,
            percent,
        });
        self.min_cpu = match known(self.min_cpu) {
            Some(min) => min.min(percent),
            None => percent,
        };
        self.max_cpu = self.max_cpu.max(percent);
        self.avg_cpu = OnceCell::new();
        Ok(())
    }

    /// Checks stats that arrived over the wire rather than through the
    /// setters. Min and max are rebuilt from the ticks.
    pub(crate) fn check_reported(&mut self) -> Result<()> {
        for (value, field) in [
            (self.request_time, "request time"),
            (self.connect_time, "connect time"),
            (self.first_byte_time, "first byte time"),
            (self.last_byte_time, "last byte time"),
            (self.bytes_sent, "bytes sent"),
            (self.bytes_received, "bytes received"),
        ] {
            if value != UNSET {
                non_negative(value, field)?;
            }
        }
        for tick in &self.cpu_ticks {
            if !(0..=100).contains(&tick.percent) {
                return Err(CoordinatorError::invalid(format!(
                    "CPU percent must be within 0..=100 (got {})",
                    tick.percent
                )));
            }
        }

        let percents = self.cpu_ticks.iter().map(|t| t.percent);
        self.min_cpu = percents.clone().min().unwrap_or(UNSET);
        self.max_cpu = percents.max().unwrap_or(UNSET);
        self.avg_cpu = OnceCell::new();
        Ok(())
    }

    pub fn min_cpu(&self) -> i64 {
        self.min_cpu
    }

    pub fn max_cpu(&self) -> i64 {
        self.max_cpu
    }

    /// Rounded mean of all ticks, computed once per batch of new ticks.
    pub fn avg_cpu(&self) -> i64 {
        *self.avg_cpu.get_or_init(|| {
            if self.cpu_ticks.is_empty() {
                return UNSET;
            }
            let sum: i64 = self.cpu_ticks.iter().map(|t| t.percent).sum();
            (sum as f64 / self.cpu_ticks.len() as f64).round() as i64
        })
    }

    /// Ticks in the order they were recorded.
    pub fn all_cpu_ticks(&self) -> &[CpuTick] {
        &self.cpu_ticks
    }

    pub fn has_cpu_ticks(&self) -> bool {
        !self.cpu_ticks.is_empty()
    }
}
