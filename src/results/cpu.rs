use std::time::Duration;
use sysinfo::System;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::stats::PerformanceStats;
use crate::config::CPU_SAMPLE_INTERVAL_MS;

/// Background sampler of global CPU usage, used by drivers to attach
/// script-level CPU figures to their [`RunResults`](super::RunResults).
pub struct CpuSampler {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<PerformanceStats>,
}

impl CpuSampler {
    pub fn start(interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut system = System::new();
            // The first reading only primes the counters.
            system.refresh_cpu_usage();
            let mut stats = PerformanceStats::new();

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        system.refresh_cpu_usage();
                        let pct = to_percent(system.global_cpu_usage());
                        if let Err(e) = stats.add_cpu_tick(pct) {
                            warn!("Dropping CPU sample: {}", e);
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }

            debug!("CPU sampler stopped after {} ticks", stats.all_cpu_ticks().len());
            stats
        });

        Self { stop_tx, handle }
    }

    /// Samples at the standard interval.
    pub fn start_default() -> Self {
        Self::start(Duration::from_millis(CPU_SAMPLE_INTERVAL_MS))
    }

    /// Stops sampling and returns what was collected.
    pub async fn stop(self) -> PerformanceStats {
        let _ = self.stop_tx.send(true);
        match self.handle.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("CPU sampler task failed: {}", e);
                PerformanceStats::new()
            }
        }
    }
}

fn to_percent(usage: f32) -> i64 {
    if usage.is_nan() {
        return 0;
    }
    usage.round().clamp(0.0, 100.0) as i64
}
