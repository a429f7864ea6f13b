pub mod cpu;
pub mod page;
pub mod record;
pub mod report;
pub mod run;
pub mod stats;

pub use cpu::CpuSampler;
pub use page::{CpuSummary, PageResults};
pub use record::{ResultRecord, TestStatus};
pub use report::ReportSummary;
pub use run::{RunCounters, RunData, RunResults, RunStatistics, TestHandle};
pub use stats::{CpuTick, PerformanceStats, UNSET};
