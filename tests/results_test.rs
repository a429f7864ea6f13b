use chrono::{Duration, Utc};
use qa_coordinator::error::CoordinatorError;
use qa_coordinator::results::{
    PageResults, PerformanceStats, ResultRecord, RunResults, TestStatus, UNSET,
};
use serde_json::Value;

fn finish_after(results: &RunResults, ms: i64, status: TestStatus) {
    let start = Utc::now() - Duration::seconds(30);
    let h = results.create_test_at("case", Value::Null, start).unwrap();
    results
        .finish_test_at(h, status, start + Duration::milliseconds(ms), None, None)
        .unwrap();
}

#[test]
fn test_counters_match_terminal_calls() {
    let r = RunResults::new("mixed", "d1", false).unwrap();
    let statuses = [
        TestStatus::Passed,
        TestStatus::Failed,
        TestStatus::Passed,
        TestStatus::Error,
        TestStatus::Skipped,
        TestStatus::Passed,
    ];
    let handles: Vec<_> = statuses
        .iter()
        .map(|_| r.create_test("GET /", Value::Null).unwrap())
        .collect();
    // One case stays pending.
    r.create_test("pending", Value::Null).unwrap();

    for (h, s) in handles.iter().zip(statuses) {
        r.finish_test(*h, s, None, None).unwrap();
    }
    for h in &handles {
        assert!(r.pass_test(*h, None, None).is_err());
    }

    let c = r.counters();
    assert_eq!(c.cases, 7);
    assert_eq!(c.finished(), statuses.len());
    assert_eq!((c.passed, c.failed, c.errors, c.skipped), (3, 1, 1, 1));
}

#[test]
fn test_average_case_time_excludes_skipped() {
    let r = RunResults::new("timing", "d1", false).unwrap();
    finish_after(&r, 10, TestStatus::Passed);
    finish_after(&r, 20, TestStatus::Passed);
    finish_after(&r, 30, TestStatus::Passed);
    finish_after(&r, 1000, TestStatus::Skipped);

    let stats = r.compute_statistics();
    assert_eq!(stats.average_ms, 20);
    assert_eq!(stats.slowest_ms, 30);
}

#[test]
fn test_closed_page_rejects_results() {
    let mut page = PageResults::new("home", 2).unwrap();
    page.add_test_result(ResultRecord::new("GET /", Value::Null).unwrap())
        .unwrap();
    page.close().unwrap();

    let err = page
        .add_test_result(ResultRecord::new("GET /late", Value::Null).unwrap())
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::IllegalState(_)));
    assert!(matches!(
        page.close().unwrap_err(),
        CoordinatorError::IllegalState(_)
    ));
    assert_eq!(page.len(), 1);
}

#[test]
fn test_cpu_tick_bounds_and_summary() {
    let mut stats = PerformanceStats::new();
    assert_eq!(stats.avg_cpu(), UNSET);
    for pct in [10, 20, 30] {
        stats.add_cpu_tick(pct).unwrap();
    }
    assert_eq!(stats.min_cpu(), 10);
    assert_eq!(stats.max_cpu(), 30);
    assert_eq!(stats.avg_cpu(), 20);

    assert!(stats.add_cpu_tick(150).is_err());
    assert!(stats.add_cpu_tick(-1).is_err());
    assert_eq!(stats.all_cpu_ticks().len(), 3);
}

#[test]
fn test_page_aggregates_skip_unset_values() {
    let r = RunResults::new("bytes", "d1", false).unwrap();
    r.start_page("downloads", 4).unwrap();

    let with_bytes = r.create_test("GET /a", Value::Null).unwrap();
    let mut stats = PerformanceStats::new();
    stats.set_bytes_received(300).unwrap();
    r.pass_test(with_bytes, None, Some(stats)).unwrap();

    let without = r.create_test("GET /b", Value::Null).unwrap();
    r.pass_test(without, None, None).unwrap();
    r.end_page().unwrap();

    let data = r.snapshot();
    let page = &data.pages()[0];
    assert_eq!(page.bytes_received(), 300);
    assert_eq!(page.bytes_sent(), UNSET);
}
