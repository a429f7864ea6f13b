use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::ResultsWriter;
use crate::error::{CoordinatorError, Result};
use crate::results::{PageResults, PerformanceStats, ResultRecord, RunData, RunResults};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Relational back end. Each write opens its own connection and commits
/// after every logical unit (script, page, case), so a failure part way
/// leaves the units before it in place.
pub struct SqliteWriter {
    db_path: PathBuf,
}

impl SqliteWriter {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let writer = Self {
            db_path: db_path.to_path_buf(),
        };
        let conn = writer.connect()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        init_schema(&conn)?;
        Ok(writer)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(conn)
    }

    /// Writes one run and returns its script row id.
    pub fn write_run(&self, data: &RunData) -> Result<i64> {
        let fail = |target: &str, e: rusqlite::Error| CoordinatorError::Persist {
            script: data.script_name().to_string(),
            client: data.client_name().to_string(),
            target: target.to_string(),
            message: e.to_string(),
        };

        let mut conn = self.connect().map_err(|e| fail("connection", e))?;

        let script_id = {
            let tx = begin(&mut conn).map_err(|e| fail("qa_scripts", e))?;
            let id = insert_script(&tx, data).map_err(|e| fail("qa_scripts", e))?;
            if let Some(cpu) = data.cpu_usage() {
                insert_cpu_samples(&tx, Owner::Script(id), cpu)
                    .map_err(|e| fail("qa_cpu_samples", e))?;
            }
            tx.commit().map_err(|e| fail("qa_scripts", e))?;
            id
        };

        let mut page_ids = Vec::with_capacity(data.pages().len());
        for page in data.pages() {
            let tx = begin(&mut conn).map_err(|e| fail("qa_pages", e))?;
            let id = insert_page(&tx, script_id, page)
                .map_err(|e| fail(&format!("qa_pages/{}", page.name()), e))?;
            tx.commit().map_err(|e| fail("qa_pages", e))?;
            page_ids.push(id);
        }

        for (position, (record, page)) in data.cases().enumerate() {
            let target = format!("qa_cases/{}", position);
            let tx = begin(&mut conn).map_err(|e| fail(&target, e))?;
            let case_id = insert_case(&tx, record).map_err(|e| fail(&target, e))?;
            insert_cpu_samples(&tx, Owner::Case(case_id), record.stats())
                .map_err(|e| fail("qa_cpu_samples", e))?;
            match page.and_then(|i| page_ids.get(i)) {
                Some(page_id) => tx
                    .execute(
                        "INSERT INTO qa_page_cases (page_id, case_id, position) VALUES (?1, ?2, ?3)",
                        params![page_id, case_id, position as i64],
                    )
                    .map_err(|e| fail("qa_page_cases", e))?,
                None => tx
                    .execute(
                        "INSERT INTO qa_script_cases (script_id, case_id, position) VALUES (?1, ?2, ?3)",
                        params![script_id, case_id, position as i64],
                    )
                    .map_err(|e| fail("qa_script_cases", e))?,
            };
            tx.commit().map_err(|e| fail(&target, e))?;
        }

        debug!(
            "Stored '{}' from {} as script {}",
            data.script_name(),
            data.client_name(),
            script_id
        );
        Ok(script_id)
    }
}

impl ResultsWriter for SqliteWriter {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn write(&self, results: &RunResults) -> Result<()> {
        self.write_run(&results.snapshot()).map(|_| ())
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS id_counters (
            key TEXT PRIMARY KEY,
            next_id INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS qa_scripts (
            id INTEGER PRIMARY KEY,
            script_name TEXT NOT NULL,
            client_name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            cases INTEGER NOT NULL,
            passed INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            errors INTEGER NOT NULL,
            skipped INTEGER NOT NULL,
            average_ms INTEGER NOT NULL,
            median_ms INTEGER NOT NULL,
            fastest_ms INTEGER NOT NULL,
            slowest_ms INTEGER NOT NULL,
            cpu_min INTEGER,
            cpu_avg INTEGER,
            cpu_max INTEGER,
            log TEXT
        );

        CREATE TABLE IF NOT EXISTS qa_pages (
            id INTEGER PRIMARY KEY,
            script_id INTEGER NOT NULL REFERENCES qa_scripts(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            thread_pool_size INTEGER NOT NULL,
            opened_at TEXT NOT NULL,
            closed_at TEXT,
            start_time INTEGER NOT NULL,
            ttfb_ms INTEGER NOT NULL,
            ttlb_ms INTEGER NOT NULL,
            bytes_sent INTEGER NOT NULL,
            bytes_received INTEGER NOT NULL,
            cpu_min INTEGER NOT NULL,
            cpu_avg INTEGER NOT NULL,
            cpu_max INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS qa_cases (
            id INTEGER PRIMARY KEY,
            request_type TEXT NOT NULL,
            detail TEXT,
            status TEXT NOT NULL,
            message TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT,
            duration_ms INTEGER NOT NULL,
            request_time INTEGER NOT NULL,
            connect_time INTEGER NOT NULL,
            first_byte_time INTEGER NOT NULL,
            last_byte_time INTEGER NOT NULL,
            bytes_sent INTEGER NOT NULL,
            bytes_received INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS qa_cpu_samples (
            id INTEGER PRIMARY KEY,
            script_id INTEGER REFERENCES qa_scripts(id) ON DELETE CASCADE,
            case_id INTEGER REFERENCES qa_cases(id) ON DELETE CASCADE,
            timestamp_ms INTEGER NOT NULL,
            percent INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS qa_script_cases (
            script_id INTEGER NOT NULL REFERENCES qa_scripts(id) ON DELETE CASCADE,
            case_id INTEGER NOT NULL REFERENCES qa_cases(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            PRIMARY KEY (script_id, case_id)
        );

        CREATE TABLE IF NOT EXISTS qa_page_cases (
            page_id INTEGER NOT NULL REFERENCES qa_pages(id) ON DELETE CASCADE,
            case_id INTEGER NOT NULL REFERENCES qa_cases(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            PRIMARY KEY (page_id, case_id)
        );

        CREATE INDEX IF NOT EXISTS idx_qa_scripts_name ON qa_scripts(script_name, start_date);
        CREATE INDEX IF NOT EXISTS idx_qa_pages_script ON qa_pages(script_id);
        CREATE INDEX IF NOT EXISTS idx_qa_cpu_case ON qa_cpu_samples(case_id);
    ",
    )
}

/// Takes the write lock up front. Every unit reads `id_counters` before it
/// writes, and a deferred transaction that has to upgrade its read lock gets
/// SQLITE_BUSY at once instead of waiting out the busy timeout.
fn begin(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

/// Hands out the next id for `key` from the counter table.
fn next_id(tx: &Transaction<'_>, key: &str) -> rusqlite::Result<i64> {
    let current: Option<i64> = tx
        .query_row(
            "SELECT next_id FROM id_counters WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;

    let id = current.unwrap_or(1);
    tx.execute(
        "INSERT INTO id_counters (key, next_id) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET next_id = excluded.next_id",
        params![key, id + 1],
    )?;
    Ok(id)
}

fn insert_script(tx: &Transaction<'_>, data: &RunData) -> rusqlite::Result<i64> {
    let id = next_id(tx, "qa_scripts")?;
    let stats = data.statistics();
    let counters = data.counters();
    let cpu = data.cpu_usage().filter(|c| c.has_cpu_ticks());
    let log = data.log_lines().map(|lines| lines.join("\n"));

    tx.execute(
        "INSERT INTO qa_scripts (
            id, script_name, client_name, start_date,
            cases, passed, failed, errors, skipped,
            average_ms, median_ms, fastest_ms, slowest_ms,
            cpu_min, cpu_avg, cpu_max, log
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            id,
            data.script_name(),
            data.client_name(),
            data.start_date().to_rfc3339(),
            counters.cases as i64,
            counters.passed as i64,
            counters.failed as i64,
            counters.errors as i64,
            counters.skipped as i64,
            stats.average_ms,
            stats.median_ms,
            stats.fastest_ms,
            stats.slowest_ms,
            cpu.map(|c| c.min_cpu()),
            cpu.map(|c| c.avg_cpu()),
            cpu.map(|c| c.max_cpu()),
            log,
        ],
    )?;
    Ok(id)
}

fn insert_page(tx: &Transaction<'_>, script_id: i64, page: &PageResults) -> rusqlite::Result<i64> {
    let id = next_id(tx, "qa_pages")?;
    let cpu = page.cpu();
    tx.execute(
        "INSERT INTO qa_pages (
            id, script_id, name, thread_pool_size, opened_at, closed_at,
            start_time, ttfb_ms, ttlb_ms, bytes_sent, bytes_received,
            cpu_min, cpu_avg, cpu_max
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            id,
            script_id,
            page.name(),
            page.thread_pool_size() as i64,
            page.opened_at().to_rfc3339(),
            page.closed_at().map(|t| t.to_rfc3339()),
            page.start_time(),
            page.time_to_first_byte(),
            page.time_to_last_byte(),
            page.bytes_sent(),
            page.bytes_received(),
            cpu.min,
            cpu.avg,
            cpu.max,
        ],
    )?;
    Ok(id)
}

fn insert_case(tx: &Transaction<'_>, record: &ResultRecord) -> rusqlite::Result<i64> {
    let id = next_id(tx, "qa_cases")?;
    let stats = record.stats();
    let detail = (!record.detail().is_null()).then(|| record.detail().to_string());
    tx.execute(
        "INSERT INTO qa_cases (
            id, request_type, detail, status, message, start_time, end_time, duration_ms,
            request_time, connect_time, first_byte_time, last_byte_time,
            bytes_sent, bytes_received
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            id,
            record.request_type(),
            detail,
            record.status().as_str(),
            record.message(),
            record.start_time().to_rfc3339(),
            record.end_time().map(|t| t.to_rfc3339()),
            record.duration_ms(),
            stats.request_time(),
            stats.connect_time(),
            stats.first_byte_time(),
            stats.last_byte_time(),
            stats.bytes_sent(),
            stats.bytes_received(),
        ],
    )?;
    Ok(id)
}

enum Owner {
    Script(i64),
    Case(i64),
}

fn insert_cpu_samples(
    tx: &Transaction<'_>,
    owner: Owner,
    stats: &PerformanceStats,
) -> rusqlite::Result<()> {
    let (script_id, case_id) = match owner {
        Owner::Script(id) => (Some(id), None),
        Owner::Case(id) => (None, Some(id)),
    };
    for tick in stats.all_cpu_ticks() {
        let id = next_id(tx, "qa_cpu_samples")?;
        tx.execute(
            "INSERT INTO qa_cpu_samples (id, script_id, case_id, timestamp_ms, percent)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, script_id, case_id, tick.timestamp_ms, tick.percent],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::TestStatus;
    use serde_json::json;

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    fn sample() -> RunResults {
        let r = RunResults::new("search", "d1", true).unwrap();
        let h = r.create_test("GET /", json!({"q": "rust"})).unwrap();
        let mut stats = PerformanceStats::new();
        stats.add_cpu_tick(40).unwrap();
        stats.add_cpu_tick(60).unwrap();
        r.pass_test(h, None, Some(stats)).unwrap();

        r.start_page("results", 4).unwrap();
        for _ in 0..3 {
            let h = r.create_test("GET /page", json!(null)).unwrap();
            r.finish_test(h, TestStatus::Failed, Some("slow".into()), None)
                .unwrap();
        }
        r.end_page().unwrap();
        r.log("done");
        r
    }

    #[test]
    fn test_write_run_populates_every_table() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SqliteWriter::open(&dir.path().join("qa.db")).unwrap();
        let id = writer.write_run(&sample().snapshot()).unwrap();
        assert_eq!(id, 1);

        let conn = Connection::open(writer.db_path()).unwrap();
        assert_eq!(count(&conn, "qa_scripts"), 1);
        assert_eq!(count(&conn, "qa_pages"), 1);
        assert_eq!(count(&conn, "qa_cases"), 4);
        assert_eq!(count(&conn, "qa_script_cases"), 1);
        assert_eq!(count(&conn, "qa_page_cases"), 3);
        assert_eq!(count(&conn, "qa_cpu_samples"), 2);

        let (failed, log): (i64, String) = conn
            .query_row(
                "SELECT failed, log FROM qa_scripts WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(failed, 3);
        assert_eq!(log, "done");
    }

    #[test]
    fn test_ids_come_from_counter_table() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SqliteWriter::open(&dir.path().join("qa.db")).unwrap();
        assert_eq!(writer.write_run(&sample().snapshot()).unwrap(), 1);
        assert_eq!(writer.write_run(&sample().snapshot()).unwrap(), 2);

        let conn = Connection::open(writer.db_path()).unwrap();
        let next: i64 = conn
            .query_row(
                "SELECT next_id FROM id_counters WHERE key = 'qa_cases'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(next, 9);
    }

    #[test]
    fn test_partial_write_keeps_committed_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SqliteWriter::open(&dir.path().join("qa.db")).unwrap();
        {
            let conn = Connection::open(writer.db_path()).unwrap();
            conn.execute_batch("DROP TABLE qa_page_cases;").unwrap();
        }

        let err = writer.write_run(&sample().snapshot()).unwrap_err();
        match err {
            CoordinatorError::Persist { script, target, .. } => {
                assert_eq!(script, "search");
                assert_eq!(target, "qa_page_cases");
            }
            other => panic!("unexpected error: {other}"),
        }

        let conn = Connection::open(writer.db_path()).unwrap();
        assert_eq!(count(&conn, "qa_scripts"), 1);
        assert_eq!(count(&conn, "qa_pages"), 1);
        // The case outside the page committed; the first page case rolled back.
        assert_eq!(count(&conn, "qa_cases"), 1);
        assert_eq!(count(&conn, "qa_script_cases"), 1);
    }
}
