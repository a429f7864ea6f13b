use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ResultsWriter;
use crate::error::{CoordinatorError, Result};
use crate::results::report;
use crate::results::{RunData, RunResults};

enum Target {
    Directory(PathBuf),
    Path(PathBuf),
}

/// Writes the canonical text report, one file per run.
pub struct FileWriter {
    target: Target,
}

impl FileWriter {
    /// Reports land in `dir` as `<script>-<client>-<start>.txt`.
    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::Directory(dir.into()),
        }
    }

    /// Every report overwrites `path`.
    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::Path(path.into()),
        }
    }

    pub fn target_for(&self, data: &RunData) -> PathBuf {
        match &self.target {
            Target::Path(path) => path.clone(),
            Target::Directory(dir) => dir.join(format!(
                "{}-{}-{}.txt",
                sanitize(data.script_name()),
                sanitize(data.client_name()),
                data.start_date().format("%Y%m%dT%H%M%S")
            )),
        }
    }

    fn write_report(path: &Path, report: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(report.as_bytes())?;
        out.flush()
    }
}

impl ResultsWriter for FileWriter {
    fn name(&self) -> &str {
        "file"
    }

    fn write(&self, results: &RunResults) -> Result<()> {
        let data = results.snapshot();
        let path = self.target_for(&data);
        let report = report::render(&data);

        Self::write_report(&path, &report).map_err(|e| CoordinatorError::Persist {
            script: data.script_name().to_string(),
            client: data.client_name().to_string(),
            target: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!("Wrote {} bytes to {}", report.len(), path.display());
        Ok(())
    }
}

/// Keeps names usable as file name parts on every platform.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ReportSummary;
    use serde_json::Value;

    fn run() -> RunResults {
        let r = RunResults::new("cart/checkout", "driver 1", false).unwrap();
        let h = r.create_test("POST /cart", Value::Null).unwrap();
        r.pass_test(h, None, None).unwrap();
        let h = r.create_test("POST /pay", Value::Null).unwrap();
        r.error_test(h, Some("502".into()), None).unwrap();
        r
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("cart/checkout"), "cart_checkout");
        assert_eq!(sanitize("driver 1"), "driver_1");
        assert_eq!(sanitize("a-b_c.d"), "a-b_c.d");
    }

    #[test]
    fn test_writes_report_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::in_directory(dir.path().join("nested"));
        let results = run();
        writer.write(&results).unwrap();

        let path = writer.target_for(&results.snapshot());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("cart_checkout-driver_1-"));
        assert!(name.ends_with(".txt"));

        let text = fs::read_to_string(&path).unwrap();
        let summary = ReportSummary::parse(&text).unwrap();
        assert_eq!(summary.counters, results.counters());
    }

    #[test]
    fn test_failure_names_script_client_and_target() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes File::create fail.
        let blocked = dir.path().join("report.txt");
        fs::create_dir(&blocked).unwrap();

        let err = FileWriter::to_path(&blocked).write(&run()).unwrap_err();
        match err {
            CoordinatorError::Persist {
                script,
                client,
                target,
                ..
            } => {
                assert_eq!(script, "cart/checkout");
                assert_eq!(client, "driver 1");
                assert!(target.ends_with("report.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
