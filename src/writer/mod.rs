pub mod file;
pub mod sqlite;

use std::sync::Arc;
use tracing::info;

use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::results::RunResults;

pub use file::FileWriter;
pub use sqlite::SqliteWriter;

/// Persists one completed run. A writer reads the results and never mutates
/// them; a failure may leave a partial write behind (see [`SqliteWriter`]).
pub trait ResultsWriter: Send + Sync {
    fn name(&self) -> &str;

    fn write(&self, results: &RunResults) -> Result<()>;
}

/// Writers enabled by the configuration, file writer first.
pub fn build_writers(config: &CoordinatorConfig) -> Result<Vec<Arc<dyn ResultsWriter>>> {
    let mut writers: Vec<Arc<dyn ResultsWriter>> = Vec::new();

    if let Some(dir) = &config.results_dir {
        info!("Text reports go to {}", dir.display());
        writers.push(Arc::new(FileWriter::in_directory(dir)));
    }
    if let Some(db) = &config.database {
        info!("Results database at {}", db.display());
        writers.push(Arc::new(SqliteWriter::open(db)?));
    }

    Ok(writers)
}
