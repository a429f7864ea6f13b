use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::settings::PersistentSettings;

/// QA Coordinator. Dispatches test scripts to remote drivers, brokers
/// named locks between them and collects their results.
#[derive(Parser, Debug, Clone)]
#[command(name = "qa-coordinator")]
pub struct CliArgs {
    /// Coordinator HTTP port
    #[arg(long = "port", default_value_t = DEFAULT_COORDINATOR_PORT)]
    pub port: u16,

    /// Address to bind the HTTP listener to
    #[arg(long = "bind", default_value = "0.0.0.0")]
    pub bind: String,

    /// Directory for text result reports
    #[arg(short = 'r', long = "results-dir", default_value = "qa-results")]
    pub results_dir: PathBuf,

    /// SQLite database for the back-end results writer
    #[arg(short = 'd', long = "database")]
    pub database: Option<PathBuf>,

    /// Disable the text report writer
    #[arg(long = "no-file-writer")]
    pub no_file_writer: bool,

    /// Directory for rolling coordinator log files
    #[arg(short = 'l', long = "log-dir")]
    pub log_dir: Option<PathBuf>,

    /// JSON settings file overriding writer targets
    #[arg(short = 's', long = "settings")]
    pub settings: Option<PathBuf>,

    /// Lease applied to lock requests that do not name one
    #[arg(long = "default-lease-ms", default_value_t = DEFAULT_LEASE_MS)]
    pub default_lease_ms: u64,

    /// Wait applied to lock requests that do not name one
    #[arg(long = "default-wait-ms", default_value_t = DEFAULT_WAIT_MS)]
    pub default_wait_ms: u64,

    /// Timeout for a single call to a driver
    #[arg(long = "driver-timeout-secs", default_value_t = DRIVER_REQUEST_TIMEOUT_SECS)]
    pub driver_timeout_secs: u64,

    /// How long a graceful shutdown waits for the running configuration
    #[arg(long = "drain-timeout-secs", default_value_t = DEFAULT_DRAIN_TIMEOUT_SECS)]
    pub drain_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub port: u16,
    pub bind: String,
    pub results_dir: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
    pub default_lease: Duration,
    pub default_wait: Duration,
    pub driver_timeout: Duration,
    pub drain_timeout: Duration,
}

// Port constants
pub const DEFAULT_COORDINATOR_PORT: u16 = 9870;

// Lock brokerage constants
pub const DEFAULT_LEASE_MS: u64 = 60_000;
pub const DEFAULT_WAIT_MS: u64 = 30_000;
pub const MAX_LEASE_MS: u64 = 3_600_000;

// Driver transport constants
pub const DRIVER_REQUEST_TIMEOUT_SECS: u64 = 30;

// Shutdown constants
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 300;

// Event constants
pub const EVENT_BUFFER_SIZE: usize = 500;
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// Results constants
pub const CPU_SAMPLE_INTERVAL_MS: u64 = 1_000;

impl CoordinatorConfig {
    pub fn from_args(args: CliArgs) -> Self {
        let results_dir = if args.no_file_writer {
            None
        } else {
            Some(args.results_dir)
        };

        CoordinatorConfig {
            port: args.port,
            bind: args.bind,
            results_dir,
            database: args.database,
            log_dir: args.log_dir,
            settings_path: args.settings,
            default_lease: Duration::from_millis(args.default_lease_ms.min(MAX_LEASE_MS)),
            default_wait: Duration::from_millis(args.default_wait_ms),
            driver_timeout: Duration::from_secs(args.driver_timeout_secs),
            drain_timeout: Duration::from_secs(args.drain_timeout_secs),
        }
    }

    /// Settings file values win over command-line values.
    pub fn apply_settings(&mut self, settings: &PersistentSettings) {
        if let Some(dir) = &settings.results_dir {
            self.results_dir = Some(dir.clone());
        }
        if settings.file_writer_enabled == Some(false) {
            self.results_dir = None;
        }
        if let Some(db) = &settings.database {
            self.database = Some(db.clone());
        }
        if let Some(ms) = settings.default_lease_ms {
            self.default_lease = Duration::from_millis(ms.min(MAX_LEASE_MS));
        }
        if let Some(ms) = settings.default_wait_ms {
            self.default_wait = Duration::from_millis(ms);
        }
    }

    /// The persistent subset of this configuration.
    pub fn to_settings(&self) -> PersistentSettings {
        PersistentSettings {
            results_dir: self.results_dir.clone(),
            file_writer_enabled: Some(self.results_dir.is_some()),
            database: self.database.clone(),
            default_lease_ms: u64::try_from(self.default_lease.as_millis()).ok(),
            default_wait_ms: u64::try_from(self.default_wait.as_millis()).ok(),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            port: DEFAULT_COORDINATOR_PORT,
            bind: "0.0.0.0".to_string(),
            results_dir: None,
            database: None,
            log_dir: None,
            settings_path: None,
            default_lease: Duration::from_millis(DEFAULT_LEASE_MS),
            default_wait: Duration::from_millis(DEFAULT_WAIT_MS),
            driver_timeout: Duration::from_secs(DRIVER_REQUEST_TIMEOUT_SECS),
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
        }
    }
}
