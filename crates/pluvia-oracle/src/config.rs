//! Oracle configuration
//!
//! Loaded from an optional YAML file, then overridden by `PLUVIA_*`
//! environment variables. Nested keys are joined with `__`
//! (`PLUVIA_POLL__INTERVAL_SECS=30`).

use pluvia_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Oracle configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub journal: JournalSettings,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl OracleConfig {
    /// Load configuration from `path` (if it exists) and the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_env(path.as_ref(), None)
    }

    /// Like [`OracleConfig::load`], reading variables from `env` instead
    /// of the process environment when given
    fn load_with_env(path: &Path, env: Option<config::Map<String, String>>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                // The prefix separator defaults to the key separator
                config::Environment::with_prefix("PLUVIA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| Error::config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the oracle cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_secs == 0 {
            return Err(Error::config("poll.interval_secs must be greater than zero"));
        }
        if self.poll.max_concurrent_submissions == 0 {
            return Err(Error::config(
                "poll.max_concurrent_submissions must be greater than zero",
            ));
        }
        if self.weather.lookback_days == 0 {
            return Err(Error::config("weather.lookback_days must be greater than zero"));
        }
        if self.ledger.mode == LedgerMode::Relay && self.ledger.relay_url.is_none() {
            return Err(Error::config("ledger.relay_url is required in relay mode"));
        }
        Ok(())
    }
}

/// Poll loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between the end of one tick and the start of the next
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Ledger submissions in flight within one pass
    #[serde(default = "default_concurrency")]
    pub max_concurrent_submissions: usize,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            max_concurrent_submissions: default_concurrency(),
        }
    }
}

/// Weather API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// One Call compatible endpoint
    #[serde(default = "default_weather_url")]
    pub url: String,

    /// Number of daily entries summed into the measurement
    #[serde(default = "default_lookback")]
    pub lookback_days: usize,

    #[serde(default = "default_latitude")]
    pub latitude: f64,

    #[serde(default = "default_longitude")]
    pub longitude: f64,

    /// Sent as `appid` when present
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            url: default_weather_url(),
            lookback_days: default_lookback(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// How triggers reach the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMode {
    /// Log the contract call and return a synthetic reference
    #[default]
    DryRun,
    /// Forward the call to a signing relay
    Relay,
}

/// Ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub mode: LedgerMode,

    /// Contract the trigger calls
    #[serde(default)]
    pub contract_address: Option<String>,

    /// Signing relay endpoint, required in relay mode
    #[serde(default)]
    pub relay_url: Option<String>,

    /// Upper bound on one submission
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,
}

impl LedgerConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: LedgerMode::default(),
            contract_address: None,
            relay_url: None,
            submit_timeout_secs: default_submit_timeout(),
        }
    }
}

/// Policy store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Trigger journal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_journal_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl JournalSettings {
    pub fn to_journal_config(&self) -> pluvia_telemetry::JournalConfig {
        pluvia_telemetry::JournalConfig {
            dir: self.dir.clone(),
            max_file_size: self.max_file_size,
        }
    }
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_journal_dir(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// Prometheus exporter settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Address for the scrape endpoint; no exporter when unset
    #[serde(default)]
    pub listen: Option<String>,
}

/// Log output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_interval() -> u64 {
    60
}

fn default_concurrency() -> usize {
    4
}

fn default_weather_url() -> String {
    "http://localhost:5050/onecall".to_string()
}

fn default_lookback() -> usize {
    10
}

fn default_latitude() -> f64 {
    -23.5505
}

fn default_longitude() -> f64 {
    -46.6333
}

fn default_request_timeout() -> u64 {
    10
}

fn default_submit_timeout() -> u64 {
    30
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./apolices")
}

fn default_journal_dir() -> PathBuf {
    PathBuf::from("./journal")
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

fn default_true() -> bool {
    true
}
