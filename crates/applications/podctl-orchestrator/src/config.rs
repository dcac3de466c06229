//! Operational configuration
//!
//! Built once at startup from three layers, later ones winning:
//!
//! 1. Built-in defaults
//! 2. An env file (`KEY=value` lines, `#` comments), `./env` unless overridden
//! 3. The process environment
//!
//! The resulting [`Config`] is passed by value into the controller. Nothing
//! here writes to the process environment.

use crate::error::{OrchestratorError, Result};
use podctl_core::PodRole;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Env file read when no path is given
pub const DEFAULT_ENV_FILE: &str = "env";

/// RunPod REST endpoint
pub const DEFAULT_REST_URL: &str = "https://rest.runpod.io/v1";

/// RunPod GraphQL endpoint (GPU catalogue)
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.runpod.io/graphql";

/// Keys read from the env file and the environment
const KEYS: &[&str] = &[
    "RUNPOD_API_KEY",
    "PODCTL_APP_NAME",
    "MAX_GPU_PRICE",
    "DISK_SIZE_GB",
    "CONTAINER_DISK_GB",
    "BASE_IMAGE",
    "NETWORK_VOLUME_ID",
    "NETWORK_VOLUME_ID_MAIN",
    "NETWORK_VOLUME_ID_BRANCH",
    "INACTIVITY_TIMEOUT_SECONDS",
    "PROXY_PORT",
    "POLL_INTERVAL_SECS",
    "START_TIMEOUT_SECS",
    "STOP_TIMEOUT_SECS",
    "RESTART_SETTLE_SECS",
    "HEALTH_INTERVAL_SECS",
    "MIN_GPU_MEMORY_GB",
    "RUNPOD_REST_URL",
    "RUNPOD_GRAPHQL_URL",
];

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token for the provider API
    pub api_key: String,

    /// Pod name prefix (`<app>-<role>-<ts>`)
    pub app_name: String,

    /// Spot price ceiling, USD per hour
    pub max_price: Decimal,

    /// Persistent volume size in GB
    pub disk_size_gb: u32,

    /// Container disk in GB
    pub container_disk_gb: u32,

    /// Workload image
    pub base_image: String,

    /// Network volume for the main pod
    pub volume_main: Option<String>,

    /// Network volume for the branch pod
    pub volume_branch: Option<String>,

    /// Idle shutdown for the deployed workload (not used by the orchestrator)
    pub inactivity_timeout_secs: u64,

    /// HTTP port the workload exposes through the provider proxy
    pub proxy_port: u16,

    /// Status poll interval
    pub poll_interval: Duration,

    /// Bound for a pod to reach RUNNING
    pub start_timeout: Duration,

    /// Bound for a pod to reach STOPPED
    pub stop_timeout: Duration,

    /// Pause between the stop and start halves of a restart
    pub restart_settle: Duration,

    /// Interval between endpoint health probes
    pub health_interval: Duration,

    /// VRAM floor for deploy candidates
    pub min_gpu_memory_gb: Option<u32>,

    /// REST base URL
    pub rest_url: String,

    /// GraphQL URL
    pub graphql_url: String,
}

impl Config {
    /// Defaults plus the given credential
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            app_name: "ashoka".to_string(),
            max_price: Decimal::new(50, 2),
            disk_size_gb: 50,
            container_disk_gb: 20,
            base_image: "ollama/ollama:latest".to_string(),
            volume_main: None,
            volume_branch: None,
            inactivity_timeout_secs: 1800,
            proxy_port: 5000,
            poll_interval: Duration::from_secs(5),
            start_timeout: Duration::from_secs(600),
            stop_timeout: Duration::from_secs(300),
            restart_settle: Duration::from_secs(5),
            health_interval: Duration::from_secs(10),
            min_gpu_memory_gb: None,
            rest_url: DEFAULT_REST_URL.to_string(),
            graphql_url: DEFAULT_GRAPHQL_URL.to_string(),
        }
    }

    /// Load from an env file and the process environment.
    ///
    /// An explicitly given file must exist; the default `./env` is optional.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        let mut source = match env_file {
            Some(path) => read_env_file(path)?,
            None if Path::new(DEFAULT_ENV_FILE).exists() => {
                read_env_file(Path::new(DEFAULT_ENV_FILE))?
            }
            None => BTreeMap::new(),
        };

        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                source.insert((*key).to_string(), value);
            }
        }

        Self::from_source(&source)
    }

    /// Build from an already-merged key/value source.
    ///
    /// A missing or empty `RUNPOD_API_KEY` is fatal.
    pub fn from_source(source: &BTreeMap<String, String>) -> Result<Self> {
        let api_key = lookup(source, "RUNPOD_API_KEY")
            .ok_or_else(|| OrchestratorError::config("RUNPOD_API_KEY not found in environment"))?;

        let defaults = Self::new(api_key);
        let shared_volume = lookup(source, "NETWORK_VOLUME_ID");

        Ok(Self {
            app_name: lookup(source, "PODCTL_APP_NAME").unwrap_or(defaults.app_name),
            max_price: parse_or(source, "MAX_GPU_PRICE", defaults.max_price)?,
            disk_size_gb: parse_or(source, "DISK_SIZE_GB", defaults.disk_size_gb)?,
            container_disk_gb: parse_or(source, "CONTAINER_DISK_GB", defaults.container_disk_gb)?,
            base_image: lookup(source, "BASE_IMAGE").unwrap_or(defaults.base_image),
            volume_main: lookup(source, "NETWORK_VOLUME_ID_MAIN").or_else(|| shared_volume.clone()),
            volume_branch: lookup(source, "NETWORK_VOLUME_ID_BRANCH").or(shared_volume),
            inactivity_timeout_secs: parse_or(
                source,
                "INACTIVITY_TIMEOUT_SECONDS",
                defaults.inactivity_timeout_secs,
            )?,
            proxy_port: parse_or(source, "PROXY_PORT", defaults.proxy_port)?,
            poll_interval: secs_or(source, "POLL_INTERVAL_SECS", defaults.poll_interval)?,
            start_timeout: secs_or(source, "START_TIMEOUT_SECS", defaults.start_timeout)?,
            stop_timeout: secs_or(source, "STOP_TIMEOUT_SECS", defaults.stop_timeout)?,
            restart_settle: secs_or(source, "RESTART_SETTLE_SECS", defaults.restart_settle)?,
            health_interval: secs_or(source, "HEALTH_INTERVAL_SECS", defaults.health_interval)?,
            min_gpu_memory_gb: lookup(source, "MIN_GPU_MEMORY_GB")
                .map(|v| parse_value("MIN_GPU_MEMORY_GB", &v))
                .transpose()?,
            rest_url: lookup(source, "RUNPOD_REST_URL").unwrap_or(defaults.rest_url),
            graphql_url: lookup(source, "RUNPOD_GRAPHQL_URL").unwrap_or(defaults.graphql_url),
            api_key: defaults.api_key,
        })
    }

    /// Network volume configured for a role
    pub fn volume_for(&self, role: PodRole) -> Option<&str> {
        match role {
            PodRole::Main => self.volume_main.as_deref(),
            PodRole::Branch => self.volume_branch.as_deref(),
        }
    }

    /// Environment handed to the deployed workload
    pub fn workload_env(&self, role: PodRole) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "INACTIVITY_TIMEOUT_SECONDS".to_string(),
                self.inactivity_timeout_secs.to_string(),
            ),
            ("POD_ROLE".to_string(), role.to_string()),
            ("PORT".to_string(), self.proxy_port.to_string()),
        ])
    }

    /// Set the spot price ceiling
    pub fn with_max_price(mut self, price: Decimal) -> Self {
        self.max_price = price;
        self
    }

    /// Set the status poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set both wait bounds
    pub fn with_timeouts(mut self, start: Duration, stop: Duration) -> Self {
        self.start_timeout = start;
        self.stop_timeout = stop;
        self
    }

    /// Set the restart settle delay
    pub fn with_restart_settle(mut self, settle: Duration) -> Self {
        self.restart_settle = settle;
        self
    }

    /// Set the health probe interval
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

}

/// Parse an env file without touching the process environment
fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    debug!(path = %path.display(), "Reading env file");

    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        OrchestratorError::config(format!("failed to read {}: {}", path.display(), e))
    })?;

    let mut values = BTreeMap::new();
    for entry in iter {
        let (key, value) = entry.map_err(|e| {
            OrchestratorError::config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        values.insert(key, value);
    }

    Ok(values)
}

/// Non-empty, trimmed value for a key
fn lookup(source: &BTreeMap<String, String>, key: &str) -> Option<String> {
    source
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| OrchestratorError::config(format!("invalid {} '{}': {}", key, raw, e)))
}

fn parse_or<T>(source: &BTreeMap<String, String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(source, key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn secs_or(source: &BTreeMap<String, String>, key: &str, default: Duration) -> Result<Duration> {
    parse_or(source, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = Config::from_source(&source(&[("MAX_GPU_PRICE", "0.3")])).unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));

        let err = Config::from_source(&source(&[("RUNPOD_API_KEY", "  ")])).unwrap_err();
        assert!(err.to_string().contains("RUNPOD_API_KEY"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_source(&source(&[("RUNPOD_API_KEY", "rp_test")])).unwrap();

        assert_eq!(config.api_key, "rp_test");
        assert_eq!(config.app_name, "ashoka");
        assert_eq!(config.max_price, Decimal::new(50, 2));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.proxy_port, 5000);
        assert_eq!(config.volume_for(PodRole::Main), None);
        assert_eq!(config.rest_url, DEFAULT_REST_URL);
    }

    #[test]
    fn test_overrides_and_volume_fallback() {
        let config = Config::from_source(&source(&[
            ("RUNPOD_API_KEY", "rp_test"),
            ("MAX_GPU_PRICE", "0.30"),
            ("POLL_INTERVAL_SECS", "2"),
            ("NETWORK_VOLUME_ID", "vol-shared"),
            ("NETWORK_VOLUME_ID_BRANCH", "vol-branch"),
            ("MIN_GPU_MEMORY_GB", "24"),
        ]))
        .unwrap();

        assert_eq!(config.max_price, Decimal::new(30, 2));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.volume_for(PodRole::Main), Some("vol-shared"));
        assert_eq!(config.volume_for(PodRole::Branch), Some("vol-branch"));
        assert_eq!(config.min_gpu_memory_gb, Some(24));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = Config::from_source(&source(&[
            ("RUNPOD_API_KEY", "rp_test"),
            ("DISK_SIZE_GB", "lots"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("DISK_SIZE_GB"));
    }

    #[test]
    fn test_env_file_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# pod settings").unwrap();
        writeln!(file, "MAX_GPU_PRICE=0.25").unwrap();
        writeln!(file, "BASE_IMAGE=ghcr.io/example/ashoka:latest").unwrap();
        writeln!(file).unwrap();

        let values = read_env_file(file.path()).unwrap();
        assert_eq!(values["MAX_GPU_PRICE"], "0.25");
        assert_eq!(values["BASE_IMAGE"], "ghcr.io/example/ashoka:latest");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_env_file_quotes_and_export() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "export PODCTL_APP_NAME=\"ashoka dev\"").unwrap();
        writeln!(file, "PODCTL_ENV_FILE_ONLY_KEY='kept out of the environment'").unwrap();

        let values = read_env_file(file.path()).unwrap();
        assert_eq!(values["PODCTL_APP_NAME"], "ashoka dev");
        assert_eq!(values["PODCTL_ENV_FILE_ONLY_KEY"], "kept out of the environment");
        assert!(std::env::var("PODCTL_ENV_FILE_ONLY_KEY").is_err());
    }

    #[test]
    fn test_explicit_env_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.env");
        assert!(read_env_file(&missing).is_err());
    }

    #[test]
    fn test_workload_env() {
        let config = Config::new("rp_test");
        let env = config.workload_env(PodRole::Branch);
        assert_eq!(env["INACTIVITY_TIMEOUT_SECONDS"], "1800");
        assert_eq!(env["POD_ROLE"], "branch");
        assert_eq!(env["PORT"], "5000");
    }
}
