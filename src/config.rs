//! Client configuration
//!
//! Construction-time knobs for [`crate::DataClient`], serde-derived so a
//! deployment can keep them in a YAML file next to its credentials.

use crate::error::Result;
use crate::types::{BackoffType, FilterMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration recognized at client construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Worker-pool size for concurrent fetches
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Retry budget per page (total attempts = `max_retries + 1`)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry delay in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound on a single backoff sleep, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff growth between retries
    #[serde(default)]
    pub backoff: BackoffType,

    /// Bypass the rate limiter entirely (local/testing endpoints)
    #[serde(default = "default_true")]
    pub enable_rate_limit: bool,

    /// Row cap assumed when probing cannot determine one
    #[serde(default = "default_rows_per_call")]
    pub default_rows_per_call: u32,

    /// Frequency cap assumed when no declared rate exists for an endpoint
    #[serde(default = "default_calls_per_window")]
    pub default_calls_per_window: u32,

    /// Rate window length in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Caller-declared frequency caps (calls per window), keyed by endpoint.
    /// Takes precedence over `default_calls_per_window`.
    #[serde(default)]
    pub declared_rates: HashMap<String, u32>,

    /// Parameters some endpoints require even for a minimal probe call,
    /// keyed by endpoint
    #[serde(default)]
    pub probe_params: HashMap<String, FilterMap>,

    /// Retry budget for the probe call itself
    #[serde(default = "default_probe_retries")]
    pub probe_retries: u32,

    /// Optional JSON file persisting probed limits across processes
    #[serde(default)]
    pub limits_cache_path: Option<PathBuf>,
}

fn default_max_workers() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_rows_per_call() -> u32 {
    5000
}

fn default_calls_per_window() -> u32 {
    60
}

fn default_window_seconds() -> u64 {
    60
}

fn default_probe_retries() -> u32 {
    2
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff: BackoffType::default(),
            enable_rate_limit: true,
            default_rows_per_call: default_rows_per_call(),
            default_calls_per_window: default_calls_per_window(),
            window_seconds: default_window_seconds(),
            declared_rates: HashMap::new(),
            probe_params: HashMap::new(),
            probe_retries: default_probe_retries(),
            limits_cache_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Initial retry delay
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Maximum backoff sleep
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Rate window length
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// The frequency cap to assume for an endpoint before the server has
    /// taught us otherwise: declared rate if present, else the default.
    pub fn assumed_calls_per_window(&self, endpoint: &str) -> u32 {
        self.declared_rates
            .get(endpoint)
            .copied()
            .unwrap_or(self.default_calls_per_window)
    }
}
