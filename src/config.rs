use std::{fs, path::Path, path::PathBuf};

use serde::Deserialize;

use crate::{PodflowError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// root directory for persisted connections, one sub-directory per canvas
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// number of async worker threads, range [1, 32768), defaults to 4
    #[serde(default = "default_worker_threads")]
    pub async_worker_thread_number: u16,
    /// fan-in aggregation config
    #[serde(default)]
    pub aggregate: AggregateConfig,
    /// event channel config
    #[serde(default)]
    pub channel: ChannelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregateConfig {
    /// countdown window in milliseconds, reset on every arrival
    #[serde(default = "default_direct_window_ms")]
    pub direct_window_ms: u64,
    /// how long in milliseconds after the last arrival a caller waits for a countdown flush
    #[serde(default = "default_direct_safety_timeout_ms")]
    pub direct_safety_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// capacity of the broadcast event queue
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_worker_threads() -> u16 {
    4
}

fn default_direct_window_ms() -> u64 {
    10_000
}

fn default_direct_safety_timeout_ms() -> u64 {
    30_000
}

fn default_event_queue_size() -> usize {
    2048
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            direct_window_ms: default_direct_window_ms(),
            direct_safety_timeout_ms: default_direct_safety_timeout_ms(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            event_queue_size: default_event_queue_size(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            async_worker_thread_number: default_worker_threads(),
            aggregate: AggregateConfig::default(),
            channel: ChannelConfig::default(),
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| PodflowError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.async_worker_thread_number == 0 {
            return Err(PodflowError::Config("async_worker_thread_number must be at least 1".to_string()));
        }
        if self.aggregate.direct_window_ms == 0 {
            return Err(PodflowError::Config("direct_window_ms must be positive".to_string()));
        }
        if self.aggregate.direct_safety_timeout_ms <= self.aggregate.direct_window_ms {
            return Err(PodflowError::Config("direct_safety_timeout_ms must be longer than direct_window_ms".to_string()));
        }
        Ok(())
    }
}
