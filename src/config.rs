use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{CrewGraphError, Result, graph::LayoutOptions};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// external api config
    #[serde(default)]
    pub api: ApiConfig,
    /// polling intervals and limits
    #[serde(default)]
    pub polling: PollingConfig,
    /// layout engine options
    #[serde(default)]
    pub layout: LayoutOptions,
    /// run activity detection
    #[serde(default)]
    pub activity: ActivityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// base url of the workflow api, eg. http://localhost:8000
    pub base_url: String,
    /// request timeout in milliseconds, defaults to 10000
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// agent/task list refresh interval in milliseconds, defaults to 5000
    pub data_interval_ms: u64,
    /// run status poll interval in milliseconds, defaults to 2000
    pub run_interval_ms: u64,
    /// stop watching a run after this many polls, defaults to 60, 0 means no limit
    pub max_run_polls: u32,
    /// consecutive poll failures before the user is told, defaults to 3
    pub poll_error_threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// number of trailing log lines inspected for active nodes, defaults to 15
    pub log_window: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            data_interval_ms: 5_000,
            run_interval_ms: 2_000,
            max_run_polls: 60,
            poll_error_threshold: 3,
        }
    }
}

impl PollingConfig {
    pub fn data_interval(&self) -> Duration {
        Duration::from_millis(self.data_interval_ms)
    }

    pub fn run_interval(&self) -> Duration {
        Duration::from_millis(self.run_interval_ms)
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            log_window: 15,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| CrewGraphError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        if config.polling.run_interval_ms == 0 || config.polling.data_interval_ms == 0 {
            return Err(CrewGraphError::Config("polling intervals must be greater than zero".to_string()));
        }
        if config.polling.poll_error_threshold == 0 {
            return Err(CrewGraphError::Config("poll_error_threshold must be greater than zero".to_string()));
        }
        if config.activity.log_window == 0 {
            return Err(CrewGraphError::Config("activity log_window must be greater than zero".to_string()));
        }
        Ok(config)
    }
}
