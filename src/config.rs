use std::time::Duration;

use anyhow::Result;
use figment::{
    providers::{Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Tuning for per-instance update engines, shared by every instance of a
/// job update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Instance failures to absorb before an update is declared failed.
    /// The failure after the last tolerated one trips the update.
    pub tolerated_failures: u32,
    /// How long a task must stay in `Running` before it counts as stable.
    pub min_running_time_ms: u64,
    /// How long a task may sit outside `Running` without terminating
    /// before it counts as stuck.
    pub max_non_running_time_ms: u64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        UpdaterConfig {
            tolerated_failures: 0,
            min_running_time_ms: 45_000,
            max_non_running_time_ms: 300_000,
        }
    }
}

impl UpdaterConfig {
    pub fn from_path(path: &str) -> Result<UpdaterConfig> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<UpdaterConfig> {
        let config: UpdaterConfig = Figment::from(Serialized::defaults(UpdaterConfig::default()))
            .merge(Yaml::string(config_str))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_non_running_time_ms < self.min_running_time_ms {
            return Err(anyhow::anyhow!(
                "max_non_running_time_ms ({}) must not be below min_running_time_ms ({})",
                self.max_non_running_time_ms,
                self.min_running_time_ms
            ));
        }
        Ok(())
    }

    pub fn min_running_time(&self) -> Duration {
        Duration::from_millis(self.min_running_time_ms)
    }

    pub fn max_non_running_time(&self) -> Duration {
        Duration::from_millis(self.max_non_running_time_ms)
    }
}
