use serde::{Deserialize, Serialize};
use std::time::Duration;
use tunguard_types::DEFAULT_HEALTH_URL;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub health_url: String,
    pub check_interval_secs: u64,
    pub health_timeout_secs: u64,
    pub failure_threshold: u32,
    pub recover_cooldown_secs: u64,
    pub max_recoveries: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            health_url: DEFAULT_HEALTH_URL.to_string(),
            check_interval_secs: 10,
            health_timeout_secs: 5,
            failure_threshold: 3,
            recover_cooldown_secs: 5,
            max_recoveries: 5,
        }
    }
}

impl WatchdogConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn recover_cooldown(&self) -> Duration {
        Duration::from_secs(self.recover_cooldown_secs)
    }
}
