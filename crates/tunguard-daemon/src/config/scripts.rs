use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 20;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Prepares LAN addressing, DNS forwarding and firewall anchors.
    pub setup: PathBuf,

    /// Loads NAT and kill-switch rules for a given tunnel interface.
    pub policy_apply: PathBuf,

    /// Restores the host to its pre-`up` state.
    pub down: PathBuf,

    pub command_timeout_secs: u64,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        let dir = PathBuf::from("/usr/local/libexec/tunguard");
        Self {
            setup: dir.join("setup.sh"),
            policy_apply: dir.join("policy_apply.sh"),
            down: dir.join("down.sh"),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

impl ScriptsConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
