use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use tunguard_types::{TunguardError, TunguardResult};

use super::network::NetworkConfig;
use super::scripts::ScriptsConfig;
use super::tunnel::{default_state_dir, TunnelConfig};
use super::watchdog::WatchdogConfig;

pub const ENV_WAN_IF: &str = "TUNGUARD_WAN_IF";
pub const ENV_LAN_IF: &str = "TUNGUARD_LAN_IF";
pub const ENV_HEALTH_URL: &str = "TUNGUARD_HEALTH_URL";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub network: NetworkConfig,
    pub scripts: ScriptsConfig,
    pub tunnel: TunnelConfig,
    pub watchdog: WatchdogConfig,
}

impl DaemonConfig {
    pub fn default_path() -> PathBuf {
        default_state_dir().join("config.toml")
    }

    /// Parse, apply environment overrides, validate.
    pub fn load(path: impl AsRef<Path>) -> TunguardResult<Self> {
        let config = Self::load_unvalidated(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and apply environment overrides only. Used by read-only commands
    /// that report problems instead of refusing to run.
    pub fn load_unvalidated(path: impl AsRef<Path>) -> TunguardResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| TunguardError::Config(format!("Failed to read config {:?}: {}", path, e)))?;

            toml::from_str(&contents)
                .map_err(|e| TunguardError::Config(format!("Failed to parse config {:?}: {}", path, e)))?
        } else {
            info!("Config file {:?} not found, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(wan) = lookup(ENV_WAN_IF).filter(|v| !v.trim().is_empty()) {
            self.network.wan_interface = Some(wan.trim().to_string());
        }

        if let Some(lan) = lookup(ENV_LAN_IF).filter(|v| !v.trim().is_empty()) {
            self.network.lan_interface = Some(lan.trim().to_string());
        }

        if let Some(url) = lookup(ENV_HEALTH_URL).filter(|v| !v.trim().is_empty()) {
            self.watchdog.health_url = url.trim().to_string();
        }
    }

    /// Every problem found, joined into a single error.
    pub fn validate(&self) -> TunguardResult<()> {
        let problems = self.problems();
        if problems.is_empty() {
            return Ok(());
        }
        Err(TunguardError::Config(format!(
            "config invalid: {}",
            problems.join("; ")
        )))
    }

    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let tunnel = &self.tunnel;

        if tunnel.auto_start {
            if tunnel.binary.as_os_str().is_empty() {
                problems.push("tunnel.binary is required when tunnel.auto_start = true".to_string());
            }
            if !tunnel.has_config_path() {
                problems.push("tunnel.config_path is required when tunnel.auto_start = true".to_string());
            }
            if tunnel.start_timeout_secs < 1 {
                problems.push("tunnel.start_timeout_secs must be >= 1".to_string());
            }
        }
        if tunnel.adopt_external() && !tunnel.has_config_path() && !tunnel.auto_start {
            problems.push(
                "tunnel.config_path is required when tunnel.adopt_external is on (needed to recognize a running tunnel)"
                    .to_string(),
            );
        }
        if tunnel.interface_prefix.trim().is_empty() {
            problems.push("tunnel.interface_prefix must not be empty".to_string());
        }

        check_script("scripts.setup", &self.scripts.setup, &mut problems);
        check_script("scripts.policy_apply", &self.scripts.policy_apply, &mut problems);

        if self.scripts.command_timeout_secs < 1 {
            problems.push("scripts.command_timeout_secs must be >= 1".to_string());
        }
        if self.watchdog.check_interval_secs < 1 {
            problems.push("watchdog.check_interval_secs must be >= 1".to_string());
        }
        if self.watchdog.failure_threshold < 1 {
            problems.push("watchdog.failure_threshold must be >= 1".to_string());
        }
        if self.watchdog.health_url.trim().is_empty() {
            problems.push("watchdog.health_url is required".to_string());
        }

        problems
    }
}

fn check_script(key: &str, path: &Path, problems: &mut Vec<String>) {
    if path.as_os_str().is_empty() {
        problems.push(format!("{} is required", key));
    } else if let Err(e) = executable_file(path) {
        problems.push(format!("{} invalid: {}", key, e));
    }
}

/// The path exists, is a regular file and carries at least one execute bit.
pub fn executable_file(path: &Path) -> Result<(), String> {
    let meta = std::fs::metadata(path).map_err(|e| format!("{:?} not accessible: {}", path, e))?;
    if meta.is_dir() {
        return Err(format!("{:?} is a directory (expected a file)", path));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(format!(
                "{:?} is not executable (run: chmod +x {})",
                path,
                path.display()
            ));
        }
    }

    Ok(())
}
