use super::types::TriState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tunguard_tunnel::config::DEFAULT_TUNNEL_BINARY;
use tunguard_tunnel::{TunnelSettings, DEFAULT_INTERFACE_PREFIX};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    pub binary: PathBuf,

    /// The tunnel program's own JSON config, passed as `run -c <path>`.
    pub config_path: Option<PathBuf>,

    pub extra_args: Vec<String>,

    pub auto_start: bool,

    /// Unset means adopt.
    pub adopt_external: TriState,

    pub start_timeout_secs: u64,

    pub stop_timeout_secs: u64,

    pub pid_file: PathBuf,

    /// Tunnel stdout/stderr are appended here; discarded when unset.
    pub log_file: Option<PathBuf>,

    pub interface_prefix: String,

    /// Pins the interface name instead of reading it from the tunnel config.
    pub interface_name: Option<String>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        let state_dir = default_state_dir();
        Self {
            binary: PathBuf::from(DEFAULT_TUNNEL_BINARY),
            config_path: None,
            extra_args: Vec::new(),
            auto_start: true,
            adopt_external: TriState::Unset,
            start_timeout_secs: 8,
            stop_timeout_secs: 8,
            pid_file: state_dir.join("tunnel.pid"),
            log_file: Some(state_dir.join("tunnel.log")),
            interface_prefix: DEFAULT_INTERFACE_PREFIX.to_string(),
            interface_name: None,
        }
    }
}

impl TunnelConfig {
    pub fn adopt_external(&self) -> bool {
        self.adopt_external.resolve(true)
    }

    pub fn has_config_path(&self) -> bool {
        self.config_path
            .as_ref()
            .map(|p| !p.as_os_str().is_empty())
            .unwrap_or(false)
    }

    pub fn settings(&self) -> TunnelSettings {
        let mut settings = TunnelSettings::default()
            .with_binary(self.binary.clone())
            .with_pid_file(self.pid_file.clone())
            .with_adopt_external(self.adopt_external())
            .with_interface_name(self.interface_name.clone())
            .with_timeouts(
                Duration::from_secs(self.start_timeout_secs),
                Duration::from_secs(self.stop_timeout_secs),
            );
        if let Some(path) = &self.config_path {
            settings = settings.with_config_path(path.clone());
        }
        settings.extra_args = self.extra_args.clone();
        settings.log_file = self.log_file.clone();
        settings.interface_prefix = self.interface_prefix.clone();
        settings
    }
}

pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join(".tunguard")
}
