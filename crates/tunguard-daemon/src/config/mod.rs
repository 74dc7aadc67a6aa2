mod daemon;
mod network;
mod scripts;
mod tunnel;
mod types;
mod watchdog;

pub use daemon::{executable_file, DaemonConfig, ENV_HEALTH_URL, ENV_LAN_IF, ENV_WAN_IF};
pub use network::NetworkConfig;
pub use scripts::{ScriptsConfig, DEFAULT_COMMAND_TIMEOUT_SECS};
pub use tunnel::{default_state_dir, TunnelConfig};
pub use types::TriState;
pub use watchdog::WatchdogConfig;
