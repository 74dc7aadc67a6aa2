#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod policy;
pub mod status;
pub mod watchdog;

pub use config::{DaemonConfig, NetworkConfig, ScriptsConfig, TriState, TunnelConfig, WatchdogConfig};
pub use policy::{PolicyApplier, PolicyRequest, PolicyTemplate, ScriptPolicyApplier};
pub use status::{PacketFilterStatus, StatusSnapshot};
pub use watchdog::{RecoveryState, TickOutcome, Watchdog, WatchdogPhase, WatchdogSettings};
