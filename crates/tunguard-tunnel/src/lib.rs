#![warn(clippy::all)]

pub mod command;
pub mod config;
pub mod debug;
pub mod interface;
mod ownership;
pub mod poll;
pub mod probe;
pub mod process;
pub mod supervisor;

pub use command::CommandRunner;
pub use config::{pinned_interface_from_config, LaunchSpec, TunnelSettings, DEFAULT_INTERFACE_PREFIX};
pub use debug::{DebugDump, DEBUG_ENV_VAR};
pub use interface::{
    InterfaceInfo, InterfaceSnapshot, InterfaceSource, InterfaceWatcher, SystemInterfaces,
};
pub use poll::{poll_until, PollSchedule, PollTimeout};
pub use probe::{HealthCheck, HttpHealthProbe};
pub use process::{ProcessControl, StopSignal, SystemProcesses};
pub use supervisor::{ProcessSupervisor, TunnelControl};
