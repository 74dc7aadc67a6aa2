#![forbid(unsafe_code)]
#![warn(clippy::all)]

mod error;

pub use error::{TunguardError, TunguardResult};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code reported when a command could not be started or was killed by a signal.
pub const EXIT_CODE_UNAVAILABLE: i32 = -1;

pub const HEALTH_BODY_LIMIT: usize = 4 * 1024;

pub const DEFAULT_HEALTH_URL: &str = "https://api.ipify.org?format=text";

pub const INTERFACE_POLL_INTERVAL_MS: u64 = 200;

pub const STOP_POLL_INTERVAL_MS: u64 = 150;

pub const FORCE_KILL_SETTLE_MS: u64 = 200;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelState {
    NotRunning,
    Owned,
    Adopted,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelState::NotRunning => write!(f, "not-running"),
            TunnelState::Owned => write!(f, "owned"),
            TunnelState::Adopted => write!(f, "adopted"),
        }
    }
}

/// What the supervisor knows about the tunnel process.
///
/// `owned_by_us` mirrors the on-disk ownership record. A running process with
/// `owned_by_us == false` was adopted and is never signaled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub running: bool,
    pub pid: u32,
    pub owned_by_us: bool,
    pub interface_name: Option<String>,
}

impl ProcessStatus {
    pub fn not_running() -> Self {
        Self::default()
    }

    pub fn owned(pid: u32, interface_name: impl Into<String>) -> Self {
        Self {
            running: true,
            pid,
            owned_by_us: true,
            interface_name: Some(interface_name.into()),
        }
    }

    pub fn adopted(pid: u32, interface_name: impl Into<String>) -> Self {
        Self {
            running: true,
            pid,
            owned_by_us: false,
            interface_name: Some(interface_name.into()),
        }
    }

    pub fn state(&self) -> TunnelState {
        match (self.running, self.owned_by_us) {
            (true, true) => TunnelState::Owned,
            (true, false) => TunnelState::Adopted,
            (false, _) => TunnelState::NotRunning,
        }
    }

    /// Running and bound to a known interface.
    pub fn is_usable(&self) -> bool {
        self.running
            && self
                .interface_name
                .as_deref()
                .map(|name| !name.is_empty())
                .unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    pub ok: bool,
    pub url: String,
    pub status_code: u16,
    pub body: String,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl HealthResult {
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            url: url.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
