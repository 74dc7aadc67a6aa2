use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TUNNEL_BINARY: &str = "/usr/local/bin/sing-box";

#[cfg(target_os = "macos")]
pub const DEFAULT_INTERFACE_PREFIX: &str = "utun";
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_INTERFACE_PREFIX: &str = "tun";

/// Everything the supervisor needs to find, start and stop the tunnel process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TunnelSettings {
    pub binary: PathBuf,

    pub config_path: PathBuf,

    pub extra_args: Vec<String>,

    pub adopt_external: bool,

    pub start_timeout: Duration,

    pub stop_timeout: Duration,

    pub pid_file: PathBuf,

    pub log_file: Option<PathBuf>,

    pub interface_prefix: String,

    pub interface_name: Option<String>,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        let state_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tunguard");

        Self {
            binary: PathBuf::from(DEFAULT_TUNNEL_BINARY),
            config_path: state_dir.join("sing-box.json"),
            extra_args: Vec::new(),
            adopt_external: true,
            start_timeout: Duration::from_secs(8),
            stop_timeout: Duration::from_secs(8),
            pid_file: state_dir.join("tunnel.pid"),
            log_file: None,
            interface_prefix: DEFAULT_INTERFACE_PREFIX.to_string(),
            interface_name: None,
        }
    }
}

impl TunnelSettings {
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = path.into();
        self
    }

    pub fn with_adopt_external(mut self, adopt: bool) -> Self {
        self.adopt_external = adopt;
        self
    }

    pub fn with_interface_name(mut self, name: Option<String>) -> Self {
        self.interface_name = name.filter(|n| !n.is_empty());
        self
    }

    pub fn with_timeouts(mut self, start: Duration, stop: Duration) -> Self {
        self.start_timeout = start;
        self.stop_timeout = stop;
        self
    }

    /// The pinned interface: explicit setting first, then the tunnel's own config.
    pub fn preferred_interface(&self) -> Option<String> {
        self.interface_name
            .clone()
            .or_else(|| pinned_interface_from_config(&self.config_path))
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        let mut args = vec![
            "run".to_string(),
            "-c".to_string(),
            self.config_path.display().to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());

        LaunchSpec {
            program: self.binary.clone(),
            args,
            log_file: self.log_file.clone(),
        }
    }
}

/// How the tunnel is launched, and how a running instance is recognized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub log_file: Option<PathBuf>,
}

impl LaunchSpec {
    /// A command line matches when its program has the same file name and the
    /// launch arguments appear in it contiguously.
    pub fn matches(&self, cmdline: &[String]) -> bool {
        let Some((argv0, rest)) = cmdline.split_first() else {
            return false;
        };
        let Some(expected) = self.program.file_name() else {
            return false;
        };
        if Path::new(argv0).file_name() != Some(expected) {
            return false;
        }

        let needle = self.signature_args();
        if needle.is_empty() {
            return true;
        }
        rest.windows(needle.len()).any(|w| w == needle)
    }

    /// `run -c <config>`; extra arguments do not take part in matching.
    fn signature_args(&self) -> &[String] {
        &self.args[..self.args.len().min(3)]
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[derive(Deserialize)]
struct TunnelConfigFile {
    #[serde(default)]
    inbounds: Vec<serde_json::Value>,
}

/// Reads the interface name pinned by the tunnel's JSON config, if any.
///
/// The first inbound of type `tun` with a non-empty `interface_name` wins.
/// Unreadable or malformed files yield `None`.
pub fn pinned_interface_from_config(path: &Path) -> Option<String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("tunnel config {:?} not readable: {}", path, e);
            return None;
        }
    };
    pinned_interface_from_json(&raw)
}

fn pinned_interface_from_json(raw: &str) -> Option<String> {
    let parsed: TunnelConfigFile = serde_json::from_str(raw).ok()?;
    parsed.inbounds.iter().find_map(|inbound| {
        if inbound.get("type").and_then(|t| t.as_str()) != Some("tun") {
            return None;
        }
        inbound
            .get("interface_name")
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    })
}
