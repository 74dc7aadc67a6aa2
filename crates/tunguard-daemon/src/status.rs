use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tunguard_tunnel::{probe, CommandRunner, InterfaceInfo, ProcessSupervisor};
use tunguard_types::{CommandResult, HealthResult, ProcessStatus, TunguardResult};

use crate::config::DaemonConfig;

const PFCTL: &str = "/sbin/pfctl";

/// What `pfctl -s info` says. Read-only; failures are reported, not raised.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PacketFilterStatus {
    pub enabled: bool,
    pub info: String,
    pub error: Option<String>,
}

impl PacketFilterStatus {
    pub async fn collect(runner: &CommandRunner, timeout: Duration) -> Self {
        let args = ["-s".to_string(), "info".to_string()];
        Self::from_result(runner.run(Path::new(PFCTL), timeout, &args).await)
    }

    fn from_result(result: TunguardResult<CommandResult>) -> Self {
        match result {
            Ok(output) => Self {
                enabled: reports_enabled(&output.stdout),
                info: output.stdout,
                error: None,
            },
            Err(e) => {
                let (info, error) = match e.command_output() {
                    Some(output) if !output.stderr.is_empty() => {
                        (output.stdout.clone(), output.stderr.clone())
                    }
                    Some(output) => (output.stdout.clone(), e.to_string()),
                    None => (String::new(), e.to_string()),
                };
                Self {
                    enabled: false,
                    info,
                    error: Some(error),
                }
            }
        }
    }
}

fn reports_enabled(info: &str) -> bool {
    info.lines()
        .filter_map(|line| line.trim().strip_prefix("Status:"))
        .any(|rest| rest.split_whitespace().next() == Some("Enabled"))
}

/// Point-in-time view combining ownership, external processes, interfaces,
/// packet filter state and one plain health probe.
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub time_utc: DateTime<Utc>,
    pub config_path: PathBuf,
    pub owned: ProcessStatus,
    pub external: ProcessStatus,
    pub interfaces: Vec<InterfaceInfo>,
    pub interface_error: Option<String>,
    pub packet_filter: PacketFilterStatus,
    pub health: HealthResult,
}

impl StatusSnapshot {
    pub async fn collect(
        config: &DaemonConfig,
        config_path: &Path,
        supervisor: &ProcessSupervisor,
        runner: &CommandRunner,
        health_timeout: Duration,
    ) -> Self {
        let owned = supervisor.inspect();
        let external = supervisor.inspect_external().await;

        let (interfaces, interface_error) = match supervisor.interfaces().snapshot() {
            Ok(snapshot) => (snapshot.interfaces().cloned().collect(), None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        let packet_filter =
            PacketFilterStatus::collect(runner, config.scripts.command_timeout()).await;

        let health = probe::check(&config.watchdog.health_url, health_timeout, &[]).await;

        Self {
            time_utc: Utc::now(),
            config_path: config_path.to_path_buf(),
            owned,
            external,
            interfaces,
            interface_error,
            packet_filter,
            health,
        }
    }

    /// The external match is only interesting when it is not our own process.
    pub fn has_foreign_tunnel(&self) -> bool {
        self.external.running && !(self.owned.running && self.owned.pid == self.external.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(owned: ProcessStatus, external: ProcessStatus) -> StatusSnapshot {
        StatusSnapshot {
            time_utc: Utc::now(),
            config_path: PathBuf::from("/root/.tunguard/config.toml"),
            owned,
            external,
            interfaces: vec![InterfaceInfo::new("utun7", vec!["172.19.0.1".parse().unwrap()])],
            interface_error: None,
            packet_filter: PacketFilterStatus::default(),
            health: HealthResult::failed("https://api.ipify.org?format=text", "timeout"),
        }
    }

    #[test]
    fn test_foreign_tunnel_detection() {
        let ours = ProcessStatus {
            running: true,
            pid: 4242,
            owned_by_us: true,
            interface_name: None,
        };
        let same = ProcessStatus {
            running: true,
            pid: 4242,
            owned_by_us: false,
            interface_name: None,
        };
        let other = ProcessStatus {
            pid: 777,
            ..same.clone()
        };

        assert!(!snapshot(ours.clone(), same).has_foreign_tunnel());
        assert!(snapshot(ours, other.clone()).has_foreign_tunnel());
        assert!(snapshot(ProcessStatus::not_running(), other).has_foreign_tunnel());
        assert!(!snapshot(ProcessStatus::not_running(), ProcessStatus::not_running()).has_foreign_tunnel());
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(snapshot(
            ProcessStatus::not_running(),
            ProcessStatus::not_running(),
        ))
        .unwrap();
        assert_eq!(json["interfaces"][0]["name"], "utun7");
        assert_eq!(json["health"]["ok"], false);
        assert_eq!(json["packet_filter"]["enabled"], false);
        assert!(json["time_utc"].is_string());
    }

    #[test]
    fn test_packet_filter_enabled_line() {
        let info = "Status: Enabled for 0 days 02:13:44           Debug: Urgent\n\nState Table                          Total             Rate";
        let pf = PacketFilterStatus::from_result(Ok(CommandResult::new(0, info, "")));
        assert!(pf.enabled);
        assert_eq!(pf.info, info);
        assert_eq!(pf.error, None);

        let off = PacketFilterStatus::from_result(Ok(CommandResult::new(
            0,
            "Status: Disabled                              Debug: Urgent",
            "",
        )));
        assert!(!off.enabled);
    }

    #[test]
    fn test_packet_filter_failure_is_reported() {
        let err = tunguard_types::TunguardError::CommandFailed {
            path: PFCTL.to_string(),
            output: CommandResult::new(1, "", "pfctl: /dev/pf: Permission denied"),
        };
        let pf = PacketFilterStatus::from_result(Err(err));
        assert!(!pf.enabled);
        assert_eq!(pf.error.as_deref(), Some("pfctl: /dev/pf: Permission denied"));

        let spawn = tunguard_types::TunguardError::CommandSpawn {
            path: PFCTL.to_string(),
            reason: "No such file or directory".into(),
        };
        let pf = PacketFilterStatus::from_result(Err(spawn));
        assert!(pf.info.is_empty());
        assert!(pf.error.unwrap().contains("No such file"));
    }
}
