use crate::config::LaunchSpec;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};
use tunguard_types::{TunguardError, TunguardResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM
    Graceful,
    /// SIGKILL
    Forceful,
}

/// OS process operations the supervisor depends on.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Non-blocking existence probe. A process we may not signal still counts.
    fn is_alive(&self, pid: u32) -> bool;

    /// First live process whose command line matches `spec`.
    async fn find_by_signature(&self, spec: &LaunchSpec) -> Option<u32>;

    /// Starts `spec` as the leader of a new process group and returns its pid.
    async fn spawn_group_leader(&self, spec: &LaunchSpec) -> TunguardResult<u32>;

    /// Signals the process group led by `pid`, then `pid` itself.
    fn signal_tree(&self, pid: u32, signal: StopSignal) -> TunguardResult<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProcesses;

impl SystemProcesses {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessControl for SystemProcesses {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 1 {
            return false;
        }
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }

    async fn find_by_signature(&self, spec: &LaunchSpec) -> Option<u32> {
        let spec = spec.clone();
        let own_pid = std::process::id();

        let found = tokio::task::spawn_blocking(move || {
            let mut system = sysinfo::System::new();
            system.refresh_processes();

            let mut matches: Vec<u32> = system
                .processes()
                .iter()
                .filter(|(_, process)| spec.matches(process.cmd()))
                .map(|(pid, _)| pid.as_u32())
                .filter(|pid| *pid > 1 && *pid != own_pid)
                .collect();
            matches.sort_unstable();
            matches
        })
        .await;

        match found {
            Ok(pids) => {
                debug!("processes matching tunnel signature: {:?}", pids);
                pids.into_iter().find(|pid| self.is_alive(*pid))
            }
            Err(e) => {
                warn!("process scan failed: {}", e);
                None
            }
        }
    }

    async fn spawn_group_leader(&self, spec: &LaunchSpec) -> TunguardResult<u32> {
        let (stdout, stderr) = match &spec.log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        TunguardError::Process(format!(
                            "Failed to open tunnel log file {:?}: {}",
                            path, e
                        ))
                    })?;
                let dup = file.try_clone().map_err(|e| {
                    TunguardError::Process(format!("Failed to share tunnel log file: {}", e))
                })?;
                (Stdio::from(file), Stdio::from(dup))
            }
            None => (Stdio::null(), Stdio::null()),
        };

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            TunguardError::Process(format!("Failed to start {}: {}", spec.display(), e))
        })?;
        let pid = child.id().ok_or_else(|| {
            TunguardError::Process("tunnel process exited before reporting a pid".into())
        })?;

        info!("Started tunnel process pid={}: {}", pid, spec.display());

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!("tunnel process {} exited: {}", pid, status),
                Err(e) => debug!("wait on tunnel process {} failed: {}", pid, e),
            }
        });

        Ok(pid)
    }

    #[cfg(unix)]
    fn signal_tree(&self, pid: u32, signal: StopSignal) -> TunguardResult<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 1)
            .ok_or_else(|| TunguardError::Process(format!("refusing to signal pid {}", pid)))?;
        let sig = match signal {
            StopSignal::Graceful => Signal::SIGTERM,
            StopSignal::Forceful => Signal::SIGKILL,
        };

        let group = killpg(Pid::from_raw(raw), sig);
        let single = kill(Pid::from_raw(raw), sig);
        debug!("{:?} pid={} group={:?} single={:?}", sig, pid, group, single);

        match (group, single) {
            (Err(Errno::EPERM), Err(Errno::EPERM)) => Err(TunguardError::Process(format!(
                "not permitted to signal pid {}",
                pid
            ))),
            _ => Ok(()),
        }
    }

    #[cfg(not(unix))]
    fn signal_tree(&self, pid: u32, _signal: StopSignal) -> TunguardResult<()> {
        Err(TunguardError::Process(format!(
            "signaling pid {} is not supported on this platform",
            pid
        )))
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_own_process_is_alive() {
        let procs = SystemProcesses::new();
        assert!(procs.is_alive(std::process::id()));
        assert!(!procs.is_alive(0));
        assert!(!procs.is_alive(1));
    }

    #[test]
    fn test_refuses_to_signal_init() {
        let procs = SystemProcesses::new();
        assert!(procs.signal_tree(1, StopSignal::Graceful).is_err());
    }

    #[tokio::test]
    async fn test_spawn_and_kill_group() {
        let dir = tempfile::TempDir::new().unwrap();
        let spec = LaunchSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), "echo tunnel-up; exec sleep 30".into()],
            log_file: Some(dir.path().join("tunnel.log")),
        };
        let procs = SystemProcesses::new();
        let pid = procs.spawn_group_leader(&spec).await.unwrap();
        assert!(procs.is_alive(pid));

        let log_path = dir.path().join("tunnel.log");
        for _ in 0..40 {
            let log = std::fs::read_to_string(&log_path).unwrap_or_default();
            if log.contains("tunnel-up") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        procs.signal_tree(pid, StopSignal::Forceful).unwrap();
        let mut gone = false;
        for _ in 0..40 {
            if !procs.is_alive(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone);

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("tunnel-up"));
    }
}
