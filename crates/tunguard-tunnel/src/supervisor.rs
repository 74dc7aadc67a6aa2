use crate::config::TunnelSettings;
use crate::interface::{InterfaceWatcher, SystemInterfaces};
use crate::ownership::PidRecord;
use crate::poll::{poll_until, PollSchedule};
use crate::process::{ProcessControl, StopSignal, SystemProcesses};
use crate::DebugDump;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tunguard_types::{
    ProcessStatus, TunguardError, TunguardResult, FORCE_KILL_SETTLE_MS, STOP_POLL_INTERVAL_MS,
};

/// Exit polling during a stop slows down to this cadence.
const STOP_POLL_MAX_INTERVAL: Duration = Duration::from_secs(1);

/// The tunnel lifecycle as seen by the watchdog and the CLI.
#[async_trait]
pub trait TunnelControl: Send + Sync {
    /// Recorded ownership state, no side effects.
    fn inspect(&self) -> ProcessStatus;

    async fn stop_if_owned(&self) -> TunguardResult<()>;

    async fn ensure_running(&self) -> TunguardResult<ProcessStatus>;
}

/// Arbitrates between an owned, an adopted and a freshly started tunnel.
///
/// Only pids read back from the ownership record, or spawned by this
/// supervisor a moment ago, are ever signaled. An adopted process is
/// reported but never touched.
pub struct ProcessSupervisor {
    settings: TunnelSettings,
    record: PidRecord,
    processes: Arc<dyn ProcessControl>,
    interfaces: InterfaceWatcher,
    debug: DebugDump,
    stop_poll_interval: Duration,
    kill_settle: Duration,
}

impl ProcessSupervisor {
    pub fn new(
        settings: TunnelSettings,
        processes: Arc<dyn ProcessControl>,
        interfaces: InterfaceWatcher,
        debug: DebugDump,
    ) -> Self {
        let record = PidRecord::new(settings.pid_file.clone());
        Self {
            settings,
            record,
            processes,
            interfaces,
            debug,
            stop_poll_interval: Duration::from_millis(STOP_POLL_INTERVAL_MS),
            kill_settle: Duration::from_millis(FORCE_KILL_SETTLE_MS),
        }
    }

    /// Supervisor backed by the live process table and interface list.
    pub fn system(settings: TunnelSettings, debug: DebugDump) -> Self {
        let source = SystemInterfaces::new(settings.interface_prefix.clone())
            .with_pinned(settings.preferred_interface());
        let watcher = InterfaceWatcher::new(Arc::new(source), debug);
        Self::new(settings, Arc::new(SystemProcesses::new()), watcher, debug)
    }

    pub fn interfaces(&self) -> &InterfaceWatcher {
        &self.interfaces
    }

    pub fn inspect(&self) -> ProcessStatus {
        match self.record.read() {
            None => ProcessStatus::not_running(),
            Some(pid) => ProcessStatus {
                running: self.processes.is_alive(pid),
                pid,
                owned_by_us: true,
                interface_name: None,
            },
        }
    }

    /// A live process matching the launch signature, whoever started it.
    pub async fn inspect_external(&self) -> ProcessStatus {
        match self
            .processes
            .find_by_signature(&self.settings.launch_spec())
            .await
        {
            Some(pid) => ProcessStatus {
                running: true,
                pid,
                owned_by_us: false,
                interface_name: None,
            },
            None => ProcessStatus::not_running(),
        }
    }

    pub async fn ensure_running(&self) -> TunguardResult<ProcessStatus> {
        let before = self.interfaces.snapshot()?;
        self.debug.dump("interfaces_before", &before);
        let preferred = self.settings.preferred_interface();
        let timeout = self.settings.start_timeout;

        if let Some(pid) = self.record.read() {
            if self.processes.is_alive(pid) {
                let name = self
                    .interfaces
                    .resolve_current(&before, preferred.as_deref(), timeout)
                    .await
                    .map_err(|e| {
                        warn!("tunnel running (owned pid={}) but no interface: {}", pid, e);
                        e
                    })?;
                return Ok(self.report(ProcessStatus::owned(pid, name)));
            }
            info!("Discarding stale pid record: pid {} is not running", pid);
            if let Err(e) = self.record.clear() {
                warn!("{}", e);
            }
        }

        let spec = self.settings.launch_spec();

        if self.settings.adopt_external {
            if let Some(pid) = self.processes.find_by_signature(&spec).await {
                info!("Adopting running tunnel process pid={}", pid);
                let name = self
                    .interfaces
                    .resolve_current(&before, preferred.as_deref(), timeout)
                    .await
                    .map_err(|e| {
                        warn!("adopted tunnel pid={} but no interface: {}", pid, e);
                        e
                    })?;
                return Ok(self.report(ProcessStatus::adopted(pid, name)));
            }
        }

        let pid = self.processes.spawn_group_leader(&spec).await?;
        if let Err(e) = self.record.write(pid) {
            if let Err(kill_err) = self.processes.signal_tree(pid, StopSignal::Forceful) {
                warn!("failed to kill unrecorded tunnel pid={}: {}", pid, kill_err);
            }
            return Err(e);
        }

        match self
            .interfaces
            .wait_for_ready(&before, preferred.as_deref(), timeout)
            .await
        {
            Ok(name) => Ok(self.report(ProcessStatus::owned(pid, name))),
            Err(e) => {
                warn!("tunnel pid={} started but no interface came up: {}", pid, e);
                if let Err(stop_err) = self.terminate(pid).await {
                    warn!("{}", stop_err);
                }
                if let Err(clear_err) = self.record.clear() {
                    warn!("{}", clear_err);
                }
                Err(e)
            }
        }
    }

    pub async fn stop_if_owned(&self) -> TunguardResult<()> {
        let Some(pid) = self.record.read() else {
            debug!("no pid record at {:?}, nothing to stop", self.record.path());
            return Ok(());
        };

        if !self.processes.is_alive(pid) {
            info!("Recorded tunnel pid {} already gone", pid);
            return self.record.clear();
        }

        let stopped = self.terminate(pid).await;
        let cleared = self.record.clear();
        stopped?;
        cleared
    }

    async fn terminate(&self, pid: u32) -> TunguardResult<()> {
        info!("Stopping tunnel process pid={}", pid);
        if let Err(e) = self.processes.signal_tree(pid, StopSignal::Graceful) {
            warn!("SIGTERM to pid {}: {}", pid, e);
        }

        let schedule = PollSchedule::fixed(self.stop_poll_interval, self.settings.stop_timeout)
            .with_backoff(2, STOP_POLL_MAX_INTERVAL);
        let exited = poll_until(&schedule, || {
            let gone = !self.processes.is_alive(pid);
            async move { gone.then_some(()) }
        })
        .await;
        if exited.is_ok() {
            info!("Tunnel process pid={} exited", pid);
            return Ok(());
        }

        warn!(
            "Tunnel process pid={} still alive after {:?}, sending SIGKILL",
            pid, self.settings.stop_timeout
        );
        if let Err(e) = self.processes.signal_tree(pid, StopSignal::Forceful) {
            warn!("SIGKILL to pid {}: {}", pid, e);
        }
        tokio::time::sleep(self.kill_settle).await;

        if self.processes.is_alive(pid) {
            return Err(TunguardError::ProcessStop(format!(
                "tunnel pid {} survived SIGTERM and SIGKILL",
                pid
            )));
        }
        Ok(())
    }

    fn report(&self, status: ProcessStatus) -> ProcessStatus {
        info!(
            "Tunnel {} pid={} interface={:?}",
            status.state(),
            status.pid,
            status.interface_name
        );
        self.debug.dump("tunnel_status", &status);
        status
    }
}

#[async_trait]
impl TunnelControl for ProcessSupervisor {
    fn inspect(&self) -> ProcessStatus {
        ProcessSupervisor::inspect(self)
    }

    async fn stop_if_owned(&self) -> TunguardResult<()> {
        ProcessSupervisor::stop_if_owned(self).await
    }

    async fn ensure_running(&self) -> TunguardResult<ProcessStatus> {
        ProcessSupervisor::ensure_running(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::testing::{bare, ready, snap, ScriptedInterfaces};
    use crate::interface::InterfaceSnapshot;
    use crate::process::testing::FakeProcesses;
    use tempfile::TempDir;
    use tunguard_types::TunnelState;

    struct Harness {
        _dir: TempDir,
        procs: Arc<FakeProcesses>,
        supervisor: ProcessSupervisor,
    }

    impl Harness {
        fn new(
            procs: FakeProcesses,
            frames: Vec<InterfaceSnapshot>,
            configure: impl FnOnce(TunnelSettings) -> TunnelSettings,
        ) -> Self {
            let dir = TempDir::new().unwrap();
            let settings = configure(
                TunnelSettings::default()
                    .with_config_path(dir.path().join("missing-sb.json"))
                    .with_pid_file(dir.path().join("tunnel.pid"))
                    .with_timeouts(Duration::from_secs(8), Duration::from_secs(3)),
            );
            let procs = Arc::new(procs);
            let watcher = InterfaceWatcher::new(
                Arc::new(ScriptedInterfaces::new(frames)),
                DebugDump::disabled(),
            );
            let supervisor =
                ProcessSupervisor::new(settings, procs.clone(), watcher, DebugDump::disabled());
            Self {
                _dir: dir,
                procs,
                supervisor,
            }
        }

        fn recorded(&self) -> Option<u32> {
            self.supervisor.record.read()
        }
    }

    fn no_adoption(settings: TunnelSettings) -> TunnelSettings {
        settings.with_adopt_external(false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_start_waits_for_new_interface() {
        let h = Harness::new(
            FakeProcesses::new(5000),
            vec![
                snap(vec![ready("utun0", [10, 0, 0, 1])]),
                snap(vec![ready("utun0", [10, 0, 0, 1]), bare("utun7")]),
                snap(vec![ready("utun0", [10, 0, 0, 1]), ready("utun7", [172, 19, 0, 1])]),
            ],
            no_adoption,
        );

        let status = h.supervisor.ensure_running().await.unwrap();
        assert_eq!(status, ProcessStatus::owned(5000, "utun7"));
        assert_eq!(h.recorded(), Some(5000));
        assert_eq!(h.supervisor.inspect().state(), TunnelState::Owned);
    }

    #[tokio::test(start_paused = true)]
    async fn test_owned_process_is_reused() {
        let h = Harness::new(
            FakeProcesses::new(6000).with_alive(4242),
            vec![snap(vec![ready("utun3", [172, 19, 0, 1])])],
            no_adoption,
        );
        h.supervisor.record.write(4242).unwrap();

        let status = h.supervisor.ensure_running().await.unwrap();
        assert_eq!(status, ProcessStatus::owned(4242, "utun3"));
        assert!(h.procs.spawned.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_record_is_replaced() {
        let h = Harness::new(
            FakeProcesses::new(5000),
            vec![
                snap(vec![]),
                snap(vec![ready("utun4", [172, 19, 0, 1])]),
            ],
            |s| s,
        );
        h.supervisor.record.write(999).unwrap();
        assert!(!h.supervisor.inspect().running);

        let status = h.supervisor.ensure_running().await.unwrap();
        assert_eq!(status.pid, 5000);
        assert!(status.owned_by_us);
        assert_eq!(h.recorded(), Some(5000));
        assert!(h.procs.signals.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_record_yields_to_adoption() {
        let h = Harness::new(
            FakeProcesses::new(5000).with_external(777),
            vec![snap(vec![ready("utun4", [172, 19, 0, 1])])],
            |s| s,
        );
        h.supervisor.record.write(999).unwrap();

        let status = h.supervisor.ensure_running().await.unwrap();
        assert_eq!(status, ProcessStatus::adopted(777, "utun4"));
        assert_eq!(h.recorded(), None);
        assert!(!h.supervisor.record.path().exists());
        assert!(h.procs.spawned.lock().is_empty());
        assert!(h.procs.signals.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecordable_spawn_is_killed() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let h = Harness::new(
            FakeProcesses::new(5000),
            vec![snap(vec![]), snap(vec![ready("utun8", [172, 19, 0, 1])])],
            |s| no_adoption(s).with_pid_file(blocker.join("tunnel.pid")),
        );

        let err = h.supervisor.ensure_running().await.unwrap_err();
        assert!(matches!(err, TunguardError::Storage(_)));
        assert_eq!(*h.procs.spawned.lock(), vec![5000]);
        assert_eq!(h.procs.signals_to(5000), vec![StopSignal::Forceful]);
        assert!(!h.procs.is_alive(5000));
        assert_eq!(h.recorded(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adopted_process_is_never_signaled() {
        let h = Harness::new(
            FakeProcesses::new(5000).with_external(777),
            vec![snap(vec![ready("utun2", [172, 19, 0, 1])])],
            |s| s,
        );

        let status = h.supervisor.ensure_running().await.unwrap();
        assert_eq!(status, ProcessStatus::adopted(777, "utun2"));
        assert_eq!(h.recorded(), None);

        h.supervisor.stop_if_owned().await.unwrap();
        assert!(h.procs.signals_to(777).is_empty());
        assert!(h.procs.is_alive(777));
        assert!(h.procs.spawned.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_adoption_disabled_starts_own_process() {
        let h = Harness::new(
            FakeProcesses::new(5000).with_external(777),
            vec![snap(vec![]), snap(vec![ready("utun8", [172, 19, 0, 1])])],
            no_adoption,
        );

        let status = h.supervisor.ensure_running().await.unwrap();
        assert_eq!(status, ProcessStatus::owned(5000, "utun8"));
        assert!(h.procs.signals_to(777).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_failure_reaps_and_clears_record() {
        let h = Harness::new(
            FakeProcesses::new(5000),
            vec![snap(vec![ready("utun0", [10, 0, 0, 1]), bare("utun1")])],
            no_adoption,
        );

        let err = h.supervisor.ensure_running().await.unwrap_err();
        assert!(matches!(err, TunguardError::InterfaceNotReady(_)));
        assert_eq!(h.procs.signals_to(5000), vec![StopSignal::Graceful]);
        assert!(!h.procs.is_alive(5000));
        assert_eq!(h.recorded(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preferred_interface_is_never_substituted() {
        let h = Harness::new(
            FakeProcesses::new(5000),
            vec![
                snap(vec![]),
                snap(vec![ready("utun7", [172, 19, 0, 1]), bare("utun66")]),
            ],
            |s| no_adoption(s).with_interface_name(Some("utun66".into())),
        );

        let err = h.supervisor.ensure_running().await.unwrap_err();
        assert!(matches!(err, TunguardError::InterfaceNotReady(ref msg) if msg.contains("utun66")));
        assert_eq!(h.recorded(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_twice_is_idempotent() {
        let h = Harness::new(FakeProcesses::new(5000).with_alive(4242), vec![], no_adoption);
        h.supervisor.record.write(4242).unwrap();

        h.supervisor.stop_if_owned().await.unwrap();
        h.supervisor.stop_if_owned().await.unwrap();

        assert_eq!(h.procs.signals_to(4242), vec![StopSignal::Graceful]);
        assert_eq!(h.recorded(), None);
        assert_eq!(h.supervisor.inspect(), ProcessStatus::not_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_escalates_to_kill() {
        let h = Harness::new(FakeProcesses::new(5000).with_alive(4242), vec![], no_adoption);
        *h.procs.ignore_graceful.lock() = true;
        h.supervisor.record.write(4242).unwrap();

        h.supervisor.stop_if_owned().await.unwrap();
        assert_eq!(
            h.procs.signals_to(4242),
            vec![StopSignal::Graceful, StopSignal::Forceful]
        );
        assert_eq!(h.recorded(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unkillable_process_reports_error_and_clears_record() {
        let h = Harness::new(FakeProcesses::new(5000).with_alive(4242), vec![], no_adoption);
        *h.procs.ignore_graceful.lock() = true;
        *h.procs.unkillable.lock() = true;
        h.supervisor.record.write(4242).unwrap();

        let err = h.supervisor.stop_if_owned().await.unwrap_err();
        assert!(matches!(err, TunguardError::ProcessStop(_)));
        assert_eq!(h.recorded(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_recorded_process_is_cleared_without_signals() {
        let h = Harness::new(FakeProcesses::new(5000), vec![], no_adoption);
        h.supervisor.record.write(4242).unwrap();

        h.supervisor.stop_if_owned().await.unwrap();
        assert!(h.procs.signals.lock().is_empty());
        assert_eq!(h.recorded(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inspect_external() {
        let h = Harness::new(FakeProcesses::new(5000).with_external(777), vec![], |s| s);
        let status = h.supervisor.inspect_external().await;
        assert_eq!(status.state(), TunnelState::Adopted);
        assert_eq!(status.pid, 777);
    }
}
