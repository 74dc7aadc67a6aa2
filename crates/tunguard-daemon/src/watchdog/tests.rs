use super::*;
use crate::policy::{PolicyApplier, PolicyRequest, PolicyTemplate};
use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tunguard_tunnel::{DebugDump, HealthCheck, TunnelControl};
use tunguard_types::{CommandResult, HealthResult, ProcessStatus, TunguardError, TunguardResult};

struct ScriptedProbe {
    results: Mutex<VecDeque<bool>>,
    fallback: bool,
    calls: Mutex<u32>,
}

impl ScriptedProbe {
    fn new(results: Vec<bool>, fallback: bool) -> Self {
        Self {
            results: Mutex::new(results.into()),
            fallback,
            calls: Mutex::new(0),
        }
    }

    fn failing() -> Self {
        Self::new(vec![], false)
    }
}

#[async_trait]
impl HealthCheck for ScriptedProbe {
    async fn check(&self) -> HealthResult {
        *self.calls.lock() += 1;
        let ok = self.results.lock().pop_front().unwrap_or(self.fallback);
        if ok {
            HealthResult {
                ok: true,
                url: "https://probe.test".into(),
                status_code: 200,
                body: "203.0.113.9".into(),
                latency_ms: 12,
                error: None,
            }
        } else {
            HealthResult::failed("https://probe.test", "connection reset")
        }
    }
}

#[derive(Default)]
struct FakeTunnel {
    owned: Mutex<bool>,
    fail_ensure: Mutex<bool>,
    stops: Mutex<u32>,
    ensures: Mutex<u32>,
    interface: Mutex<String>,
}

impl FakeTunnel {
    fn owned(interface: &str) -> Self {
        let tunnel = Self::default();
        *tunnel.owned.lock() = true;
        *tunnel.interface.lock() = interface.to_string();
        tunnel
    }

    fn adopted(interface: &str) -> Self {
        let tunnel = Self::default();
        *tunnel.interface.lock() = interface.to_string();
        tunnel
    }
}

#[async_trait]
impl TunnelControl for FakeTunnel {
    fn inspect(&self) -> ProcessStatus {
        if *self.owned.lock() {
            ProcessStatus {
                running: true,
                pid: 4242,
                owned_by_us: true,
                interface_name: None,
            }
        } else {
            ProcessStatus::not_running()
        }
    }

    async fn stop_if_owned(&self) -> TunguardResult<()> {
        *self.stops.lock() += 1;
        Ok(())
    }

    async fn ensure_running(&self) -> TunguardResult<ProcessStatus> {
        *self.ensures.lock() += 1;
        if *self.fail_ensure.lock() {
            return Err(TunguardError::InterfaceNotReady("no interface within 8s".into()));
        }
        let name = self.interface.lock().clone();
        if *self.owned.lock() {
            Ok(ProcessStatus::owned(5000, name))
        } else {
            Ok(ProcessStatus::adopted(777, name))
        }
    }
}

#[derive(Default)]
struct RecordingPolicy {
    requests: Mutex<Vec<PolicyRequest>>,
    fail: Mutex<bool>,
}

#[async_trait]
impl PolicyApplier for RecordingPolicy {
    async fn apply(&self, request: &PolicyRequest) -> TunguardResult<CommandResult> {
        self.requests.lock().push(request.clone());
        if *self.fail.lock() {
            return Err(TunguardError::CommandFailed {
                path: "/usr/local/libexec/tunguard/policy_apply.sh".into(),
                output: CommandResult::new(1, "", "pfctl: syntax error"),
            });
        }
        Ok(CommandResult::new(0, "rules loaded", ""))
    }
}

struct Rig {
    probe: Arc<ScriptedProbe>,
    tunnel: Arc<FakeTunnel>,
    policy: Arc<RecordingPolicy>,
    watchdog: Watchdog,
}

fn settings(threshold: u32, budget: u32) -> WatchdogSettings {
    WatchdogSettings {
        interval: Duration::from_secs(10),
        failure_threshold: threshold,
        max_recoveries: budget,
        recover_cooldown: Duration::from_secs(5),
    }
}

fn rig(settings: WatchdogSettings, probe: ScriptedProbe, tunnel: FakeTunnel) -> Rig {
    rig_with_debug(settings, probe, tunnel, DebugDump::disabled())
}

fn rig_with_debug(
    settings: WatchdogSettings,
    probe: ScriptedProbe,
    tunnel: FakeTunnel,
    debug: DebugDump,
) -> Rig {
    let probe = Arc::new(probe);
    let tunnel = Arc::new(tunnel);
    let policy = Arc::new(RecordingPolicy::default());
    let template = PolicyTemplate {
        wan: "en5".into(),
        lan: "en8".into(),
        vpn_server_ips: vec!["203.0.113.9".into()],
        wan_dns: vec![],
        allow_ntp: false,
    };
    let watchdog = Watchdog::new(
        settings,
        probe.clone(),
        tunnel.clone(),
        policy.clone(),
        template,
        debug,
    );
    Rig {
        probe,
        tunnel,
        policy,
        watchdog,
    }
}

#[tokio::test(start_paused = true)]
async fn test_failures_below_threshold_take_no_action() {
    let mut r = rig(settings(3, 5), ScriptedProbe::failing(), FakeTunnel::owned("utun7"));

    assert_eq!(r.watchdog.tick().await, TickOutcome::Degraded { failures: 1 });
    assert_eq!(r.watchdog.tick().await, TickOutcome::Degraded { failures: 2 });
    assert_eq!(r.watchdog.state().phase, WatchdogPhase::Degraded(2));
    assert_eq!(*r.tunnel.ensures.lock(), 0);
    assert!(r.policy.requests.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ok_probe_resets_failure_counter() {
    let probe = ScriptedProbe::new(vec![false, false, true, false, false], false);
    let mut r = rig(settings(3, 5), probe, FakeTunnel::owned("utun7"));

    for _ in 0..5 {
        r.watchdog.tick().await;
    }
    assert_eq!(r.watchdog.state().consecutive_failures, 2);
    assert_eq!(r.watchdog.state().recoveries_used, 0);
}

#[tokio::test(start_paused = true)]
async fn test_one_recovery_per_failing_tick_at_threshold() {
    let mut r = rig(settings(2, 10), ScriptedProbe::failing(), FakeTunnel::owned("utun7"));

    assert_eq!(r.watchdog.tick().await, TickOutcome::Degraded { failures: 1 });
    assert_eq!(r.watchdog.tick().await, TickOutcome::RecoveryFailed { attempt: 1 });
    assert_eq!(r.watchdog.tick().await, TickOutcome::RecoveryFailed { attempt: 2 });
    assert_eq!(r.watchdog.tick().await, TickOutcome::RecoveryFailed { attempt: 3 });

    assert_eq!(*r.tunnel.ensures.lock(), 3);
    assert_eq!(r.policy.requests.lock().len(), 3);
    // 4 ticks + 3 follow-up probes
    assert_eq!(*r.probe.calls.lock(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_budget_is_never_exceeded() {
    let mut r = rig(settings(1, 2), ScriptedProbe::failing(), FakeTunnel::owned("utun7"));

    let mut outcomes = Vec::new();
    for _ in 0..6 {
        outcomes.push(r.watchdog.tick().await);
    }

    assert_eq!(r.watchdog.state().recoveries_used, 2);
    assert_eq!(*r.tunnel.stops.lock(), 2);
    assert_eq!(*r.tunnel.ensures.lock(), 2);
    assert_eq!(r.policy.requests.lock().len(), 2);
    assert_eq!(&outcomes[2..], &[TickOutcome::Exhausted; 4]);
    assert_eq!(r.watchdog.state().phase, WatchdogPhase::Exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_successful_recovery() {
    let probe = ScriptedProbe::new(vec![false, false, false, true], true);
    let mut r = rig(settings(3, 5), probe, FakeTunnel::owned("utun9"));

    r.watchdog.tick().await;
    r.watchdog.tick().await;
    let started = tokio::time::Instant::now();
    assert_eq!(r.watchdog.tick().await, TickOutcome::Recovered { attempt: 1 });
    assert!(started.elapsed() >= Duration::from_secs(5));

    let state = r.watchdog.state();
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.successful_recoveries, 1);
    assert_eq!(state.phase, WatchdogPhase::Healthy);

    let requests = r.policy.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].tunnel_interface, "utun9");
    assert_eq!(requests[0].wan, "en5");
}

#[tokio::test(start_paused = true)]
async fn test_ok_after_failed_recovery_is_ambiguous() {
    let probe = ScriptedProbe::new(vec![false, true], true);
    let mut r = rig(settings(1, 5), probe, FakeTunnel::owned("utun7"));
    *r.policy.fail.lock() = true;

    assert_eq!(r.watchdog.tick().await, TickOutcome::Ambiguous { attempt: 1 });
    let state = r.watchdog.state();
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.successful_recoveries, 0);
    assert_eq!(state.ambiguous_recoveries, 1);
    assert_eq!(state.recoveries_used, 1);
}

#[tokio::test(start_paused = true)]
async fn test_adopted_tunnel_is_not_stopped() {
    let mut r = rig(settings(1, 5), ScriptedProbe::failing(), FakeTunnel::adopted("utun2"));

    r.watchdog.tick().await;
    assert_eq!(*r.tunnel.stops.lock(), 0);
    assert_eq!(*r.tunnel.ensures.lock(), 1);
    assert_eq!(r.policy.requests.lock()[0].tunnel_interface, "utun2");
}

#[tokio::test(start_paused = true)]
async fn test_policy_skipped_when_tunnel_fails() {
    let mut r = rig(settings(1, 5), ScriptedProbe::failing(), FakeTunnel::owned("utun7"));
    *r.tunnel.fail_ensure.lock() = true;

    assert_eq!(r.watchdog.tick().await, TickOutcome::RecoveryFailed { attempt: 1 });
    assert!(r.policy.requests.lock().is_empty());
    assert_eq!(r.watchdog.state().recoveries_used, 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_keeps_probing_on_interval() {
    let r = rig(settings(3, 5), ScriptedProbe::new(vec![], true), FakeTunnel::owned("utun7"));
    let probe = r.probe.clone();
    let mut watchdog = r.watchdog;

    let handle = tokio::spawn(async move { watchdog.run().await });
    tokio::time::sleep(Duration::from_secs(35)).await;
    handle.abort();

    // t = 0, 10, 20, 30
    assert_eq!(*probe.calls.lock(), 4);
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_debug_dumps_status_before_recover() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut r = rig_with_debug(
        settings(1, 5),
        ScriptedProbe::new(vec![false, true], true),
        FakeTunnel::owned("utun7"),
        DebugDump::new(true),
    );
    assert_eq!(r.watchdog.tick().await, TickOutcome::Recovered { attempt: 1 });

    let logs = String::from_utf8_lossy(&captured.0.lock()).to_string();
    let status_at = logs.find("status_before_recover").unwrap();
    let restart_at = logs.find("tunnel_before_recover").unwrap();
    assert!(status_at < restart_at);
    let dumped = &logs[status_at..restart_at];
    assert!(dumped.contains("connection reset"));
    assert!(dumped.contains("4242"));
    assert!(dumped.contains("\"recoveries_used\": 0"));
}

#[tokio::test(start_paused = true)]
async fn test_no_recovery_dump_without_debug() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut r = rig(settings(1, 5), ScriptedProbe::new(vec![false, true], true), FakeTunnel::owned("utun7"));
    r.watchdog.tick().await;

    let logs = String::from_utf8_lossy(&captured.0.lock()).to_string();
    assert!(logs.contains("attempting recovery #1"));
    assert!(!logs.contains("status_before_recover"));
}

proptest! {
    #[test]
    fn prop_recoveries_bounded_by_budget(
        results in proptest::collection::vec(any::<bool>(), 1..40),
        threshold in 1u32..4,
        budget in 0u32..4,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let mut s = settings(threshold, budget);
            s.recover_cooldown = Duration::ZERO;
            let mut r = rig(s, ScriptedProbe::new(results.clone(), false), FakeTunnel::owned("utun7"));

            for _ in 0..results.len() {
                r.watchdog.tick().await;
                let state = r.watchdog.state();
                prop_assert!(state.recoveries_used <= budget);
                prop_assert_eq!(r.policy.requests.lock().len() as u32, state.recoveries_used);
                prop_assert_eq!(*r.tunnel.stops.lock(), state.recoveries_used);
            }
            Ok(())
        })?;
    }
}
