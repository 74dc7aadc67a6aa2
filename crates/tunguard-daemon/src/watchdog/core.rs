use serde::Serialize;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tunguard_tunnel::{DebugDump, HealthCheck, TunnelControl};
use tunguard_types::{HealthResult, ProcessStatus, TunguardError, TunguardResult};

use super::types::{RecoveryState, TickOutcome, WatchdogPhase, WatchdogSettings};
use crate::policy::{PolicyApplier, PolicyTemplate};

/// Everything the watchdog knows at the moment it decides to recover.
#[derive(Serialize)]
struct StatusBeforeRecover<'a> {
    tunnel: ProcessStatus,
    health: &'a HealthResult,
    state: &'a RecoveryState,
}

/// Turns a stream of probe results into at most one recovery per tick.
///
/// Strictly sequential: a tick, including any recovery and its cooldown,
/// finishes before the next one starts.
pub struct Watchdog {
    settings: WatchdogSettings,
    probe: Arc<dyn HealthCheck>,
    tunnel: Arc<dyn TunnelControl>,
    policy: Arc<dyn PolicyApplier>,
    template: PolicyTemplate,
    state: RecoveryState,
    debug: DebugDump,
}

impl Watchdog {
    pub fn new(
        settings: WatchdogSettings,
        probe: Arc<dyn HealthCheck>,
        tunnel: Arc<dyn TunnelControl>,
        policy: Arc<dyn PolicyApplier>,
        template: PolicyTemplate,
        debug: DebugDump,
    ) -> Self {
        let state = RecoveryState::new(settings.max_recoveries);
        Self {
            settings,
            probe,
            tunnel,
            policy,
            template,
            state,
            debug,
        }
    }

    pub fn state(&self) -> &RecoveryState {
        &self.state
    }

    pub fn settings(&self) -> &WatchdogSettings {
        &self.settings
    }

    /// Ticks forever on the configured interval. The first probe is immediate.
    pub async fn run(&mut self) {
        info!(
            "watchdog running; interval={:?} failure_threshold={} max_recoveries={}",
            self.settings.interval, self.settings.failure_threshold, self.settings.max_recoveries
        );

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let outcome = self.tick().await;
            self.debug.dump("tick_outcome", &outcome);
        }
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let health = self.probe.check().await;
        self.debug.dump("health", &health);

        if health.ok {
            let streak = self.state.record_ok();
            if streak > 0 {
                info!(
                    "health recovered after {} failures; body={:?} latency={}ms",
                    streak, health.body, health.latency_ms
                );
            }
        } else {
            let failures = self.state.record_failure();
            log_failure(failures, &health);
        }

        if self.state.consecutive_failures < self.settings.failure_threshold {
            return match self.state.phase {
                WatchdogPhase::Degraded(failures) => TickOutcome::Degraded { failures },
                _ => TickOutcome::Healthy,
            };
        }

        if self.state.is_exhausted() {
            self.state.phase = WatchdogPhase::Exhausted;
            error!(
                "recovery budget exhausted (recoveries={}); manual intervention required",
                self.state.recoveries_used
            );
            return TickOutcome::Exhausted;
        }

        self.recover(&health).await
    }

    async fn recover(&mut self, health: &HealthResult) -> TickOutcome {
        self.debug.dump(
            "status_before_recover",
            &StatusBeforeRecover {
                tunnel: self.tunnel.inspect(),
                health,
                state: &self.state,
            },
        );

        let attempt = self.state.begin_recovery();
        info!(
            "attempting recovery #{} ({} left after this one)",
            attempt,
            self.state.budget_left()
        );
        self.debug.dump("recovery_state_before", &self.state);

        let result = self.restart_and_apply().await;
        match &result {
            Ok(interface) => info!("recovery #{} executed; interface={}", attempt, interface),
            Err(e) => warn!("recovery #{} failed: {}", attempt, e),
        }

        tokio::time::sleep(self.settings.recover_cooldown).await;

        let health = self.probe.check().await;
        self.debug.dump("health_after_recover", &health);

        let outcome = if health.ok {
            self.state.record_ok();
            if result.is_ok() {
                self.state.successful_recoveries += 1;
                info!("recovery #{} succeeded; health OK", attempt);
                TickOutcome::Recovered { attempt }
            } else {
                self.state.ambiguous_recoveries += 1;
                warn!(
                    "health OK after failed recovery #{} (not counted as a success)",
                    attempt
                );
                TickOutcome::Ambiguous { attempt }
            }
        } else {
            warn!(
                "recovery #{} did not restore health: status={} error={:?} body={:?}",
                attempt, health.status_code, health.error, health.body
            );
            self.state.phase = if self.state.is_exhausted() {
                WatchdogPhase::Exhausted
            } else {
                WatchdogPhase::Degraded(self.state.consecutive_failures)
            };
            TickOutcome::RecoveryFailed { attempt }
        };

        self.debug.dump("recovery_state_after", &self.state);
        outcome
    }

    /// Restart the tunnel if it is ours, make sure one is running, reload
    /// the policy for whatever interface it is on.
    async fn restart_and_apply(&self) -> TunguardResult<String> {
        let before = self.tunnel.inspect();
        self.debug.dump("tunnel_before_recover", &before);

        if before.owned_by_us {
            self.tunnel.stop_if_owned().await?;
        }

        let status = self.tunnel.ensure_running().await?;
        self.debug.dump("tunnel_after_ensure", &status);

        if !status.is_usable() {
            return Err(TunguardError::Process(
                "tunnel not running or interface not detected".into(),
            ));
        }
        let interface = status.interface_name.unwrap_or_default();

        let output = self.policy.apply(&self.template.request(interface.clone())).await?;
        self.debug.dump("policy_apply_output", &output);
        Ok(interface)
    }
}

fn log_failure(failures: u32, health: &HealthResult) {
    warn!(
        "health FAIL #{}: status={} error={:?} body={:?} latency={}ms",
        failures, health.status_code, health.error, health.body, health.latency_ms
    );
}
