use serde::Serialize;
use std::time::Duration;

use crate::config::WatchdogConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "failures", rename_all = "snake_case")]
pub enum WatchdogPhase {
    Healthy,
    Degraded(u32),
    Recovering,
    Exhausted,
}

impl std::fmt::Display for WatchdogPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchdogPhase::Healthy => write!(f, "healthy"),
            WatchdogPhase::Degraded(n) => write!(f, "degraded({})", n),
            WatchdogPhase::Recovering => write!(f, "recovering"),
            WatchdogPhase::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Counters for the lifetime of one watchdog. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecoveryState {
    pub consecutive_failures: u32,
    pub recoveries_used: u32,
    pub budget: u32,
    pub successful_recoveries: u32,
    pub ambiguous_recoveries: u32,
    pub phase: WatchdogPhase,
}

impl RecoveryState {
    pub fn new(budget: u32) -> Self {
        Self {
            consecutive_failures: 0,
            recoveries_used: 0,
            budget,
            successful_recoveries: 0,
            ambiguous_recoveries: 0,
            phase: WatchdogPhase::Healthy,
        }
    }

    pub fn budget_left(&self) -> u32 {
        self.budget.saturating_sub(self.recoveries_used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.recoveries_used >= self.budget
    }

    /// Returns the failure streak that just ended.
    pub(crate) fn record_ok(&mut self) -> u32 {
        let streak = self.consecutive_failures;
        self.consecutive_failures = 0;
        self.phase = WatchdogPhase::Healthy;
        streak
    }

    pub(crate) fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.phase = WatchdogPhase::Degraded(self.consecutive_failures);
        self.consecutive_failures
    }

    /// Consumes one unit of budget and returns the attempt number.
    pub(crate) fn begin_recovery(&mut self) -> u32 {
        self.recoveries_used += 1;
        self.phase = WatchdogPhase::Recovering;
        self.recoveries_used
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    Healthy,
    Degraded { failures: u32 },
    /// Recovery ran cleanly and the follow-up probe passed.
    Recovered { attempt: u32 },
    /// The follow-up probe passed although the recovery itself reported an
    /// error. Not counted as a success.
    Ambiguous { attempt: u32 },
    RecoveryFailed { attempt: u32 },
    /// Budget spent; manual intervention required. Probing continues.
    Exhausted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchdogSettings {
    pub interval: Duration,
    pub failure_threshold: u32,
    pub max_recoveries: u32,
    pub recover_cooldown: Duration,
}

impl WatchdogSettings {
    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self {
            interval: config.check_interval(),
            failure_threshold: config.failure_threshold.max(1),
            max_recoveries: config.max_recoveries,
            recover_cooldown: config.recover_cooldown(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self::from_config(&WatchdogConfig::default())
    }
}
