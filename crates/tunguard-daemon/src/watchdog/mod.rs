mod core;
mod types;

pub use self::core::Watchdog;
pub use types::{RecoveryState, TickOutcome, WatchdogPhase, WatchdogSettings};

#[cfg(test)]
mod tests;
