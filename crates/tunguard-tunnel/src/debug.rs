use serde::Serialize;
use tracing::info;

pub const DEBUG_ENV_VAR: &str = "TUNGUARD_DEBUG";

/// Verbatim dumps of intermediate results, decided once at startup.
///
/// Components receive a copy in their constructors; a disabled dump never
/// serializes anything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DebugDump {
    enabled: bool,
}

impl DebugDump {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    /// `--debug` wins; otherwise `TUNGUARD_DEBUG` set to `1`, `true` or `yes`.
    pub fn from_flag_or_env(flag: bool) -> Self {
        if flag {
            return Self::new(true);
        }
        let env = std::env::var(DEBUG_ENV_VAR).unwrap_or_default();
        Self::new(env_value_enables(&env))
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn dump<T: Serialize + ?Sized>(&self, label: &str, value: &T) {
        if !self.enabled {
            return;
        }
        match serde_json::to_string_pretty(value) {
            Ok(json) => info!(target: "tunguard::dump", "[debug] {}:\n{}", label, json),
            Err(e) => info!(target: "tunguard::dump", "[debug] {}: <unserializable: {}>", label, e),
        }
    }
}

fn env_value_enables(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
