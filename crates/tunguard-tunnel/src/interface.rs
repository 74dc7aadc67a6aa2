use crate::poll::{poll_until, PollSchedule};
use crate::DebugDump;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tunguard_types::{TunguardError, TunguardResult, INTERFACE_POLL_INTERVAL_MS};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

impl InterfaceInfo {
    pub fn new(name: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        Self {
            name: name.into(),
            addresses,
        }
    }

    /// Exists and carries at least one routable address.
    pub fn is_ready(&self) -> bool {
        self.addresses.iter().any(is_routable)
    }
}

/// Unconfigured, loopback and link-local addresses do not count.
pub fn is_routable(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => !v4.is_unspecified() && !v4.is_loopback() && !v4.is_link_local(),
        IpAddr::V6(v6) => {
            !v6.is_unspecified() && !v6.is_loopback() && (v6.segments()[0] & 0xffc0) != 0xfe80
        }
    }
}

/// Trailing number of an interface name (`utun66` -> 66).
pub fn interface_index(name: &str) -> Option<u32> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

/// Point-in-time view of the managed interfaces, keyed by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceSnapshot {
    interfaces: BTreeMap<String, InterfaceInfo>,
}

impl InterfaceSnapshot {
    pub fn from_interfaces(interfaces: impl IntoIterator<Item = InterfaceInfo>) -> Self {
        Self {
            interfaces: interfaces
                .into_iter()
                .map(|info| (info.name.clone(), info))
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.interfaces.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&InterfaceInfo> {
        self.interfaces.get(name)
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.get(name).map(InterfaceInfo::is_ready).unwrap_or(false)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceInfo> {
        self.interfaces.values()
    }

    pub fn ready_names(&self) -> Vec<String> {
        self.interfaces()
            .filter(|i| i.is_ready())
            .map(|i| i.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

/// Enumerates the interfaces the watcher cares about.
pub trait InterfaceSource: Send + Sync {
    fn snapshot(&self) -> TunguardResult<InterfaceSnapshot>;
}

/// Live enumeration through `getifaddrs`, restricted to `<prefix><N>` names
/// plus an optional pinned name.
pub struct SystemInterfaces {
    prefix: String,
    pinned: Option<String>,
}

impl SystemInterfaces {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            pinned: None,
        }
    }

    pub fn with_pinned(mut self, pinned: Option<String>) -> Self {
        self.pinned = pinned.filter(|name| !name.is_empty());
        self
    }

    pub fn is_managed(&self, name: &str) -> bool {
        if self.pinned.as_deref() == Some(name) {
            return true;
        }
        match name.strip_prefix(self.prefix.as_str()) {
            Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()),
            None => false,
        }
    }
}

impl InterfaceSource for SystemInterfaces {
    #[cfg(unix)]
    fn snapshot(&self) -> TunguardResult<InterfaceSnapshot> {
        let addrs = nix::ifaddrs::getifaddrs()
            .map_err(|e| TunguardError::Interface(format!("getifaddrs failed: {}", e)))?;

        let mut found: BTreeMap<String, InterfaceInfo> = BTreeMap::new();
        for ifa in addrs {
            if !self.is_managed(&ifa.interface_name) {
                continue;
            }
            let entry = found
                .entry(ifa.interface_name.clone())
                .or_insert_with(|| InterfaceInfo::new(ifa.interface_name.clone(), Vec::new()));

            if let Some(storage) = ifa.address {
                if let Some(sin) = storage.as_sockaddr_in() {
                    entry.addresses.push(IpAddr::V4(sin.ip()));
                } else if let Some(sin6) = storage.as_sockaddr_in6() {
                    entry.addresses.push(IpAddr::V6(sin6.ip()));
                }
            }
        }

        Ok(InterfaceSnapshot { interfaces: found })
    }

    #[cfg(not(unix))]
    fn snapshot(&self) -> TunguardResult<InterfaceSnapshot> {
        Err(TunguardError::Interface(
            "interface enumeration is not supported on this platform".into(),
        ))
    }
}

/// Picks the tunnel interface out of `after`, given what existed in `before`.
///
/// 1. A preferred name is the only acceptable answer.
/// 2. Otherwise an interface that is new, or was unready and is now ready.
///    Several such candidates resolve to the highest-numbered one.
/// 3. Otherwise, if exactly one managed interface exists and it is ready.
pub fn select_ready(
    before: &InterfaceSnapshot,
    after: &InterfaceSnapshot,
    preferred: Option<&str>,
) -> Option<String> {
    if let Some(name) = preferred {
        return after.is_ready(name).then(|| name.to_string());
    }

    let transitioned = after
        .interfaces()
        .filter(|i| i.is_ready() && (!before.contains(&i.name) || !before.is_ready(&i.name)));
    if let Some(info) = newest(transitioned) {
        return Some(info.name.clone());
    }

    if after.len() == 1 {
        if let Some(only) = after.interfaces().next() {
            if only.is_ready() {
                return Some(only.name.clone());
            }
        }
    }

    None
}

fn newest<'a>(candidates: impl Iterator<Item = &'a InterfaceInfo>) -> Option<&'a InterfaceInfo> {
    candidates.max_by(|a, b| {
        interface_index(&a.name)
            .cmp(&interface_index(&b.name))
            .then_with(|| a.name.cmp(&b.name))
    })
}

pub struct InterfaceWatcher {
    source: Arc<dyn InterfaceSource>,
    poll_interval: Duration,
    debug: DebugDump,
}

impl InterfaceWatcher {
    pub fn new(source: Arc<dyn InterfaceSource>, debug: DebugDump) -> Self {
        Self {
            source,
            poll_interval: Duration::from_millis(INTERFACE_POLL_INTERVAL_MS),
            debug,
        }
    }

    pub fn snapshot(&self) -> TunguardResult<InterfaceSnapshot> {
        self.source.snapshot()
    }

    /// Waits until an interface becomes ready relative to `before`.
    pub async fn wait_for_ready(
        &self,
        before: &InterfaceSnapshot,
        preferred: Option<&str>,
        timeout: Duration,
    ) -> TunguardResult<String> {
        let schedule = PollSchedule::fixed(self.poll_interval, timeout);

        let picked = poll_until(&schedule, || {
            let found = match self.source.snapshot() {
                Ok(after) => select_ready(before, &after, preferred),
                Err(e) => {
                    debug!("interface enumeration failed while waiting: {}", e);
                    None
                }
            };
            async move { found }
        })
        .await;

        match picked {
            Ok(name) => {
                info!("Tunnel interface ready: {}", name);
                Ok(name)
            }
            Err(timeout_info) => {
                let msg = match preferred {
                    Some(name) => format!(
                        "preferred interface {:?} not ready within {:?} ({} polls)",
                        name, timeout, timeout_info.attempts
                    ),
                    None => format!(
                        "no interface gained a routable address within {:?} ({} polls)",
                        timeout, timeout_info.attempts
                    ),
                };
                if let Ok(last) = self.source.snapshot() {
                    self.debug.dump("interfaces_at_timeout", &last);
                }
                Err(TunguardError::InterfaceNotReady(msg))
            }
        }
    }

    /// Finds the interface of a tunnel process that was already running.
    ///
    /// Without a preferred name only a lone ready interface is accepted;
    /// several are ambiguous and must be disambiguated by pinning. If none is
    /// ready yet, falls back to waiting for a transition relative to `before`.
    pub async fn resolve_current(
        &self,
        before: &InterfaceSnapshot,
        preferred: Option<&str>,
        timeout: Duration,
    ) -> TunguardResult<String> {
        if preferred.is_some() {
            return self.wait_for_ready(before, preferred, timeout).await;
        }

        let now = self.source.snapshot()?;
        let mut ready = now.ready_names();
        match ready.len() {
            0 => self.wait_for_ready(before, None, timeout).await,
            1 => Ok(ready.remove(0)),
            _ => {
                ready.sort_by_key(|name| interface_index(name));
                self.debug.dump("ambiguous_interfaces", &now);
                Err(TunguardError::InterfaceNotReady(format!(
                    "several tunnel interfaces are ready ({}); set tunnel.interface_name to pick one",
                    ready.join(", ")
                )))
            }
        }
    }
}
