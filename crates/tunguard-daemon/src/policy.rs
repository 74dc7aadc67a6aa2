use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tunguard_tunnel::CommandRunner;
use tunguard_types::{CommandResult, TunguardResult};

use crate::config::DaemonConfig;

/// Inputs for one policy application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PolicyRequest {
    pub tunnel_interface: String,
    pub wan: String,
    pub lan: String,
    pub vpn_server_ips: Vec<String>,
    pub wan_dns: Vec<String>,
    pub allow_ntp: bool,
}

impl PolicyRequest {
    /// `key=value` arguments in the order the policy script expects.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            format!("utun={}", self.tunnel_interface),
            format!("wan={}", self.wan.trim()),
            format!("lan={}", self.lan.trim()),
            format!("vpn_server_ips={:?}", self.vpn_server_ips.join(",")),
            format!("wan_dns={:?}", self.wan_dns.join(",")),
            format!("allow_ntp={}", self.allow_ntp),
        ]
    }
}

/// Everything in a [`PolicyRequest`] except the tunnel interface, which is
/// only known after the tunnel is up.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PolicyTemplate {
    pub wan: String,
    pub lan: String,
    pub vpn_server_ips: Vec<String>,
    pub wan_dns: Vec<String>,
    pub allow_ntp: bool,
}

impl PolicyTemplate {
    pub fn from_config(config: &DaemonConfig, wan: &str, lan: &str) -> Self {
        Self {
            wan: wan.to_string(),
            lan: lan.to_string(),
            vpn_server_ips: config.network.vpn_server_ips.clone(),
            wan_dns: config.network.wan_dns.clone(),
            allow_ntp: config.network.allow_wan_ntp,
        }
    }

    pub fn request(&self, tunnel_interface: impl Into<String>) -> PolicyRequest {
        PolicyRequest {
            tunnel_interface: tunnel_interface.into(),
            wan: self.wan.clone(),
            lan: self.lan.clone(),
            vpn_server_ips: self.vpn_server_ips.clone(),
            wan_dns: self.wan_dns.clone(),
            allow_ntp: self.allow_ntp,
        }
    }
}

/// Loads NAT and kill-switch rules. Must be idempotent.
#[async_trait]
pub trait PolicyApplier: Send + Sync {
    async fn apply(&self, request: &PolicyRequest) -> TunguardResult<CommandResult>;
}

pub struct ScriptPolicyApplier {
    path: PathBuf,
    timeout: Duration,
    runner: CommandRunner,
}

impl ScriptPolicyApplier {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration, runner: CommandRunner) -> Self {
        Self {
            path: path.into(),
            timeout,
            runner,
        }
    }
}

#[async_trait]
impl PolicyApplier for ScriptPolicyApplier {
    async fn apply(&self, request: &PolicyRequest) -> TunguardResult<CommandResult> {
        let args = request.to_args();
        info!("policy_apply args: {}", args.join(" "));
        self.runner.run(&self.path, self.timeout, &args).await
    }
}
