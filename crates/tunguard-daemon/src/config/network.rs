use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Uplink interface. Left empty, `up` takes it from the setup script output.
    pub wan_interface: Option<String>,

    pub lan_interface: Option<String>,

    /// Tunnel server addresses allowed through the kill switch. The health
    /// probe also expects the egress identity to be one of these.
    pub vpn_server_ips: Vec<String>,

    pub wan_dns: Vec<String>,

    pub allow_wan_ntp: bool,
}

impl NetworkConfig {
    pub fn wan(&self) -> Option<&str> {
        non_blank(self.wan_interface.as_deref())
    }

    pub fn lan(&self) -> Option<&str> {
        non_blank(self.lan_interface.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
