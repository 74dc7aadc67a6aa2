use super::utils::{
    missing_interfaces, parse_wan_lan, print_script_success, require_root, script_failed,
    InterfaceOverrides,
};
use std::path::Path;
use tracing::info;
use tunguard_daemon::{DaemonConfig, PolicyApplier, PolicyTemplate, ScriptPolicyApplier};
use tunguard_tunnel::{CommandRunner, DebugDump, ProcessSupervisor};
use tunguard_types::{TunguardError, TunguardResult};

pub async fn bring_up(
    config_path: &Path,
    overrides: &InterfaceOverrides,
    debug: DebugDump,
) -> TunguardResult<()> {
    require_root()?;
    let config = DaemonConfig::load(config_path)?;
    let runner = CommandRunner::new(debug);
    let timeout = config.scripts.command_timeout();

    let setup = runner
        .run(&config.scripts.setup, timeout, &[])
        .await
        .map_err(|e| script_failed("setup", e))?;
    print_script_success("setup", &setup);

    let (mut wan, mut lan) = overrides.resolve(&config.network);
    if wan.is_none() || lan.is_none() {
        if let Some((announced_wan, announced_lan)) = parse_wan_lan(&setup.stdout) {
            info!("setup announced WAN={} LAN={}", announced_wan, announced_lan);
            wan = wan.or(Some(announced_wan));
            lan = lan.or(Some(announced_lan));
        }
    }
    let (Some(wan), Some(lan)) = (wan, lan) else {
        return Err(missing_interfaces());
    };

    if !config.tunnel.auto_start {
        return Err(TunguardError::Process(
            "no tunnel interface detected (tunnel.auto_start is off)".into(),
        ));
    }

    let supervisor = ProcessSupervisor::system(config.tunnel.settings(), debug);
    let status = supervisor.ensure_running().await?;
    info!(
        "tunnel status: pid={} owned={} interface={:?}",
        status.pid, status.owned_by_us, status.interface_name
    );

    let interface = status
        .interface_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| TunguardError::Process("no tunnel interface detected".into()))?;

    let applier = ScriptPolicyApplier::new(&config.scripts.policy_apply, timeout, runner);
    let request = PolicyTemplate::from_config(&config, &wan, &lan).request(interface.clone());
    let output = applier
        .apply(&request)
        .await
        .map_err(|e| script_failed("policy_apply", e))?;
    print_script_success("policy_apply", &output);

    info!("router up; interface={}", interface);
    Ok(())
}
