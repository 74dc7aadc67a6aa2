use super::utils::{print_banner, require_root, wait_for_shutdown, InterfaceOverrides};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tunguard_daemon::{DaemonConfig, PolicyTemplate, ScriptPolicyApplier, Watchdog, WatchdogSettings};
use tunguard_tunnel::{CommandRunner, DebugDump, HttpHealthProbe, ProcessSupervisor};
use tunguard_types::TunguardResult;

pub async fn run_watchdog(
    config_path: &Path,
    overrides: &InterfaceOverrides,
    health_url: Option<String>,
    health_timeout_secs: Option<u64>,
    debug: DebugDump,
) -> TunguardResult<()> {
    require_root()?;
    print_banner();

    let mut config = DaemonConfig::load(config_path)?;
    if let Some(url) = health_url.filter(|u| !u.trim().is_empty()) {
        config.watchdog.health_url = url;
    }
    let (wan, lan) = overrides.require(&config.network)?;

    // An explicit timeout doubles as the tick interval.
    let timeout_override = health_timeout_secs.filter(|s| *s > 0).map(Duration::from_secs);
    let mut settings = WatchdogSettings::from_config(&config.watchdog);
    if let Some(timeout) = timeout_override {
        settings = settings.with_interval(timeout);
    }
    let health_timeout = timeout_override.unwrap_or_else(|| config.watchdog.health_timeout());

    let probe = HttpHealthProbe::new(
        config.watchdog.health_url.clone(),
        health_timeout,
        config.network.vpn_server_ips.clone(),
    )?;
    let runner = CommandRunner::new(debug);
    let supervisor = ProcessSupervisor::system(config.tunnel.settings(), debug);
    let applier = ScriptPolicyApplier::new(
        &config.scripts.policy_apply,
        config.scripts.command_timeout(),
        runner,
    );

    info!("Config: {:?}", config_path);
    info!("Tunnel: adopt_external={}", config.tunnel.adopt_external);
    info!(
        "Health: url={} timeout={:?} wan={} lan={}",
        config.watchdog.health_url, health_timeout, wan, lan
    );

    let mut watchdog = Watchdog::new(
        settings,
        Arc::new(probe),
        Arc::new(supervisor),
        Arc::new(applier),
        PolicyTemplate::from_config(&config, &wan, &lan),
        debug,
    );

    tokio::select! {
        _ = watchdog.run() => {}
        _ = wait_for_shutdown() => {}
    }

    let state = watchdog.state();
    info!(
        "Shutting down; recoveries={} succeeded={} ambiguous={} (tunnel left running, use `tunguard down` to stop it)",
        state.recoveries_used, state.successful_recoveries, state.ambiguous_recoveries
    );
    Ok(())
}
