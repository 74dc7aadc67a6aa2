use super::utils::{print_script_success, require_root, script_failed};
use std::path::Path;
use tracing::info;
use tunguard_daemon::DaemonConfig;
use tunguard_tunnel::{CommandRunner, DebugDump, ProcessSupervisor};
use tunguard_types::TunguardResult;

pub async fn bring_down(config_path: &Path, debug: DebugDump) -> TunguardResult<()> {
    require_root()?;
    let config = DaemonConfig::load(config_path)?;

    let supervisor = ProcessSupervisor::system(config.tunnel.settings(), debug);
    supervisor.stop_if_owned().await?;

    let output = CommandRunner::new(debug)
        .run(&config.scripts.down, config.scripts.command_timeout(), &[])
        .await
        .map_err(|e| script_failed("down", e))?;
    print_script_success("down", &output);

    info!("router down");
    Ok(())
}
