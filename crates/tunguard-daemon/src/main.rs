mod cli;

use clap::Parser;
use cli::{
    Cli, Commands, init_logging, bring_up, bring_down, run_watchdog, show_status,
    run_checks, show_version, InterfaceOverrides,
};
use tunguard_daemon::DaemonConfig;
use tunguard_tunnel::DebugDump;
use tunguard_types::TunguardResult;

#[tokio::main]
async fn main() -> TunguardResult<()> {
    let cli = Cli::parse();

    let debug = DebugDump::from_flag_or_env(cli.debug);
    init_logging(&cli, debug);

    let config_path = cli.config.clone().unwrap_or_else(DaemonConfig::default_path);
    let overrides = InterfaceOverrides {
        wan: cli.wan.clone(),
        lan: cli.lan.clone(),
    };

    match cli.command {
        Commands::Up => {
            bring_up(&config_path, &overrides, debug).await?;
        }
        Commands::Down => {
            bring_down(&config_path, debug).await?;
        }
        Commands::Run { health_url, health_timeout_secs } => {
            run_watchdog(&config_path, &overrides, health_url, health_timeout_secs, debug).await?;
        }
        Commands::Status { health_timeout_secs } => {
            show_status(&config_path, health_timeout_secs, &cli.format, debug).await?;
        }
        Commands::Check { full } => {
            run_checks(&config_path, full, debug).await?;
        }
        Commands::Version => {
            show_version(&cli.format);
        }
    }

    Ok(())
}
