use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "tunguard")]
#[command(version = BUILD_VERSION)]
#[command(about = "tunguard - VPN tunnel watchdog and router policy driver")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(short, long, global = true, value_name = "FILE", env = "TUNGUARD_CONFIG", help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable debug dumps (or set TUNGUARD_DEBUG=1)")]
    pub debug: bool,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,

    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[arg(long, global = true, value_name = "FILE", help = "Write logs to file")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[arg(long, global = true, default_value = "text", help = "Output format")]
    pub format: OutputFormat,

    #[arg(long, global = true, value_name = "IFACE", help = "Override WAN interface")]
    pub wan: Option<String>,

    #[arg(long, global = true, value_name = "IFACE", help = "Override LAN interface")]
    pub lan: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Bring the router up (setup, tunnel, policy)")]
    #[command(long_about = "Run the setup script, make sure a tunnel is running and load the policy rules for its interface.\n\nRequires root.")]
    Up,

    #[command(about = "Stop the owned tunnel and restore normal routing")]
    Down,

    #[command(about = "Run the health watchdog until interrupted")]
    #[command(long_about = "Probe egress health on a fixed interval and restart the tunnel and reload policy on sustained failure.\n\nA recovery budget bounds the number of restarts. Requires root.")]
    Run {
        #[arg(long, value_name = "URL", help = "Override the health URL")]
        health_url: Option<String>,
        #[arg(long, value_name = "SECS", help = "Override the health timeout (also used as the check interval)")]
        health_timeout_secs: Option<u64>,
    },

    #[command(about = "Show tunnel, interface and health status")]
    Status {
        #[arg(long, value_name = "SECS", help = "Override the health timeout")]
        health_timeout_secs: Option<u64>,
    },

    #[command(about = "Run diagnostic checks")]
    Check {
        #[arg(long, help = "Include a live health probe")]
        full: bool,
    },

    #[command(about = "Show version information")]
    Version,
}
