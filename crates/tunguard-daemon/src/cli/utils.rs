use super::commands::Cli;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tunguard_daemon::NetworkConfig;
use tunguard_tunnel::DebugDump;
use tunguard_types::{CommandResult, TunguardError, TunguardResult};

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Keeps `--debug` dumps visible under `-q` or a quieter `RUST_LOG`.
const DUMP_DIRECTIVE: &str = "tunguard::dump=info";

pub fn init_logging(cli: &Cli, debug: DebugDump) {
    let level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "info,tunguard=debug,tunguard_daemon=debug,tunguard_tunnel=debug",
            2 => "debug",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    let env_filter = with_dump_directive(env_filter, debug.enabled());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter);

    let log_file = cli.log_file.as_ref().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("Failed to open log file {:?}: {}; logging to stderr", path, e))
            .ok()
    });

    match (log_file, cli.log_json) {
        (Some(file), true) => {
            let file_layer = fmt::layer()
                .json()
                .with_writer(std::sync::Mutex::new(file));
            subscriber.with(file_layer).init();
        }
        (Some(file), false) => {
            let file_layer = fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false);
            subscriber.with(file_layer).init();
        }
        (None, true) => {
            let stderr_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr);
            subscriber.with(stderr_layer).init();
        }
        (None, false) => {
            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(cli.verbose >= 2);
            subscriber.with(stderr_layer).init();
        }
    }
}

fn with_dump_directive(filter: EnvFilter, debug: bool) -> EnvFilter {
    if !debug {
        return filter;
    }
    match DUMP_DIRECTIVE.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

pub fn print_banner() {
    println!("\x1b[38;5;46m");
    println!(r#"
    ▀█▀ █ █ █▄ █ █▀▀ █ █ ▄▀█ █▀█ █▀▄
     █  █▄█ █ ▀█ █▄█ █▄█ █▀█ █▀▄ █▄▀"#);
    println!("\x1b[0m");
    println!("        \x1b[38;5;245mTunnel Watchdog - v{}\x1b[0m", BUILD_VERSION);
    println!();
}

pub fn require_root() -> TunguardResult<()> {
    #[cfg(unix)]
    {
        if nix::unistd::geteuid().is_root() {
            return Ok(());
        }
    }
    Err(TunguardError::Privilege(
        "this command must run as root (use: sudo tunguard <cmd>)".into(),
    ))
}

pub fn is_root() -> bool {
    require_root().is_ok()
}

/// WAN/LAN from command-line flags, falling back to the config file
/// (which already carries environment overrides).
#[derive(Clone, Debug, Default)]
pub struct InterfaceOverrides {
    pub wan: Option<String>,
    pub lan: Option<String>,
}

impl InterfaceOverrides {
    pub fn resolve(&self, network: &NetworkConfig) -> (Option<String>, Option<String>) {
        let pick = |flag: &Option<String>, configured: Option<&str>| {
            flag.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .or(configured)
                .map(str::to_string)
        };
        (pick(&self.wan, network.wan()), pick(&self.lan, network.lan()))
    }

    /// Both interfaces or a config error naming where to set them.
    pub fn require(&self, network: &NetworkConfig) -> TunguardResult<(String, String)> {
        match self.resolve(network) {
            (Some(wan), Some(lan)) => Ok((wan, lan)),
            _ => Err(missing_interfaces()),
        }
    }
}

pub fn missing_interfaces() -> TunguardError {
    TunguardError::Config(
        "WAN/LAN interfaces not set; set network.wan_interface/lan_interface or pass --wan/--lan".into(),
    )
}

/// Finds the first `WAN: <if>  LAN: <if>` line a setup script announced.
pub fn parse_wan_lan(stdout: &str) -> Option<(String, String)> {
    stdout.lines().find_map(|line| {
        let rest = line.trim_end().strip_prefix("WAN:")?.trim_start();
        let split = rest.find(char::is_whitespace)?;
        let (wan, rest) = rest.split_at(split);
        let lan = rest.trim_start().strip_prefix("LAN:")?.trim_start();
        if wan.is_empty() || lan.is_empty() || lan.contains(char::is_whitespace) {
            return None;
        }
        Some((wan.to_string(), lan.to_string()))
    })
}

pub fn format_script_failure(tag: &str, err: &TunguardError) -> String {
    let Some(output) = err.command_output() else {
        return format!("{}: {}", tag, err);
    };

    let mut msg = format!("{} failed: {} (exit={})", tag, err, output.exit_code);
    if !output.stdout.is_empty() {
        msg.push_str("\nstdout:\n");
        msg.push_str(&output.stdout);
    }
    if !output.stderr.is_empty() {
        msg.push_str("\nstderr:\n");
        msg.push_str(&output.stderr);
    }
    msg
}

pub fn print_script_success(tag: &str, output: &CommandResult) {
    println!("\x1b[38;5;46m{}: ok\x1b[0m", tag);
    match (output.stdout.is_empty(), output.stderr.is_empty()) {
        (false, false) => println!("stdout:\n{}\nstderr:\n{}", output.stdout, output.stderr),
        (false, true) => println!("{}", output.stdout),
        (true, false) => println!("{}", output.stderr),
        (true, true) => {}
    }
}

/// Reports a failed script with its captured output, then hands the error back.
pub fn script_failed(tag: &str, err: TunguardError) -> TunguardError {
    eprintln!("\x1b[38;5;196m{}\x1b[0m", format_script_failure(tag, &err));
    err
}

pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => { info!("Received SIGTERM"); }
                    _ = sigint.recv() => { info!("Received SIGINT"); }
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers: {}", e);
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
