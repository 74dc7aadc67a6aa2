use super::commands::OutputFormat;
use std::path::Path;
use std::time::Duration;
use tunguard_daemon::{DaemonConfig, StatusSnapshot};
use tunguard_tunnel::{CommandRunner, DebugDump, ProcessSupervisor};
use tunguard_types::{TunguardError, TunguardResult};

pub async fn show_status(
    config_path: &Path,
    health_timeout_secs: Option<u64>,
    format: &OutputFormat,
    debug: DebugDump,
) -> TunguardResult<()> {
    let config = DaemonConfig::load_unvalidated(config_path)?;
    let health_timeout = health_timeout_secs
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.watchdog.health_timeout());

    let supervisor = ProcessSupervisor::system(config.tunnel.settings(), debug);
    let runner = CommandRunner::new(debug);
    let snapshot =
        StatusSnapshot::collect(&config, config_path, &supervisor, &runner, health_timeout).await;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&snapshot)
                .map_err(|e| TunguardError::Internal(format!("Failed to encode status: {}", e)))?;
            println!("{}", json);
        }
        OutputFormat::Text => print_snapshot(&snapshot),
    }

    debug.dump("status_snapshot", &snapshot);
    Ok(())
}

fn print_snapshot(s: &StatusSnapshot) {
    println!("\x1b[38;5;46mtunguard Status\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!("  Time:        {}", s.time_utc.to_rfc3339());
    println!("  Config:      {}", s.config_path.display());

    if s.owned.owned_by_us {
        let color = if s.owned.running { 46 } else { 196 };
        println!(
            "  Tunnel:      owned pid=\x1b[38;5;51m{}\x1b[0m running=\x1b[38;5;{}m{}\x1b[0m",
            s.owned.pid, color, s.owned.running
        );
    } else {
        println!("  Tunnel:      \x1b[38;5;245mno ownership record\x1b[0m");
    }

    if s.has_foreign_tunnel() {
        println!(
            "  External:    pid=\x1b[38;5;51m{}\x1b[0m running={} (matches tunnel config)",
            s.external.pid, s.external.running
        );
    }

    if let Some(ref err) = s.interface_error {
        println!("  Interfaces:  \x1b[38;5;196m{}\x1b[0m", err);
    } else if s.interfaces.is_empty() {
        println!("  Interfaces:  none");
    } else {
        for (i, info) in s.interfaces.iter().enumerate() {
            let label = if i == 0 { "Interfaces:" } else { "" };
            let addrs: Vec<String> = info.addresses.iter().map(|a| a.to_string()).collect();
            let marker = if info.is_ready() { "\x1b[38;5;46m[+]\x1b[0m" } else { "\x1b[38;5;245m[-]\x1b[0m" };
            println!("  {:<12} {} {} {}", label, marker, info.name, addrs.join(", "));
        }
    }

    let pf = &s.packet_filter;
    match pf.error {
        Some(ref err) => println!("  PF:          \x1b[38;5;196munknown\x1b[0m ({})", err),
        None if pf.enabled => println!("  PF:          \x1b[38;5;46menabled\x1b[0m"),
        None => println!("  PF:          \x1b[38;5;214mdisabled\x1b[0m"),
    }

    let h = &s.health;
    let verdict = if h.ok { "\x1b[38;5;46mOK\x1b[0m" } else { "\x1b[38;5;196mFAIL\x1b[0m" };
    println!(
        "  Health:      {} status={} latency={}ms body={:?} err={:?}",
        verdict,
        h.status_code,
        h.latency_ms,
        h.body,
        h.error.as_deref().unwrap_or("")
    );
}
