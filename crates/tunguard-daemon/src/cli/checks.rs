use super::utils::is_root;
use std::io::Write;
use std::path::Path;
use tunguard_daemon::config::executable_file;
use tunguard_daemon::DaemonConfig;
use tunguard_tunnel::{DebugDump, HealthCheck, HttpHealthProbe, ProcessSupervisor};
use tunguard_types::TunguardResult;

const TOTAL: usize = 8;

#[derive(Default)]
struct Tally {
    passed: u32,
    warnings: u32,
    failed: u32,
}

impl Tally {
    fn label(&self, step: usize, label: &str) {
        print!("[{}/{}] {:<20}", step, TOTAL, format!("{}:", label));
        let _ = std::io::stdout().flush();
    }

    fn ok(&mut self, detail: impl AsRef<str>) {
        println!("\x1b[38;5;46mOK\x1b[0m{}", suffix(detail.as_ref(), " "));
        self.passed += 1;
    }

    fn warn(&mut self, detail: impl AsRef<str>) {
        println!("\x1b[38;5;226mWARN\x1b[0m{}", suffix(detail.as_ref(), " - "));
        self.warnings += 1;
    }

    fn fail(&mut self, detail: impl AsRef<str>) {
        println!("\x1b[38;5;196mFAIL\x1b[0m{}", suffix(detail.as_ref(), " - "));
        self.failed += 1;
    }
}

fn suffix(detail: &str, sep: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!("{}{}", sep, detail)
    }
}

pub async fn run_checks(config_path: &Path, full: bool, debug: DebugDump) -> TunguardResult<()> {
    println!("\x1b[38;5;46mtunguard Diagnostics\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!();

    let mut t = Tally::default();

    t.label(1, "Configuration");
    let config = match DaemonConfig::load_unvalidated(config_path) {
        Ok(config) => {
            let problems = config.problems();
            if !problems.is_empty() {
                t.fail(problems.join("; "));
            } else if !config_path.exists() {
                t.warn("Using defaults");
            } else {
                t.ok("");
            }
            config
        }
        Err(e) => {
            t.fail(e.to_string());
            DaemonConfig::default()
        }
    };

    t.label(2, "Setup Script");
    match executable_file(&config.scripts.setup) {
        Ok(()) => t.ok(""),
        Err(e) => t.fail(e),
    }

    t.label(3, "Policy Script");
    match executable_file(&config.scripts.policy_apply) {
        Ok(()) => t.ok(""),
        Err(e) => t.fail(e),
    }

    t.label(4, "Down Script");
    match executable_file(&config.scripts.down) {
        Ok(()) => t.ok(""),
        Err(e) => t.warn(format!("{} (`tunguard down` will fail)", e)),
    }

    t.label(5, "Tunnel Binary");
    if !config.tunnel.auto_start {
        t.warn("auto_start off; an external tunnel is required");
    } else {
        match executable_file(&config.tunnel.binary) {
            Ok(()) => t.ok(format!("({})", config.tunnel.binary.display())),
            Err(e) => t.fail(e),
        }
    }

    t.label(6, "Privilege");
    if is_root() {
        t.ok("(root)");
    } else {
        t.warn("Not root (up/down/run need sudo)");
    }

    let supervisor = ProcessSupervisor::system(config.tunnel.settings(), debug);

    t.label(7, "Tunnel Process");
    let owned = supervisor.inspect();
    if owned.owned_by_us && owned.running {
        t.ok(format!("(owned pid={})", owned.pid));
    } else {
        let stale = owned.owned_by_us;
        let external = supervisor.inspect_external().await;
        if external.running && config.tunnel.adopt_external() {
            t.ok(format!("(external pid={}, adoptable)", external.pid));
        } else if external.running {
            t.warn(format!("External pid={} running but adoption is off", external.pid));
        } else if stale {
            t.warn(format!("Ownership record points at dead pid {}", owned.pid));
        } else {
            t.warn("Not running");
        }
    }

    t.label(8, "Tunnel Interfaces");
    match supervisor.interfaces().snapshot() {
        Ok(snapshot) if snapshot.is_empty() => t.warn("None present"),
        Ok(snapshot) => {
            let ready = snapshot.ready_names();
            if ready.is_empty() {
                t.warn(format!("{} present, none with a routable address", snapshot.len()));
            } else {
                t.ok(format!("({} ready: {})", ready.len(), ready.join(", ")));
            }
        }
        Err(e) => t.fail(e.to_string()),
    }

    if full {
        println!();
        println!("Extended Checks");
        println!("---------------");

        print!("[E1] {:<20}", "Egress Health:");
        let _ = std::io::stdout().flush();
        let probe = HttpHealthProbe::new(
            config.watchdog.health_url.clone(),
            config.watchdog.health_timeout(),
            config.network.vpn_server_ips.clone(),
        );
        match probe {
            Ok(probe) => {
                let health = probe.check().await;
                if health.ok {
                    t.ok(format!("({} in {}ms)", health.body, health.latency_ms));
                } else {
                    t.fail(health.error.unwrap_or_else(|| format!("status {}", health.status_code)));
                }
            }
            Err(e) => t.fail(e.to_string()),
        }
    }

    println!();
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!("Results: \x1b[38;5;46m{} passed\x1b[0m, \x1b[38;5;226m{} warnings\x1b[0m, \x1b[38;5;196m{} failed\x1b[0m", t.passed, t.warnings, t.failed);

    if t.failed > 0 {
        println!("\n\x1b[38;5;196mSome checks failed. Fix issues before running.\x1b[0m");
    } else if t.warnings > 0 {
        println!("\n\x1b[38;5;226mAll critical checks passed. Some warnings may need attention.\x1b[0m");
    } else {
        println!("\n\x1b[38;5;46mAll checks passed! Ready to run.\x1b[0m");
    }

    Ok(())
}
