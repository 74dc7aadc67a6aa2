use super::commands::OutputFormat;
use super::utils::print_banner;
use serde_json::json;
use tunguard_tunnel::DEFAULT_INTERFACE_PREFIX;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(all(target_arch = "x86_64", target_os = "macos"))]
const BUILD_TARGET: &str = "x86_64-apple-darwin";
#[cfg(all(target_arch = "aarch64", target_os = "macos"))]
const BUILD_TARGET: &str = "aarch64-apple-darwin";
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
const BUILD_TARGET: &str = "x86_64-unknown-linux-gnu";
#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
const BUILD_TARGET: &str = "aarch64-unknown-linux-gnu";
#[cfg(not(any(
    all(target_arch = "x86_64", target_os = "macos"),
    all(target_arch = "aarch64", target_os = "macos"),
    all(target_arch = "x86_64", target_os = "linux"),
    all(target_arch = "aarch64", target_os = "linux"),
)))]
const BUILD_TARGET: &str = "unknown";

pub fn show_version(format: &OutputFormat) {
    let profile = if cfg!(debug_assertions) { "debug" } else { "release" };

    if let OutputFormat::Json = format {
        let info = json!({
            "version": BUILD_VERSION,
            "target": BUILD_TARGET,
            "profile": profile,
            "interface_prefix": DEFAULT_INTERFACE_PREFIX,
        });
        println!("{}", info);
        return;
    }

    print_banner();
    println!("\x1b[38;5;46mBuild Information\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!("  Version:   \x1b[38;5;51m{}\x1b[0m", BUILD_VERSION);
    println!("  Target:    \x1b[38;5;245m{}\x1b[0m", BUILD_TARGET);
    println!("  Profile:   \x1b[38;5;245m{}\x1b[0m", profile);
    println!("  Tunnels:   \x1b[38;5;245m{}N interfaces\x1b[0m", DEFAULT_INTERFACE_PREFIX);
}
