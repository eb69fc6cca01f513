use std::fs::File;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::process::Command;

use anyhow::Result;

use nvme_led_bench::config::BenchSettings;

fn check_tool(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

// ADVISORY ONLY: MANY DISTROS DON'T SHIP /proc/config.gz
fn check_kernel_config() {
    let file = match File::open("/proc/config.gz") {
        Ok(f) => f,
        Err(_) => {
            println!("  /proc/config.gz         NOT FOUND (SKIPPED)");
            return;
        }
    };
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut config = String::new();
    if decoder.read_to_string(&mut config).is_err() {
        println!("  /proc/config.gz         UNREADABLE (SKIPPED)");
        return;
    }
    for opt in ["CONFIG_PERF_EVENTS", "CONFIG_TRACEPOINTS"] {
        if config.contains(&format!("{}=y", opt)) {
            println!("  {:<24}OK", opt);
        } else {
            println!("  {:<24}NOT SET -- perf wakeup counts will be n/a", opt);
        }
    }
}

fn check_paranoid() {
    let level = std::fs::read_to_string("/proc/sys/kernel/perf_event_paranoid")
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok());
    let root = unsafe { libc::geteuid() } == 0;
    match level {
        Some(l) if l > 1 && !root => {
            println!("  perf_event_paranoid     {} (NEEDS ROOT OR <= 1 FOR TRACEPOINTS)", l)
        }
        Some(l) => println!("  perf_event_paranoid     {}", l),
        None => println!("  perf_event_paranoid     UNKNOWN"),
    }
}

pub fn run_check(settings: &BenchSettings) -> Result<()> {
    println!("NVME-LED-BENCH DEPENDENCY CHECK");
    println!();

    let mut ok = true;
    // dd IS REQUIRED; THE MEASUREMENT TOOLS ONLY DEGRADE COLUMNS TO n/a
    let tools = [
        (settings.pidstat.as_str(), false),
        (settings.perf.as_str(), false),
        ("dd", true),
        ("sudo", settings.sudo),
        ("systemctl", settings.service.is_some()),
    ];
    for (tool, required) in &tools {
        if check_tool(tool) {
            println!("  {:<24}OK", tool);
        } else if *required {
            println!("  {:<24}MISSING", tool);
            ok = false;
        } else {
            println!("  {:<24}MISSING (COLUMN WILL BE n/a)", tool);
        }
    }
    println!();

    println!("KERNEL:");
    check_kernel_config();
    check_paranoid();
    println!();

    println!("TARGETS:");
    match std::fs::metadata(&settings.daemon_bin) {
        Ok(m) if m.is_file() && m.permissions().mode() & 0o111 != 0 => {
            println!("  {:<24}OK", settings.daemon_bin.display())
        }
        Ok(_) => {
            println!("  {:<24}NOT EXECUTABLE", settings.daemon_bin.display());
            ok = false;
        }
        Err(_) => {
            println!("  {:<24}NOT FOUND", settings.daemon_bin.display());
            ok = false;
        }
    }
    if File::open(&settings.base_config).is_ok() {
        println!("  {:<24}OK", settings.base_config.display());
    } else {
        println!("  {:<24}UNREADABLE", settings.base_config.display());
        ok = false;
    }
    match (&settings.device, settings.readable_device()) {
        (None, _) => println!("  device                  DISABLED (NO LOAD)"),
        (Some(_), Some(d)) => println!("  {:<24}OK", d.display()),
        (Some(d), None) => {
            println!("  {:<24}UNREADABLE (ACTIVE PHASE WILL RUN WITHOUT LOAD)", d.display())
        }
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        if !check_tool("pidstat") {
            println!("  Install sysstat: pacman -S sysstat / apt install sysstat");
        }
        if !check_tool("perf") {
            println!("  Install perf: pacman -S perf / apt install linux-tools-$(uname -r)");
        }
        std::process::exit(1);
    }

    Ok(())
}
