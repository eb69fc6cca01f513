use std::process::Command;
use std::sync::atomic::AtomicBool;

use anyhow::{anyhow, Result};
use log::warn;

use nvme_led_bench::config::BenchSettings;
use nvme_led_bench::daemon::{start_service, stop_service};
use nvme_led_bench::profile::ProfileSpec;
use nvme_led_bench::report::{render_table, table_banner, write_csv};
use nvme_led_bench::sweep::Sweep;

fn tool_status(name: &str) -> &'static str {
    let found = Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if found { "ok" } else { "MISSING (n/a)" }
}

pub fn run_sweep(
    settings: &BenchSettings,
    profiles: &[ProfileSpec],
    shutdown: &AtomicBool,
    abort: &AtomicBool,
) -> Result<()> {
    // FATAL CONDITIONS END THE RUN HERE, BEFORE ANY PROFILE STARTS
    let base = settings.preflight().map_err(|e| anyhow!("PRE-FLIGHT FAILED: {}", e))?;

    let sep = "=".repeat(60);
    println!("{}", sep);
    println!("NVME-LED-BENCH v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", sep);
    println!(
        "DAEMON:          {}{}",
        settings.daemon_bin.display(),
        if settings.sudo { " (via sudo)" } else { "" }
    );
    println!("BASE CONFIG:     {}", settings.base_config.display());
    println!("PROFILE CONFIG:  {}", settings.tmp_config.display());
    println!(
        "LOAD DEVICE:     {}",
        match (&settings.device, settings.readable_device()) {
            (None, _) => "DISABLED".to_string(),
            (Some(_), Some(d)) => d.display().to_string(),
            (Some(d), None) => format!("{} (UNREADABLE -- NO LOAD)", d.display()),
        }
    );
    println!(
        "WINDOWS:         idle {}s, active {}s, warm-up {}s",
        settings.idle.as_secs(),
        settings.active.as_secs(),
        settings.warmup.as_secs()
    );
    println!("PIDSTAT:         {}", tool_status(&settings.pidstat));
    println!("PERF:            {}", tool_status(&settings.perf));
    println!("PROFILES:        {}", profiles.len());
    println!(
        "TOTAL:           ~{}s + OVERHEAD",
        profiles.len() as u64 * (settings.idle + settings.active + settings.warmup).as_secs()
    );
    println!();

    if let Some(svc) = &settings.service {
        println!("STOPPING SERVICE {}", svc);
        if let Err(e) = stop_service(svc, settings.sudo) {
            warn!("{:#}", e);
        }
    }

    let sweep = Sweep::new(settings, base).with_shutdown(shutdown).with_abort(abort);
    let rows = sweep.run(profiles, |row| {
        if row.notes.is_empty() {
            println!("  DONE {}", row.profile.label);
        } else {
            println!("  DONE {} ({})", row.profile.label, row.notes);
        }
        println!();
    });

    let _ = std::fs::remove_file(&settings.tmp_config);

    if settings.restore_service {
        if let Some(svc) = &settings.service {
            println!("RESTARTING SERVICE {}", svc);
            if let Err(e) = start_service(svc, settings.sudo) {
                warn!("{:#}", e);
            }
        }
    }

    println!("{}", sep);
    println!("NVME-LED-BENCH RESULTS");
    println!("{}", sep);
    println!("{}", table_banner());
    for line in render_table(&rows) {
        println!("{}", line);
    }
    println!("{}", sep);

    if let Some(path) = &settings.csv {
        write_csv(path, &rows)?;
        println!("\nSAVED TO {}", path.display());
    }
    Ok(())
}
