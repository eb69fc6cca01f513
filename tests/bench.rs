// NVME-LED-BENCH FULL SWEEP AGAINST THE REAL DAEMON
// REQUIRES ROOT, THE INSTALLED DAEMON, ITS CONFIG, AND AN NVME DEVICE.
// RUN: sudo cargo test --test bench --release -- --ignored --nocapture
//
// ALL DEFAULT PROFILES, 5s IDLE + 5s ACTIVE EACH. REPORT LANDS IN
// /tmp/nvme-led-bench/.

use std::fs;
use std::time::Duration;

use nvme_led_bench::config::BenchSettings;
use nvme_led_bench::profile::default_profiles;
use nvme_led_bench::report::{render_table, table_banner, write_csv};
use nvme_led_bench::sweep::Sweep;

const LOG_DIR: &str = "/tmp/nvme-led-bench";
const PHASE_SECS: u64 = 5;

#[test]
#[ignore]
fn full_sweep() {
    let sep = "=".repeat(60);
    println!("{}", sep);
    println!("NVME-LED-BENCH FULL SWEEP");
    println!("{}", sep);
    println!();

    assert_eq!(
        unsafe { libc::geteuid() },
        0,
        "FULL SWEEP REQUIRES ROOT (perf TRACEPOINTS + RAW DEVICE)"
    );

    fs::create_dir_all(LOG_DIR).expect("FAILED TO CREATE LOG DIR");
    let s = BenchSettings {
        idle: Duration::from_secs(PHASE_SECS),
        active: Duration::from_secs(PHASE_SECS),
        tmp_config: format!("{}/profile.conf", LOG_DIR).into(),
        ..BenchSettings::default()
    };
    let base = s.preflight().expect("PRE-FLIGHT FAILED");
    assert!(s.readable_device().is_some(), "LOAD DEVICE UNREADABLE");

    let profiles = default_profiles();
    println!("PROFILES:    {}", profiles.len());
    println!("DURATION:    {}s PER PHASE, 2 PHASES PER PROFILE", PHASE_SECS);
    println!("TOTAL:       ~{}s + OVERHEAD", profiles.len() as u64 * PHASE_SECS * 2);
    println!();

    let rows = Sweep::new(&s, base).run(&profiles, |r| {
        println!("  DONE {} {}", r.profile.label, r.notes)
    });

    println!();
    println!("{}", table_banner());
    for line in render_table(&rows) {
        println!("{}", line);
    }

    let csv = format!("{}/sweep.csv", LOG_DIR);
    write_csv(csv.as_ref(), &rows).expect("FAILED TO WRITE CSV");
    println!("\nSAVED TO {}", csv);

    assert_eq!(rows.len(), profiles.len());
    for r in &rows {
        assert!(!r.idle.is_empty(), "{}: NO IDLE MEASUREMENT ({})", r.profile.label, r.notes);
        assert!(!r.active.is_empty(), "{}: NO ACTIVE MEASUREMENT ({})", r.profile.label, r.notes);
    }

    // FASTER POLLING MUST NOT COST FEWER WAKEUPS THAN THE LAZIEST PROFILE
    let (first, last) = (&rows[0], &rows[rows.len() - 1]);
    if let (Some(fast), Some(slow)) = (first.idle.wakeup_rate, last.idle.wakeup_rate) {
        assert!(
            fast >= slow,
            "{} WAKEUPS {:.2}/s < {} WAKEUPS {:.2}/s",
            first.profile.label,
            fast,
            last.profile.label,
            slow
        );
    }
}
