use nvme_led_bench::profile::ProfileSpec;

pub fn run_profiles(profiles: &[ProfileSpec]) {
    println!(
        "{:<12} {:>9} {:>9} {:>10} {:>9}",
        "PROFILE", "INTERVAL", "READ", "WRITE", "THEORY/S"
    );
    println!(
        "{} {} {} {} {}",
        "-".repeat(12),
        "-".repeat(9),
        "-".repeat(9),
        "-".repeat(10),
        "-".repeat(9)
    );
    for p in profiles {
        println!(
            "{:<12} {:>7}ms {:>7}ms {:>8}ms {:>9.2}",
            p.label,
            p.interval_ms,
            p.read_blink_ms,
            p.write_blink_ms,
            p.theoretical_wakeups_per_sec()
        );
    }
}
