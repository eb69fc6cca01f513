// NVME-LED-BENCH REPORT
// FIXED-WIDTH CONSOLE TABLE + OPTIONAL CSV. SAME ROWS, SAME ORDER, SAME
// VALUES (2 DECIMALS) IN BOTH. MISSING VALUES: "n/a" IN THE TABLE, EMPTY
// FIELD IN THE CSV.

use std::path::Path;

use anyhow::{Context, Result};

use crate::profile::BenchmarkRow;

pub const NA: &str = "n/a";

pub const CSV_HEADER: &str = "profile,interval_ms,read_blink_ms,write_blink_ms,theory_wps,\
cpu_idle,ctxsw_idle,perf_idle,cpu_active,ctxsw_active,perf_active";

fn value(v: Option<f64>) -> Option<String> {
    v.map(|x| format!("{:.2}", x))
}

fn cell(v: Option<f64>) -> String {
    value(v).unwrap_or_else(|| NA.to_string())
}

pub fn render_table(rows: &[BenchmarkRow]) -> Vec<String> {
    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(format!(
        "{:<12} {:>8} {:>9} {:>8} {:>10} {:>10} {:>8} {:>10} {:>10}  {}",
        "PROFILE",
        "INTERVAL",
        "THEORY/S",
        "CPU%",
        "CTXSW/S",
        "WAKE/S",
        "CPU%",
        "CTXSW/S",
        "WAKE/S",
        "NOTES"
    ));
    out.push(format!(
        "{} {} {} {} {} {} {} {} {}  {}",
        "-".repeat(12),
        "-".repeat(8),
        "-".repeat(9),
        "-".repeat(8),
        "-".repeat(10),
        "-".repeat(10),
        "-".repeat(8),
        "-".repeat(10),
        "-".repeat(10),
        "-".repeat(5),
    ));
    for r in rows {
        out.push(format!(
            "{:<12} {:>6}ms {:>9.2} {:>8} {:>10} {:>10} {:>8} {:>10} {:>10}  {}",
            r.profile.label,
            r.profile.interval_ms,
            r.theoretical_wakeups_per_sec,
            cell(r.idle.cpu_percent),
            cell(r.idle.ctx_switch_rate),
            cell(r.idle.wakeup_rate),
            cell(r.active.cpu_percent),
            cell(r.active.ctx_switch_rate),
            cell(r.active.wakeup_rate),
            r.notes,
        ));
    }
    out
}

// PHASE GROUPING ABOVE THE TABLE HEADER
pub fn table_banner() -> String {
    format!(
        "{:<12} {:>8} {:>9} {:<30} {:<30}",
        "", "", "", "  -------- IDLE --------", "  ------- ACTIVE -------"
    )
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn csv_line(r: &BenchmarkRow) -> String {
    let opt = |v: Option<f64>| value(v).unwrap_or_default();
    [
        csv_field(&r.profile.label),
        r.profile.interval_ms.to_string(),
        r.profile.read_blink_ms.to_string(),
        r.profile.write_blink_ms.to_string(),
        format!("{:.2}", r.theoretical_wakeups_per_sec),
        opt(r.idle.cpu_percent),
        opt(r.idle.ctx_switch_rate),
        opt(r.idle.wakeup_rate),
        opt(r.active.cpu_percent),
        opt(r.active.ctx_switch_rate),
        opt(r.active.wakeup_rate),
    ]
    .join(",")
}

pub fn render_csv(rows: &[BenchmarkRow]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for r in rows {
        out.push_str(&csv_line(r));
        out.push('\n');
    }
    out
}

pub fn write_csv(path: &Path, rows: &[BenchmarkRow]) -> Result<()> {
    std::fs::write(path, render_csv(rows)).with_context(|| format!("writing {}", path.display()))
}
