// NVME-LED-BENCH METRIC PARSERS
// STATELESS EXTRACTION OF ONE SCALAR FROM EACH TOOL'S TEXT OUTPUT.
// EVERY PARSER RETURNS None INSTEAD OF PANICKING ON UNEXPECTED INPUT.

use regex::Regex;

// LOCALE-TOLERANT DECIMAL: "0.50" AND "0,50" BOTH READ AS 0.5
pub fn parse_decimal(token: &str) -> Option<f64> {
    let t = token.trim();
    if t.is_empty() {
        return None;
    }
    let v = t.replace(',', ".").parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

// INTEGER WITH ARBITRARY THOUSANDS SEPARATORS: "1,234" "1.234" "1 234" "1'234"
pub fn parse_grouped_count(token: &str) -> Option<u64> {
    let digits: String = token.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// PIDSTAT
// ---------------------------------------------------------------------------

// COLUMN OF %CPU COUNTED FROM THE RIGHT. THE TIME COLUMN IS ONE TOKEN IN
// 24H LOCALES AND TWO ("12:00:01 PM") IN 12H ONES, SO LEFT INDICES DRIFT.
fn pidstat_cpu_offset(header: &[&str]) -> Option<usize> {
    let idx = header.iter().position(|t| *t == "%CPU")?;
    Some(header.len() - idx)
}

// PREFERS THE "Average:" ROW; FALLS BACK TO THE MEAN OF ALL SAMPLE ROWS
pub fn parse_pidstat_cpu(output: &str) -> Option<f64> {
    let mut offset: Option<usize> = None;
    let mut average: Option<f64> = None;
    let mut samples: Vec<f64> = Vec::new();

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens.contains(&"%CPU") {
            offset = pidstat_cpu_offset(&tokens);
            continue;
        }
        let Some(off) = offset else { continue };
        if tokens.len() < off {
            continue;
        }
        let Some(value) = parse_decimal(tokens[tokens.len() - off]) else {
            continue;
        };
        if tokens[0].starts_with("Average") {
            average = Some(value);
        } else {
            samples.push(value);
        }
    }

    if average.is_some() {
        return average;
    }
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

// ---------------------------------------------------------------------------
// /proc/PID/status
// ---------------------------------------------------------------------------

// voluntary_ctxt_switches + nonvoluntary_ctxt_switches. BOTH MUST BE PRESENT.
pub fn parse_ctx_switches(status: &str) -> Option<u64> {
    let mut voluntary = None;
    let mut involuntary = None;
    for line in status.lines() {
        if let Some(v) = line.strip_prefix("voluntary_ctxt_switches:") {
            voluntary = v.trim().parse::<u64>().ok();
        } else if let Some(v) = line.strip_prefix("nonvoluntary_ctxt_switches:") {
            involuntary = v.trim().parse::<u64>().ok();
        }
    }
    Some(voluntary? + involuntary?)
}

// COUNTERS THAT WENT BACKWARDS MEAN A DIFFERENT PROCESS. NO RATE.
pub fn ctx_switch_rate(before: Option<u64>, after: Option<u64>, secs: f64) -> Option<f64> {
    let (before, after) = (before?, after?);
    if after < before || secs <= 0.0 {
        return None;
    }
    Some((after - before) as f64 / secs)
}

// ---------------------------------------------------------------------------
// PERF STAT
// ---------------------------------------------------------------------------

pub const WAKEUP_EVENT: &str = "sched:sched_wakeup";

// "      1,523      sched:sched_wakeup   ..."
// <not counted> / <not supported> NEVER MATCH AND YIELD None.
// \b AFTER THE EVENT NAME KEEPS sched_wakeup_new OUT.
pub fn parse_perf_wakeups(output: &str) -> Option<u64> {
    let re = Regex::new(r"(?m)^\s*(\d[\d,.'\u{a0}\u{202f} ]*?)\s+sched:sched_wakeup\b").ok()?;
    let mut total: Option<u64> = None;
    for caps in re.captures_iter(output) {
        if let Some(n) = caps.get(1).and_then(|m| parse_grouped_count(m.as_str())) {
            total = Some(total.unwrap_or(0) + n);
        }
    }
    total
}
