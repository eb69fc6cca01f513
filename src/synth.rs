// NVME-LED-BENCH CONFIG SYNTHESIZER
// REWRITES THE THREE SWEPT KEYS IN THE DAEMON'S key = value CONFIG.
// EVERYTHING ELSE (COMMENTS, BLANK LINES, OTHER KEYS, LINE ENDINGS)
// PASSES THROUGH BYTE-FOR-BYTE.

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

use crate::profile::ProfileSpec;

pub const SWEPT_KEYS: [&str; 3] = ["interval_ms", "read_blink_ms", "write_blink_ms"];

fn profile_value(profile: &ProfileSpec, key: &str) -> u64 {
    match key {
        "interval_ms" => profile.interval_ms,
        "read_blink_ms" => profile.read_blink_ms,
        _ => profile.write_blink_ms,
    }
}

// SPLIT "body\r\n" INTO ("body", "\r\n")
fn split_terminator(line: &str) -> (&str, &str) {
    let body = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
    (body, &line[body.len()..])
}

pub fn synthesize(base: &str, profile: &ProfileSpec) -> String {
    // GROUP 1 KEEPS THE ORIGINAL INDENT, KEY, AND SPACING AROUND '='
    let patterns: Vec<(&str, Option<Regex>)> = SWEPT_KEYS
        .iter()
        .map(|key| (*key, Regex::new(&format!(r"^(\s*{}\s*=[ \t]*)", regex::escape(key))).ok()))
        .collect();
    let mut seen = [false; SWEPT_KEYS.len()];
    let mut out = String::with_capacity(base.len() + 64);

    for line in base.split_inclusive('\n') {
        let (body, term) = split_terminator(line);
        let mut replaced = false;
        for (i, (key, re)) in patterns.iter().enumerate() {
            if seen[i] {
                continue;
            }
            let captured = re.as_ref().and_then(|re| re.captures(body));
            let Some(prefix) = captured.and_then(|c| c.get(1)) else {
                continue;
            };
            out.push_str(prefix.as_str());
            out.push_str(&profile_value(profile, key).to_string());
            out.push_str(term);
            seen[i] = true;
            replaced = true;
            break;
        }
        if !replaced {
            out.push_str(line);
        }
    }

    for (i, key) in SWEPT_KEYS.iter().enumerate() {
        if seen[i] {
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{} = {}\n", key, profile_value(profile, key)));
    }
    out
}

// WRITE THE TRANSIENT PER-PROFILE CONFIG
pub fn write_profile_config(base: &str, profile: &ProfileSpec, out_path: &Path) -> Result<()> {
    let doc = synthesize(base, profile);
    std::fs::write(out_path, doc)
        .with_context(|| format!("writing profile config {}", out_path.display()))
}
