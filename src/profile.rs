// NVME-LED-BENCH PROFILES AND RESULT TYPES
// PURE-RUST MODULE: NO PROCESSES, NO FILESYSTEM.
// SHARED BETWEEN THE BINARY (SWEEP, REPORT) AND THE INTEGRATION TESTS.

use std::fmt;
use std::str::FromStr;

// ONE POINT IN THE SWEEP. ORDER IN THE LIST IS EXECUTION ORDER.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileSpec {
    pub label: String,
    pub interval_ms: u64,
    pub read_blink_ms: u64,
    pub write_blink_ms: u64,
}

impl ProfileSpec {
    pub fn new(label: &str, interval_ms: u64, read_blink_ms: u64, write_blink_ms: u64) -> Self {
        Self {
            label: label.to_string(),
            interval_ms,
            read_blink_ms,
            write_blink_ms,
        }
    }

    pub fn theoretical_wakeups_per_sec(&self) -> f64 {
        theoretical_wakeups_per_sec(self.interval_ms)
    }
}

// TIMER-DRIVEN WAKEUPS IMPLIED BY THE POLL INTERVAL ALONE
pub fn theoretical_wakeups_per_sec(interval_ms: u64) -> f64 {
    1000.0 / interval_ms as f64
}

// LABEL:INTERVAL:READ:WRITE  (e.g. "balanced:10:10:20")
impl FromStr for ProfileSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(format!("expected LABEL:INTERVAL:READ:WRITE, got '{}'", s));
        }
        let label = parts[0].trim();
        if label.is_empty() {
            return Err("profile label is empty".to_string());
        }
        let num = |name: &str, v: &str| -> Result<u64, String> {
            v.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid {} '{}': {}", name, v, e))
        };
        let interval_ms = num("interval_ms", parts[1])?;
        if interval_ms == 0 {
            return Err("interval_ms must be > 0".to_string());
        }
        Ok(Self {
            label: label.to_string(),
            interval_ms,
            read_blink_ms: num("read_blink_ms", parts[2])?,
            write_blink_ms: num("write_blink_ms", parts[3])?,
        })
    }
}

impl fmt::Display for ProfileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.label, self.interval_ms, self.read_blink_ms, self.write_blink_ms
        )
    }
}

// FASTEST POLL FIRST. THE DAEMON'S OWN DEFAULT (8MS/12MS) SITS IN THE MIDDLE.
pub fn default_profiles() -> Vec<ProfileSpec> {
    vec![
        ProfileSpec::new("aggressive", 4, 8, 12),
        ProfileSpec::new("default", 8, 12, 12),
        ProfileSpec::new("balanced", 10, 10, 20),
        ProfileSpec::new("relaxed", 20, 20, 40),
        ProfileSpec::new("lazy", 50, 40, 60),
    ]
}

// ONE PHASE WINDOW. EACH SOURCE FAILS INDEPENDENTLY.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhaseMeasurement {
    pub cpu_percent: Option<f64>,
    pub ctx_switch_rate: Option<f64>,
    pub wakeup_rate: Option<f64>,
}

impl PhaseMeasurement {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu_percent.is_none() && self.ctx_switch_rate.is_none() && self.wakeup_rate.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkRow {
    pub profile: ProfileSpec,
    pub theoretical_wakeups_per_sec: f64,
    pub idle: PhaseMeasurement,
    pub active: PhaseMeasurement,
    pub notes: String,
}

impl BenchmarkRow {
    pub fn measured(
        profile: &ProfileSpec,
        idle: PhaseMeasurement,
        active: PhaseMeasurement,
        notes: String,
    ) -> Self {
        Self {
            profile: profile.clone(),
            theoretical_wakeups_per_sec: profile.theoretical_wakeups_per_sec(),
            idle,
            active,
            notes,
        }
    }

    // ROW FOR A PROFILE THAT NEVER REACHED MEASUREMENT
    pub fn failed(profile: &ProfileSpec, notes: impl Into<String>) -> Self {
        Self::measured(
            profile,
            PhaseMeasurement::unavailable(),
            PhaseMeasurement::unavailable(),
            notes.into(),
        )
    }
}
