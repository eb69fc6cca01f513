// NVME-LED-BENCH SETTINGS
// EVERYTHING THE SWEEP NEEDS, RESOLVED ONCE (CLI / ENVIRONMENT / DEFAULTS)
// AND HANDED TO THE CONTROLLER EXPLICITLY.

use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::BenchError;

pub const DEFAULT_DAEMON: &str = "/usr/local/bin/nvme-led-daemon";
pub const DEFAULT_BASE_CONFIG: &str = "/etc/nvme-led-daemon.conf";
pub const DEFAULT_TMP_CONFIG: &str = "/tmp/nvme-led-bench.conf";
pub const DEFAULT_DEVICE: &str = "/dev/nvme0n1";
pub const DEFAULT_IDLE_SECS: u64 = 10;
pub const DEFAULT_ACTIVE_SECS: u64 = 10;
pub const DEFAULT_WARMUP_SECS: u64 = 1;
pub const DEFAULT_STOP_GRACE_MS: u64 = 2000;

#[derive(Clone, Debug)]
pub struct BenchSettings {
    pub daemon_bin: PathBuf,
    pub base_config: PathBuf,
    pub tmp_config: PathBuf,
    // None DISABLES SYNTHETIC LOAD (ACTIVE PHASE MEASURES IDLE-LIKE BEHAVIOR)
    pub device: Option<PathBuf>,
    pub idle: Duration,
    pub active: Duration,
    pub warmup: Duration,
    pub stop_grace: Duration,
    pub csv: Option<PathBuf>,
    // LAUNCH THE DAEMON THROUGH sudo (THE SPAWNED PID IS THEN sudo, NOT THE DAEMON)
    pub sudo: bool,
    // SYSTEM SERVICE OWNING THE LED (STOPPED BEFORE THE SWEEP)
    pub service: Option<String>,
    pub restore_service: bool,
    pub pidstat: String,
    pub perf: String,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            daemon_bin: PathBuf::from(DEFAULT_DAEMON),
            base_config: PathBuf::from(DEFAULT_BASE_CONFIG),
            tmp_config: PathBuf::from(DEFAULT_TMP_CONFIG),
            device: Some(PathBuf::from(DEFAULT_DEVICE)),
            idle: Duration::from_secs(DEFAULT_IDLE_SECS),
            active: Duration::from_secs(DEFAULT_ACTIVE_SECS),
            warmup: Duration::from_secs(DEFAULT_WARMUP_SECS),
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
            csv: None,
            sudo: false,
            service: None,
            restore_service: false,
            pidstat: "pidstat".to_string(),
            perf: "perf".to_string(),
        }
    }
}

impl BenchSettings {
    // comm THE DAEMON IS EXPECTED TO RUN UNDER
    pub fn daemon_name(&self) -> String {
        self.daemon_bin
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    // FATAL CHECKS BEFORE ANY PROFILE RUNS. RETURNS THE BASE DOCUMENT.
    // A DAEMON THAT EXISTS BUT CANNOT EXECUTE IS NOT FATAL: EACH PROFILE
    // REPORTS ITS OWN START FAILURE.
    pub fn preflight(&self) -> Result<String, BenchError> {
        let base = std::fs::read_to_string(&self.base_config).map_err(|e| {
            BenchError::Fatal(format!(
                "cannot read base config {}: {}",
                self.base_config.display(),
                e
            ))
        })?;
        if !self.daemon_bin.is_file() {
            return Err(BenchError::Fatal(format!(
                "daemon binary {} not found",
                self.daemon_bin.display()
            )));
        }
        if self.daemon_name().is_empty() {
            return Err(BenchError::Fatal(format!(
                "daemon path {} has no file name",
                self.daemon_bin.display()
            )));
        }
        if self.idle.is_zero() || self.active.is_zero() {
            return Err(BenchError::Fatal("phase durations must be at least 1s".to_string()));
        }
        if self.tmp_config == self.base_config {
            return Err(BenchError::Fatal(
                "transient config path must differ from the base config".to_string(),
            ));
        }
        Ok(base)
    }

    // DEVICE THE ACTIVITY GENERATOR CAN ACTUALLY READ
    pub fn readable_device(&self) -> Option<PathBuf> {
        let dev = self.device.as_ref()?;
        File::open(dev).ok().map(|_| dev.clone())
    }
}
