// NVME-LED-BENCH SUBCOMMANDS
// SHARED SWEEP ARGUMENTS: EVERY KNOB IS ALSO READ FROM THE ENVIRONMENT.

pub mod check;
pub mod profiles;
pub mod run;

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use nvme_led_bench::config::{
    BenchSettings, DEFAULT_ACTIVE_SECS, DEFAULT_BASE_CONFIG, DEFAULT_DAEMON, DEFAULT_DEVICE,
    DEFAULT_IDLE_SECS, DEFAULT_STOP_GRACE_MS, DEFAULT_TMP_CONFIG, DEFAULT_WARMUP_SECS,
};
use nvme_led_bench::profile::{default_profiles, ProfileSpec};

// WHAT check NEEDS: THE TARGETS AND THE TOOLS, NOTHING ABOUT THE SWEEP ITSELF
#[derive(Args, Clone, Debug)]
pub struct TargetArgs {
    // DAEMON BINARY UNDER TEST
    #[arg(long, env = "BENCH_DAEMON", default_value = DEFAULT_DAEMON)]
    pub daemon: PathBuf,

    // BASE CONFIG; NEVER MODIFIED
    #[arg(long, env = "BENCH_BASE_CONFIG", default_value = DEFAULT_BASE_CONFIG)]
    pub base_config: PathBuf,

    // BLOCK DEVICE FOR THE ACTIVE-PHASE READ BURSTS
    #[arg(long, env = "BENCH_DEVICE", default_value = DEFAULT_DEVICE)]
    pub device: PathBuf,

    // SKIP SYNTHETIC LOAD ENTIRELY
    #[arg(long)]
    pub no_load: bool,

    // LAUNCH (AND SIGNAL) THE DAEMON THROUGH sudo -n
    #[arg(long, env = "BENCH_SUDO")]
    pub sudo: bool,

    // SYSTEMD UNIT TO STOP BEFORE THE SWEEP
    #[arg(long, env = "BENCH_SERVICE")]
    pub service: Option<String>,

    #[arg(long, env = "BENCH_PIDSTAT", default_value = "pidstat")]
    pub pidstat: String,

    #[arg(long, env = "BENCH_PERF", default_value = "perf")]
    pub perf: String,
}

impl TargetArgs {
    pub fn settings(&self) -> BenchSettings {
        BenchSettings {
            daemon_bin: self.daemon.clone(),
            base_config: self.base_config.clone(),
            device: if self.no_load { None } else { Some(self.device.clone()) },
            sudo: self.sudo,
            service: self.service.clone(),
            pidstat: self.pidstat.clone(),
            perf: self.perf.clone(),
            ..BenchSettings::default()
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct SweepArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    // PER-PROFILE CONFIG WRITTEN HERE AND PASSED TO THE DAEMON
    #[arg(long, env = "BENCH_TMP_CONFIG", default_value = DEFAULT_TMP_CONFIG)]
    pub tmp_config: PathBuf,

    #[arg(long, env = "BENCH_IDLE_SECS", default_value_t = DEFAULT_IDLE_SECS)]
    pub idle_secs: u64,

    #[arg(long, env = "BENCH_ACTIVE_SECS", default_value_t = DEFAULT_ACTIVE_SECS)]
    pub active_secs: u64,

    // SETTLE TIME BETWEEN SPAWN AND PID RESOLUTION
    #[arg(long, env = "BENCH_WARMUP_SECS", default_value_t = DEFAULT_WARMUP_SECS)]
    pub warmup_secs: u64,

    #[arg(long, default_value_t = DEFAULT_STOP_GRACE_MS)]
    pub stop_grace_ms: u64,

    // WRITE ONE CSV LINE PER PROFILE HERE
    #[arg(long, env = "BENCH_CSV")]
    pub csv: Option<PathBuf>,

    // START THE UNIT AGAIN AFTER THE SWEEP
    #[arg(long, requires = "service")]
    pub restore_service: bool,

    // REPLACES THE BUILT-IN LIST; REPEAT FOR EACH PROFILE, ORDER IS KEPT
    #[arg(long = "profile", value_name = "LABEL:INTERVAL:READ:WRITE")]
    pub profiles: Vec<ProfileSpec>,
}

impl SweepArgs {
    pub fn settings(&self) -> BenchSettings {
        BenchSettings {
            tmp_config: self.tmp_config.clone(),
            idle: Duration::from_secs(self.idle_secs),
            active: Duration::from_secs(self.active_secs),
            warmup: Duration::from_secs(self.warmup_secs),
            stop_grace: Duration::from_millis(self.stop_grace_ms),
            csv: self.csv.clone(),
            restore_service: self.restore_service,
            ..self.target.settings()
        }
    }

    pub fn profile_list(&self) -> Vec<ProfileSpec> {
        if self.profiles.is_empty() {
            default_profiles()
        } else {
            self.profiles.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Check {
        #[command(flatten)]
        target: TargetArgs,
    }

    #[derive(Parser)]
    struct Run {
        #[command(flatten)]
        sweep: SweepArgs,
    }

    #[test]
    fn check_rejects_sweep_only_flags() {
        assert!(Check::try_parse_from(["check", "--daemon", "/bin/true"]).is_ok());
        assert!(Check::try_parse_from(["check", "--profile", "a:1:1:1"]).is_err());
        assert!(Check::try_parse_from(["check", "--csv", "/tmp/x.csv"]).is_err());
        assert!(Check::try_parse_from(["check", "--idle-secs", "3"]).is_err());
    }

    #[test]
    fn run_keeps_target_and_sweep_flags() {
        let r = Run::try_parse_from([
            "run",
            "--daemon",
            "/opt/led/daemon",
            "--no-load",
            "--idle-secs",
            "3",
            "--profile",
            "fast:4:8:12",
        ])
        .unwrap();
        let s = r.sweep.settings();
        assert_eq!(s.daemon_bin, PathBuf::from("/opt/led/daemon"));
        assert_eq!(s.device, None);
        assert_eq!(s.idle, Duration::from_secs(3));
        assert_eq!(r.sweep.profile_list(), vec![ProfileSpec::new("fast", 4, 8, 12)]);
    }
}
