// NVME-LED-BENCH PROFILE SWEEP
// PER PROFILE, STRICTLY SERIAL:
//   SYNTHESIZE CONFIG -> START DAEMON -> MEASURE IDLE
//   -> START ACTIVITY + MEASURE ACTIVE -> STOP ACTIVITY -> STOP DAEMON -> ROW
//
// A PROFILE THAT CANNOT START STILL PRODUCES A ROW (ALL n/a + NOTE).
// NOTHING ABOVE A SINGLE PROFILE EVER FAILS.
//
// shutdown: FINISH THE CURRENT PHASE, THEN EVERY REMAINING ROW IS "interrupted".
// abort:    ALSO CUT THE CURRENT PHASE SHORT. THE DAEMON IS STILL STOPPED.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::activity::ActivityGenerator;
use crate::config::BenchSettings;
use crate::daemon::{DaemonHandle, DaemonManager};
use crate::profile::{BenchmarkRow, PhaseMeasurement, ProfileSpec};
use crate::sampler::PhaseSampler;
use crate::synth::write_profile_config;

pub struct Sweep<'a> {
    settings: &'a BenchSettings,
    base: String,
    daemon: DaemonManager,
    sampler: PhaseSampler,
    activity: ActivityGenerator,
    shutdown: Option<&'a AtomicBool>,
    abort: &'a AtomicBool,
}

static NEVER: AtomicBool = AtomicBool::new(false);

impl<'a> Sweep<'a> {
    // base IS THE PRE-FLIGHTED BASE CONFIG DOCUMENT
    pub fn new(settings: &'a BenchSettings, base: String) -> Self {
        Self {
            settings,
            base,
            daemon: DaemonManager::new(settings),
            sampler: PhaseSampler::new(settings),
            activity: ActivityGenerator::new(settings.readable_device()),
            shutdown: None,
            abort: &NEVER,
        }
    }

    pub fn with_shutdown(mut self, flag: &'a AtomicBool) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn with_abort(mut self, flag: &'a AtomicBool) -> Self {
        self.abort = flag;
        self
    }

    fn interrupted(&self) -> bool {
        self.aborted() || self.shutdown.is_some_and(|f| f.load(Ordering::Relaxed))
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    // ONE ROW PER DECLARED PROFILE, IN DECLARED ORDER
    pub fn run(
        &self,
        profiles: &[ProfileSpec],
        mut on_row: impl FnMut(&BenchmarkRow),
    ) -> Vec<BenchmarkRow> {
        let mut rows = Vec::with_capacity(profiles.len());
        for (i, profile) in profiles.iter().enumerate() {
            let row = if self.interrupted() {
                BenchmarkRow::failed(profile, "interrupted")
            } else {
                println!(
                    "[{}/{}] PROFILE {} (interval={}ms read={}ms write={}ms)",
                    i + 1,
                    profiles.len(),
                    profile.label,
                    profile.interval_ms,
                    profile.read_blink_ms,
                    profile.write_blink_ms
                );
                self.run_profile(profile)
            };
            on_row(&row);
            rows.push(row);
        }
        rows
    }

    pub fn run_profile(&self, profile: &ProfileSpec) -> BenchmarkRow {
        let s = self.settings;

        if let Err(e) = write_profile_config(&self.base, profile, &s.tmp_config) {
            return BenchmarkRow::failed(profile, format!("config: {:#}", e));
        }

        let handle = match self.daemon.start(&s.tmp_config, self.abort) {
            Ok(h) => h,
            Err(e) => {
                println!("  START FAILED: {} -- SKIPPING", e);
                return BenchmarkRow::failed(profile, e.to_string());
            }
        };
        let pid = handle.pid();
        let mut notes: Vec<String> = Vec::new();
        if pid != handle.spawned_pid() {
            notes.push(format!("pid {}->{}", handle.spawned_pid(), pid));
        }

        println!("  IDLE ({}s)  PID: {}", s.idle.as_secs(), pid);
        let mut idle = self.sampler.measure(pid, s.idle, self.abort);
        if self.aborted() {
            idle = PhaseMeasurement::unavailable();
        }

        // IDLE IS FULLY DONE BEFORE ANY LOAD EXISTS
        let active = if self.interrupted() {
            notes.push("interrupted".to_string());
            PhaseMeasurement::unavailable()
        } else {
            println!(
                "  ACTIVE ({}s)  LOAD: {}",
                s.active.as_secs(),
                self.activity
                    .device()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "NONE".to_string())
            );
            let load = self.activity.start(s.active);
            let m = self.sampler.measure(pid, s.active, self.abort);
            let stats = load.cancel();
            if self.aborted() {
                notes.push("interrupted".to_string());
                return self.finish(profile, handle, idle, PhaseMeasurement::unavailable(), notes);
            }
            if self.activity.device().is_none() {
                notes.push("no load".to_string());
            } else if stats.bursts == 0 || stats.failed_bursts == stats.bursts {
                notes.push("load failed".to_string());
            }
            m
        };

        self.finish(profile, handle, idle, active, notes)
    }

    fn finish(
        &self,
        profile: &ProfileSpec,
        handle: DaemonHandle,
        idle: PhaseMeasurement,
        active: PhaseMeasurement,
        mut notes: Vec<String>,
    ) -> BenchmarkRow {
        if !self.daemon.is_running(handle.pid()) {
            notes.push("daemon exited early".to_string());
        }
        self.daemon.stop(handle);
        BenchmarkRow::measured(profile, idle, active, notes.join("; "))
    }
}
