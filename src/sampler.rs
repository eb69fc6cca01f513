// NVME-LED-BENCH PHASE SAMPLER
// THREE SOURCES, ONE WINDOW:
//   CPU%         pidstat -u -p PID 1 N
//   CTXSW/S      /proc/PID/status BEFORE AND AFTER
//   WAKEUPS/S    perf stat -e sched:sched_wakeup -p PID -- sleep N
//
// ALL THREE START BEHIND ONE BARRIER AND EACH IS PADDED TO THE SAME DEADLINE,
// SO measure() NEVER RETURNS BEFORE THE WINDOW HAS ELAPSED UNLESS ABORTED.
// A SOURCE THAT FAILS ONLY BLANKS ITS OWN FIELD.
//
// TOOLS RUN IN THEIR OWN PROCESS GROUP: A TERMINAL CTRL+C MUST NOT CUT A
// WINDOW SHORT BEHIND OUR BACK. ONLY THE abort FLAG ENDS A WINDOW EARLY.

use std::io::ErrorKind;
use std::os::unix::process::CommandExt;
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::config::BenchSettings;
use crate::error::BenchError;
use crate::parse::{
    ctx_switch_rate, parse_ctx_switches, parse_perf_wakeups, parse_pidstat_cpu, WAKEUP_EVENT,
};
use crate::proc::{ProcFs, ProcGuard};
use crate::profile::PhaseMeasurement;

type Sample = Result<f64, BenchError>;

// STARTUP AND REPORTING TIME A TOOL GETS BEYOND THE WINDOW BEFORE IT IS KILLED
const TOOL_SLACK: Duration = Duration::from_secs(5);
const TICK: Duration = Duration::from_millis(20);

pub struct PhaseSampler {
    pidstat: String,
    perf: String,
    table: ProcFs,
}

impl PhaseSampler {
    pub fn new(settings: &BenchSettings) -> Self {
        Self::with_tools(&settings.pidstat, &settings.perf)
    }

    pub fn with_tools(pidstat: &str, perf: &str) -> Self {
        Self {
            pidstat: pidstat.to_string(),
            perf: perf.to_string(),
            table: ProcFs::default(),
        }
    }

    // abort ENDS THE WINDOW EARLY; WHATEVER WAS CUT SHORT COMES BACK None
    pub fn measure(&self, pid: u32, duration: Duration, abort: &AtomicBool) -> PhaseMeasurement {
        let barrier = Barrier::new(3);
        let deadline = Instant::now() + duration;

        thread::scope(|s| {
            let cpu = s.spawn(|| {
                barrier.wait();
                padded(deadline, abort, || self.cpu_percent(pid, duration, deadline, abort))
            });
            let ctx = s.spawn(|| {
                barrier.wait();
                padded(deadline, abort, || self.ctx_switch_rate(pid, duration, deadline, abort))
            });
            let wake = s.spawn(|| {
                barrier.wait();
                padded(deadline, abort, || self.wakeup_rate(pid, duration, deadline, abort))
            });

            PhaseMeasurement {
                cpu_percent: settle("cpu", cpu.join()),
                ctx_switch_rate: settle("ctxsw", ctx.join()),
                wakeup_rate: settle("wakeups", wake.join()),
            }
        })
    }

    fn cpu_percent(
        &self,
        pid: u32,
        duration: Duration,
        deadline: Instant,
        abort: &AtomicBool,
    ) -> Sample {
        let count = whole_secs(duration).to_string();
        let out = run_tool(
            Command::new(&self.pidstat).args(["-u", "-p", &pid.to_string(), "1", &count]),
            &self.pidstat,
            deadline + TOOL_SLACK,
            abort,
        )?;
        let text = String::from_utf8_lossy(&out.stdout);
        parse_pidstat_cpu(&text).ok_or_else(|| BenchError::ParseFailure {
            tool: self.pidstat.clone(),
        })
    }

    fn ctx_switch_rate(
        &self,
        pid: u32,
        duration: Duration,
        deadline: Instant,
        abort: &AtomicBool,
    ) -> Sample {
        let before = self.table.read_status(pid).as_deref().and_then(parse_ctx_switches);
        if !sleep_until(deadline, abort) {
            return Err(BenchError::Interrupted);
        }
        let after = self.table.read_status(pid).as_deref().and_then(parse_ctx_switches);
        ctx_switch_rate(before, after, duration.as_secs_f64()).ok_or_else(|| {
            BenchError::ParseFailure {
                tool: format!("/proc/{}/status", pid),
            }
        })
    }

    fn wakeup_rate(
        &self,
        pid: u32,
        duration: Duration,
        deadline: Instant,
        abort: &AtomicBool,
    ) -> Sample {
        let secs = whole_secs(duration);
        let out = run_tool(
            Command::new(&self.perf).args([
                "stat",
                "-e",
                WAKEUP_EVENT,
                "-p",
                &pid.to_string(),
                "--",
                "sleep",
                &secs.to_string(),
            ]),
            &self.perf,
            deadline + TOOL_SLACK,
            abort,
        )?;
        // perf stat REPORTS ON STDERR
        let text = String::from_utf8_lossy(&out.stderr);
        let count = parse_perf_wakeups(&text).ok_or_else(|| BenchError::ParseFailure {
            tool: self.perf.clone(),
        })?;
        Ok(count as f64 / secs as f64)
    }
}

// LC_ALL=C, OWN PROCESS GROUP, KILLED ON abort OR PAST deadline.
// THE PARSERS STILL TOLERATE LOCALIZED NUMBERS.
fn run_tool(
    cmd: &mut Command,
    name: &str,
    deadline: Instant,
    abort: &AtomicBool,
) -> Result<Output, BenchError> {
    let child = cmd
        .env("LC_ALL", "C")
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                BenchError::ToolUnavailable(name.to_string())
            }
            _ => BenchError::ToolUnavailable(format!("{}: {}", name, e)),
        })?;
    let mut guard = ProcGuard::new(child);
    if guard.wait_until(deadline, || abort.load(Ordering::Relaxed)).is_none() {
        guard.stop(Duration::ZERO);
        if abort.load(Ordering::Relaxed) {
            return Err(BenchError::Interrupted);
        }
        return Err(BenchError::ToolUnavailable(format!("{} timed out", name)));
    }
    guard
        .output()
        .map_err(|e| BenchError::ToolUnavailable(format!("{}: {}", name, e)))
}

fn whole_secs(d: Duration) -> u64 {
    d.as_secs_f64().ceil().max(1.0) as u64
}

// false IF abort WAS RAISED BEFORE deadline
fn sleep_until(deadline: Instant, abort: &AtomicBool) -> bool {
    loop {
        if abort.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(TICK.min(deadline - now));
    }
}

// A SOURCE THAT GIVES UP EARLY STILL HOLDS ITS SLOT UNTIL THE DEADLINE
fn padded(deadline: Instant, abort: &AtomicBool, f: impl FnOnce() -> Sample) -> Sample {
    let r = f();
    sleep_until(deadline, abort);
    r
}

fn settle(what: &str, joined: thread::Result<Sample>) -> Option<f64> {
    match joined {
        Ok(Ok(v)) => Some(v),
        Ok(Err(e @ (BenchError::ToolUnavailable(_) | BenchError::Interrupted))) => {
            debug!("{}: {}", what, e);
            None
        }
        Ok(Err(e)) => {
            warn!("{}: {}", what, e);
            None
        }
        Err(_) => {
            warn!("{}: sampler thread panicked", what);
            None
        }
    }
}
