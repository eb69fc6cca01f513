// NVME-LED-BENCH ACTIVITY GENERATOR
// BOUNDED O_DIRECT READ BURSTS (dd iflag=direct) AGAINST THE BLOCK DEVICE
// FOR THE ACTIVE PHASE. NO READABLE DEVICE -> SILENT NO-OP OF THE SAME LENGTH.
// CANCELLABLE AT ANY POINT: AN IN-FLIGHT BURST IS KILLED, NOT WAITED OUT.

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::proc::ProcGuard;

const BLOCK_SIZE: &str = "1M";
const BLOCKS_PER_BURST: u64 = 8;
// OFFSET WRAPS AFTER THIS MANY BURSTS (8 MIB EACH -> FIRST 1 GIB OF THE DEVICE)
const OFFSET_WRAP: u64 = 128;
const BURST_PAUSE: Duration = Duration::from_millis(50);
const TICK: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActivityStats {
    pub bursts: u64,
    pub failed_bursts: u64,
    pub cancelled: bool,
}

#[derive(Clone, Debug)]
pub struct ActivityGenerator {
    device: Option<PathBuf>,
    dd: String,
}

impl ActivityGenerator {
    // device MUST ALREADY BE KNOWN READABLE (BenchSettings::readable_device)
    pub fn new(device: Option<PathBuf>) -> Self {
        Self {
            device,
            dd: "dd".to_string(),
        }
    }

    pub fn with_dd(mut self, dd: &str) -> Self {
        self.dd = dd.to_string();
        self
    }

    pub fn device(&self) -> Option<&PathBuf> {
        self.device.as_ref()
    }

    fn burst(&self, device: &PathBuf, index: u64) -> std::io::Result<ProcGuard> {
        let skip = (index % OFFSET_WRAP) * BLOCKS_PER_BURST;
        let child = Command::new(&self.dd)
            .arg(format!("if={}", device.display()))
            .arg("of=/dev/null")
            .arg(format!("bs={}", BLOCK_SIZE))
            .arg(format!("count={}", BLOCKS_PER_BURST))
            .arg(format!("skip={}", skip))
            .arg("iflag=direct")
            .arg("status=none")
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(ProcGuard::new(child))
    }

    // BLOCKS FOR duration UNLESS cancel IS RAISED FIRST
    pub fn run(&self, duration: Duration, cancel: &AtomicBool) -> ActivityStats {
        let deadline = Instant::now() + duration;
        let mut stats = ActivityStats::default();
        let cancelled = || cancel.load(Ordering::Relaxed);

        if let Some(device) = self.device.as_ref() {
            while !cancelled() && Instant::now() < deadline {
                let mut guard = match self.burst(device, stats.bursts) {
                    Ok(g) => g,
                    Err(e) => {
                        warn!("{} unavailable ({}), active phase runs without load", self.dd, e);
                        break;
                    }
                };
                match guard.wait_until(deadline, cancelled) {
                    Some(status) => {
                        stats.bursts += 1;
                        if !status.success() {
                            stats.failed_bursts += 1;
                        }
                    }
                    // DEADLINE OR CANCEL MID-BURST: KILL IT NOW
                    None => guard.stop(Duration::ZERO),
                }
                sleep_until(Instant::now() + BURST_PAUSE, deadline, cancel);
            }
        } else {
            debug!("no readable device, active phase is load-free");
        }

        // NO-OP (OR EARLY-EXITED) GENERATOR STILL SPANS THE NOMINAL WINDOW
        sleep_until(deadline, deadline, cancel);
        stats.cancelled = cancelled();
        stats
    }

    // RUN ON A BACKGROUND THREAD
    pub fn start(&self, duration: Duration) -> ActivityHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let gen = self.clone();
        let thread = std::thread::spawn(move || gen.run(duration, &flag));
        ActivityHandle {
            cancel,
            thread: Some(thread),
        }
    }
}

fn sleep_until(until: Instant, deadline: Instant, cancel: &AtomicBool) {
    let until = until.min(deadline);
    while !cancel.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= until {
            return;
        }
        std::thread::sleep(TICK.min(until - now));
    }
}

// CANCELS ON DROP, SO NO dd OUTLIVES ITS PHASE
pub struct ActivityHandle {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<ActivityStats>>,
}

impl ActivityHandle {
    pub fn cancel(mut self) -> ActivityStats {
        self.finish()
    }

    fn finish(&mut self) -> ActivityStats {
        self.cancel.store(true, Ordering::Relaxed);
        match self.thread.take() {
            Some(t) => t.join().unwrap_or_default(),
            None => ActivityStats::default(),
        }
    }
}

impl Drop for ActivityHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_device_spans_full_window() {
        let gen = ActivityGenerator::new(None);
        let cancel = AtomicBool::new(false);
        let t0 = Instant::now();
        let stats = gen.run(Duration::from_millis(300), &cancel);
        assert!(t0.elapsed() >= Duration::from_millis(300));
        assert_eq!(stats.bursts, 0);
        assert!(!stats.cancelled);
    }

    #[test]
    fn missing_dd_degrades_to_noop() {
        let gen = ActivityGenerator::new(Some(PathBuf::from("/dev/null")))
            .with_dd("/nonexistent/dd-binary");
        let cancel = AtomicBool::new(false);
        let t0 = Instant::now();
        let stats = gen.run(Duration::from_millis(200), &cancel);
        assert!(t0.elapsed() >= Duration::from_millis(200));
        assert_eq!(stats.bursts, 0);
    }

    #[test]
    fn cancel_returns_immediately() {
        let gen = ActivityGenerator::new(None);
        let handle = gen.start(Duration::from_secs(30));
        std::thread::sleep(Duration::from_millis(100));
        let t0 = Instant::now();
        let stats = handle.cancel();
        assert!(t0.elapsed() < Duration::from_secs(2));
        assert!(stats.cancelled);
    }

    #[test]
    fn drop_cancels() {
        let t0 = Instant::now();
        {
            let _handle = ActivityGenerator::new(None).start(Duration::from_secs(30));
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(t0.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn bursts_against_regular_file() {
        // /dev/zero SUPPORTS NEITHER O_DIRECT NOR SKIP ON EVERY KERNEL, SO USE A
        // SMALL FILE; FAILED BURSTS STILL COUNT AS ISSUED
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("disk.img");
        std::fs::write(&img, vec![0u8; 1 << 20]).unwrap();
        let gen = ActivityGenerator::new(Some(img));
        let cancel = AtomicBool::new(false);
        let stats = gen.run(Duration::from_millis(500), &cancel);
        assert!(stats.bursts >= 1);
        assert!(stats.failed_bursts <= stats.bursts);
    }
}
