// NVME-LED-BENCH PROCESS PLUMBING
// CHILD GUARDS THAT NEVER LEAK, SIGNAL HELPERS, AND A READ-ONLY VIEW OF THE
// PROCESS TABLE THAT TESTS CAN REPLACE WITH A FAKE.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Child, ExitStatus, Output};
use std::time::{Duration, Instant};

use log::debug;

// KERNEL TRUNCATES comm TO TASK_COMM_LEN - 1 BYTES
pub const COMM_LEN: usize = 15;

pub fn comm_name(name: &str) -> &str {
    if name.len() <= COMM_LEN {
        return name;
    }
    let mut end = COMM_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

pub fn comm_matches(comm: &str, expected: &str) -> bool {
    comm.trim() == comm_name(expected)
}

// ---------------------------------------------------------------------------
// SIGNALS
// ---------------------------------------------------------------------------

pub fn signal(pid: u32, sig: libc::c_int) -> io::Result<()> {
    if unsafe { libc::kill(pid as libc::pid_t, sig) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn signal_group(pgid: u32, sig: libc::c_int) -> io::Result<()> {
    if unsafe { libc::killpg(pgid as libc::pid_t, sig) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CHILD GUARD
// ---------------------------------------------------------------------------

const POLL: Duration = Duration::from_millis(20);

// OWNS A CHILD SPAWNED WITH process_group(0). STOPPING SIGNALS THE WHOLE
// GROUP SO ANYTHING THE CHILD EXEC'D OR FORKED GOES DOWN WITH IT.
pub struct ProcGuard {
    child: Option<Child>,
    pgid: u32,
}

impl ProcGuard {
    pub fn new(child: Child) -> Self {
        let pgid = child.id();
        Self {
            child: Some(child),
            pgid,
        }
    }

    pub fn id(&self) -> u32 {
        self.pgid
    }

    // Some(status) ONCE THE CHILD HAS EXITED
    pub fn try_exited(&mut self) -> Option<ExitStatus> {
        self.child.as_mut().and_then(|c| c.try_wait().ok().flatten())
    }

    // WAIT FOR NATURAL EXIT UNTIL deadline OR cancel() RETURNS TRUE.
    // Some(status) ON EXIT, None IF INTERRUPTED.
    pub fn wait_until(
        &mut self,
        deadline: Instant,
        cancel: impl Fn() -> bool,
    ) -> Option<ExitStatus> {
        loop {
            if let Some(status) = self.try_exited() {
                return Some(status);
            }
            if cancel() || Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(POLL);
        }
    }

    // SIGTERM, GRACE PERIOD, SIGKILL. ALWAYS REAPS. NEVER FAILS.
    pub fn stop(&mut self, grace: Duration) {
        let child = match self.child.as_mut() {
            Some(c) => c,
            None => return,
        };
        if let Ok(Some(_)) = child.try_wait() {
            self.child = None;
            return;
        }
        if let Err(e) = signal_group(self.pgid, libc::SIGTERM) {
            debug!("SIGTERM to group {}: {}", self.pgid, e);
            let _ = signal(self.pgid, libc::SIGTERM);
        }
        let deadline = Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => {
                    self.child = None;
                    return;
                }
                Ok(None) if Instant::now() >= deadline => break,
                Ok(None) => std::thread::sleep(POLL),
                Err(_) => break,
            }
        }
        if signal_group(self.pgid, libc::SIGKILL).is_err() {
            let _ = child.kill();
        }
        let _ = child.wait();
        self.child = None;
    }

    // COLLECT PIPED OUTPUT OF A CHILD THAT HAS ALREADY EXITED (wait_until)
    pub fn output(mut self) -> io::Result<Output> {
        match self.child.take() {
            Some(child) => child.wait_with_output(),
            None => Err(io::Error::other("child already reaped by stop()")),
        }
    }
}

impl Drop for ProcGuard {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.stop(Duration::from_millis(500));
        }
    }
}

// ---------------------------------------------------------------------------
// PROCESS TABLE
// ---------------------------------------------------------------------------

pub trait ProcessTable {
    // SHORT NAME (comm) OF pid, None IF GONE
    fn comm(&self, pid: u32) -> Option<String>;

    fn parent(&self, pid: u32) -> Option<u32>;

    fn pids(&self) -> Vec<u32>;

    fn is_zombie(&self, _pid: u32) -> bool {
        false
    }

    // DIRECT CHILDREN, LOWEST PID FIRST
    fn children(&self, pid: u32) -> Vec<u32> {
        let mut kids: Vec<u32> = self
            .pids()
            .into_iter()
            .filter(|&p| self.parent(p) == Some(pid))
            .collect();
        kids.sort_unstable();
        kids
    }

    // LIVE PROCESSES WHOSE comm MATCHES name
    fn pids_named(&self, name: &str) -> Vec<u32> {
        let mut found: Vec<u32> = self
            .pids()
            .into_iter()
            .filter(|&p| !self.is_zombie(p))
            .filter(|&p| self.comm(p).is_some_and(|c| comm_matches(&c, name)))
            .collect();
        found.sort_unstable();
        found
    }
}

// THE REAL THING, ROOTED AT /proc (OR A FIXTURE DIRECTORY IN TESTS)
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn status_path(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string()).join("status")
    }

    pub fn read_status(&self, pid: u32) -> Option<String> {
        fs::read_to_string(self.status_path(pid)).ok()
    }

    // FIELDS AFTER THE LAST ')' OF /proc/PID/stat: STATE, PPID, ...
    // comm MAY CONTAIN SPACES AND PARENS, SO NEVER SPLIT BEFORE IT.
    fn stat_tail(&self, pid: u32) -> Option<Vec<String>> {
        let raw = fs::read_to_string(self.root.join(pid.to_string()).join("stat")).ok()?;
        let close = raw.rfind(')')?;
        Some(raw[close + 1..].split_whitespace().map(str::to_string).collect())
    }
}

impl ProcessTable for ProcFs {
    fn comm(&self, pid: u32) -> Option<String> {
        let raw = fs::read_to_string(self.root.join(pid.to_string()).join("comm")).ok()?;
        Some(raw.trim_end_matches('\n').to_string())
    }

    fn parent(&self, pid: u32) -> Option<u32> {
        self.stat_tail(pid)?.get(1)?.parse().ok()
    }

    fn pids(&self) -> Vec<u32> {
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };
        entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().and_then(|s| s.parse::<u32>().ok()))
            .collect()
    }

    fn is_zombie(&self, pid: u32) -> bool {
        self.stat_tail(pid)
            .and_then(|t| t.first().cloned())
            .is_some_and(|state| state == "Z" || state == "X")
    }
}
