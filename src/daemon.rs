// NVME-LED-BENCH DAEMON PROCESS MANAGER
// START -> WARM-UP -> VERIFY-OR-ADOPT-CHILD -> MEASURE -> STOP
//
// THE PID WE SPAWN IS NOT NECESSARILY THE PID THAT DOES THE WORK: A LAUNCHER
// (sudo, A WRAPPER SCRIPT, A SELF-RE-EXEC) MAY SIT IN FRONT OF THE DAEMON.
// AFTER WARM-UP WE CHECK THE NAME AT THE SPAWNED PID AND, IF IT IS NOT THE
// DAEMON, ADOPT ITS FIRST CHILD.

use std::path::{Path, PathBuf};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};

use crate::config::BenchSettings;
use crate::error::BenchError;
use crate::proc::{comm_matches, signal, ProcFs, ProcGuard, ProcessTable};

// ONLY THE SPAWNED PROCESS OR ONE OF ITS DIRECT CHILDREN IS ACCEPTED.
// NO RETRY: A CHILD THAT HAS NOT APPEARED BY NOW IS A START FAILURE.
pub fn resolve_effective_process(
    table: &impl ProcessTable,
    initial: u32,
    expected_name: &str,
) -> Result<u32, BenchError> {
    let comm = table.comm(initial);
    if comm.as_deref().is_some_and(|c| comm_matches(c, expected_name)) {
        return Ok(initial);
    }

    let children = table.children(initial);
    if let Some(&pid) = children
        .iter()
        .find(|&&p| table.comm(p).is_some_and(|c| comm_matches(&c, expected_name)))
    {
        return Ok(pid);
    }
    if let Some(&pid) = children.first() {
        debug!(
            "pid {} has no child named {}, adopting first child {}",
            initial, expected_name, pid
        );
        return Ok(pid);
    }

    Err(BenchError::StartFailure(match comm {
        Some(c) => format!("pid {} runs '{}' and has no child process", initial, c),
        None => format!("pid {} vanished before it could be resolved", initial),
    }))
}

// A RUNNING DAEMON. DROPPING IT STOPS THE WHOLE PROCESS GROUP.
pub struct DaemonHandle {
    guard: ProcGuard,
    pid: u32,
}

impl DaemonHandle {
    // EFFECTIVE PID: THE ONE TO MEASURE
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn spawned_pid(&self) -> u32 {
        self.guard.id()
    }
}

pub struct DaemonManager {
    binary: PathBuf,
    name: String,
    warmup: Duration,
    grace: Duration,
    sudo: bool,
    table: ProcFs,
}

impl DaemonManager {
    pub fn new(settings: &BenchSettings) -> Self {
        Self {
            binary: settings.daemon_bin.clone(),
            name: settings.daemon_name(),
            warmup: settings.warmup,
            grace: settings.stop_grace,
            sudo: settings.sudo,
            table: ProcFs::default(),
        }
    }

    fn command(&self, config_path: &Path) -> Command {
        let mut cmd = if self.sudo {
            let mut c = Command::new("sudo");
            c.arg("-n").arg(&self.binary);
            c
        } else {
            Command::new(&self.binary)
        };
        cmd.arg("--config")
            .arg(config_path)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    // abort CUTS THE WARM-UP SHORT; THE HALF-STARTED DAEMON IS STOPPED ON THE WAY OUT
    pub fn start(
        &self,
        config_path: &Path,
        abort: &AtomicBool,
    ) -> Result<DaemonHandle, BenchError> {
        // ONE INSTANCE AT A TIME: WHATEVER IS ALREADY RUNNING GOES FIRST
        self.stop_stale()?;

        let child = self.command(config_path).spawn().map_err(|e| {
            BenchError::StartFailure(format!("cannot launch {}: {}", self.binary.display(), e))
        })?;
        let mut guard = ProcGuard::new(child);
        let spawned = guard.id();
        debug!("spawned {} as pid {}", self.binary.display(), spawned);

        let warm = Instant::now() + self.warmup;
        if let Some(status) = guard.wait_until(warm, || abort.load(Ordering::Relaxed)) {
            return Err(BenchError::StartFailure(format!(
                "{} exited during warm-up ({})",
                self.name, status
            )));
        }
        if abort.load(Ordering::Relaxed) {
            return Err(BenchError::Interrupted);
        }

        // guard DROPS (AND STOPS THE GROUP) IF RESOLUTION FAILS
        let pid = resolve_effective_process(&self.table, spawned, &self.name)?;
        if pid != spawned {
            info!("{} re-executed: spawned pid {}, effective pid {}", self.name, spawned, pid);
        }
        Ok(DaemonHandle { guard, pid })
    }

    // BEST EFFORT. AN ALREADY-EXITED DAEMON IS NOT AN ERROR.
    pub fn stop(&self, mut handle: DaemonHandle) {
        let effective = handle.pid;
        if effective != handle.spawned_pid() {
            let _ = self.terminate(effective, libc::SIGTERM);
        }
        handle.guard.stop(self.grace);
        if effective != handle.spawned_pid() && self.is_running(effective) {
            let _ = self.terminate(effective, libc::SIGKILL);
        }
    }

    pub fn is_running(&self, pid: u32) -> bool {
        self.table.comm(pid).is_some() && !self.table.is_zombie(pid)
    }

    // ROOT-OWNED INSTANCES NEED sudo TO SIGNAL
    fn terminate(&self, pid: u32, sig: libc::c_int) -> Result<()> {
        match signal(pid, sig) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EPERM) && self.sudo => {
                let status = Command::new("sudo")
                    .args(["-n", "kill", "-s", if sig == libc::SIGKILL { "KILL" } else { "TERM" }])
                    .arg(pid.to_string())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .context("sudo kill")?;
                if !status.success() {
                    bail!("sudo kill {} failed ({})", pid, status);
                }
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("signal {} to pid {}", sig, pid)),
        }
    }

    // STOP EVERY PRIOR INSTANCE BY NAME, NOT JUST THE ONES WE STARTED
    pub fn stop_stale(&self) -> Result<(), BenchError> {
        let me = std::process::id();
        let stale: Vec<u32> = self
            .table
            .pids_named(&self.name)
            .into_iter()
            .filter(|&p| p != me)
            .collect();
        if stale.is_empty() {
            return Ok(());
        }
        warn!("stopping prior {} instance(s): {:?}", self.name, stale);

        for &pid in &stale {
            if let Err(e) = self.terminate(pid, libc::SIGTERM) {
                debug!("{:#}", e);
            }
        }
        if self.wait_gone(&stale, self.grace) {
            return Ok(());
        }
        for &pid in &stale {
            if self.is_running(pid) {
                if let Err(e) = self.terminate(pid, libc::SIGKILL) {
                    debug!("{:#}", e);
                }
            }
        }
        if self.wait_gone(&stale, Duration::from_millis(500)) {
            return Ok(());
        }
        Err(BenchError::ResourceBusy {
            name: self.name.clone(),
            pids: stale.into_iter().filter(|&p| self.is_running(p)).collect(),
        })
    }

    fn wait_gone(&self, pids: &[u32], timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if pids.iter().all(|&p| !self.is_running(p)) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

// ---------------------------------------------------------------------------
// SYSTEM SERVICE
// ---------------------------------------------------------------------------

fn systemctl(action: &str, service: &str, sudo: bool) -> Result<()> {
    let mut cmd = if sudo {
        let mut c = Command::new("sudo");
        c.args(["-n", "systemctl"]);
        c
    } else {
        Command::new("systemctl")
    };
    let status = cmd
        .args([action, service])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("running systemctl {} {}", action, service))?;
    if !status.success() {
        bail!("systemctl {} {} failed ({})", action, service, status);
    }
    Ok(())
}

pub fn stop_service(service: &str, sudo: bool) -> Result<()> {
    systemctl("stop", service, sudo)
}

pub fn start_service(service: &str, sudo: bool) -> Result<()> {
    systemctl("start", service, sudo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // pid -> (comm, ppid)
    struct FakeTable(HashMap<u32, (&'static str, u32)>);

    impl FakeTable {
        fn new(entries: &[(u32, &'static str, u32)]) -> Self {
            Self(entries.iter().map(|&(p, c, pp)| (p, (c, pp))).collect())
        }
    }

    impl ProcessTable for FakeTable {
        fn comm(&self, pid: u32) -> Option<String> {
            self.0.get(&pid).map(|(c, _)| c.to_string())
        }
        fn parent(&self, pid: u32) -> Option<u32> {
            self.0.get(&pid).map(|(_, pp)| *pp)
        }
        fn pids(&self) -> Vec<u32> {
            self.0.keys().copied().collect()
        }
    }

    #[test]
    fn resolve_direct_match() {
        let t = FakeTable::new(&[(10, "nvme-led-daemon", 1)]);
        assert_eq!(resolve_effective_process(&t, 10, "nvme-led-daemon").unwrap(), 10);
    }

    #[test]
    fn resolve_truncated_comm() {
        let t = FakeTable::new(&[(10, "nvme-led-daemon", 1)]);
        assert_eq!(resolve_effective_process(&t, 10, "nvme-led-daemon-debug").unwrap(), 10);
    }

    #[test]
    fn resolve_adopts_named_child() {
        let t = FakeTable::new(&[
            (10, "sudo", 1),
            (11, "logger", 10),
            (12, "nvme-led-daemon", 10),
        ]);
        assert_eq!(resolve_effective_process(&t, 10, "nvme-led-daemon").unwrap(), 12);
    }

    #[test]
    fn resolve_adopts_first_child_without_name_match() {
        let t = FakeTable::new(&[(10, "wrapper", 1), (14, "a", 10), (12, "b", 10)]);
        assert_eq!(resolve_effective_process(&t, 10, "nvme-led-daemon").unwrap(), 12);
    }

    #[test]
    fn resolve_no_child_is_start_failure() {
        let t = FakeTable::new(&[(10, "sudo", 1)]);
        let err = resolve_effective_process(&t, 10, "nvme-led-daemon").unwrap_err();
        assert!(matches!(err, BenchError::StartFailure(_)));
    }

    #[test]
    fn resolve_vanished_is_start_failure() {
        let t = FakeTable::new(&[]);
        let err = resolve_effective_process(&t, 10, "nvme-led-daemon").unwrap_err();
        assert!(err.to_string().contains("vanished"));
    }

    #[test]
    fn start_non_executable_is_start_failure() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("not-a-daemon");
        std::fs::write(&bin, "just text\n").unwrap();
        let settings = BenchSettings {
            daemon_bin: bin,
            warmup: Duration::from_millis(50),
            ..BenchSettings::default()
        };
        let mgr = DaemonManager::new(&settings);
        let never = AtomicBool::new(false);
        let err = match mgr.start(&dir.path().join("bench.conf"), &never) {
            Err(e) => e,
            Ok(_) => panic!("non-executable daemon started"),
        };
        assert!(matches!(err, BenchError::StartFailure(_)));
    }
}
