// NVME-LED-BENCH DAEMON LIFECYCLE
// A SHELL SCRIPT STANDS IN FOR THE DAEMON: IT RECORDS ITS ARGUMENTS AND
// IDLES UNTIL SIGNALLED. NO ROOT NEEDED.
//
// EACH TEST HOLDS LOCK WHILE IT WRITES AND EXECUTES ITS SCRIPT SO NO
// CONCURRENT fork() INHERITS A WRITABLE FD TO IT (ETXTBSY).

use std::path::{Path, PathBuf};
use std::os::unix::fs::PermissionsExt;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nvme_led_bench::config::BenchSettings;
use nvme_led_bench::daemon::DaemonManager;
use nvme_led_bench::proc::{ProcFs, ProcessTable};
use nvme_led_bench::profile::ProfileSpec;
use nvme_led_bench::sweep::Sweep;

static LOCK: Mutex<()> = Mutex::new(());
static NEVER: AtomicBool = AtomicBool::new(false);

const SCRIPT: &str = "#!/bin/sh\necho \"$@\" > \"$0.args\"\nwhile :; do sleep 1; done\n";

// LAUNCHER THAT REPLACES ITSELF WITH A SHELL WHOSE ONLY CHILD DOES THE WORK.
// THE SPAWNED PID ENDS UP AS comm "sh", NEVER AS THE DAEMON NAME.
const REEXEC: &str = "#!/bin/sh\nexec sh -c 'sleep 1000 & wait'\n";

// UNIQUE PER TEST AND PER RUN, SHORT ENOUGH TO SURVIVE comm TRUNCATION
fn fake_daemon(dir: &Path, tag: &str) -> PathBuf {
    write_script(dir, tag, SCRIPT)
}

fn write_script(dir: &Path, tag: &str, body: &str) -> PathBuf {
    let bin = dir.join(format!("led{}{}", tag, std::process::id()));
    std::fs::write(&bin, body).unwrap();
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
    bin
}

fn settings(dir: &Path, tag: &str) -> BenchSettings {
    let base = dir.join("base.conf");
    std::fs::write(&base, "interval_ms = 8\nquiet = true\n").unwrap();
    BenchSettings {
        daemon_bin: fake_daemon(dir, tag),
        base_config: base,
        tmp_config: dir.join("bench.conf"),
        device: None,
        idle: Duration::from_secs(1),
        active: Duration::from_secs(1),
        warmup: Duration::from_millis(300),
        stop_grace: Duration::from_millis(500),
        pidstat: "nvme-led-bench-no-pidstat".to_string(),
        perf: "nvme-led-bench-no-perf".to_string(),
        ..BenchSettings::default()
    }
}

#[test]
fn start_resolve_stop() {
    let _l = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let s = settings(dir.path(), "a");
    let cfg = dir.path().join("profile.conf");
    std::fs::write(&cfg, "interval_ms = 20\n").unwrap();

    let mgr = DaemonManager::new(&s);
    let handle = mgr.start(&cfg, &NEVER).expect("FAKE DAEMON FAILED TO START");
    let pid = handle.pid();
    assert_eq!(pid, handle.spawned_pid());
    assert!(mgr.is_running(pid));

    let args = std::fs::read_to_string(format!("{}.args", s.daemon_bin.display())).unwrap();
    assert_eq!(args.trim(), format!("--config {}", cfg.display()));

    mgr.stop(handle);
    assert!(!mgr.is_running(pid));
}

#[test]
fn start_replaces_prior_instance() {
    let _l = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let s = settings(dir.path(), "b");

    let mut prior = Command::new(&s.daemon_bin)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let mgr = DaemonManager::new(&s);
    assert!(mgr.is_running(prior.id()));
    let handle = mgr
        .start(&s.base_config, &NEVER)
        .expect("START AFTER STALE CLEANUP FAILED");
    assert!(!mgr.is_running(prior.id()));
    assert_ne!(handle.pid(), prior.id());

    mgr.stop(handle);
    let _ = prior.wait();
}

#[test]
fn sweep_measures_running_daemon() {
    let _l = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let s = settings(dir.path(), "c");
    let base = s.preflight().unwrap();
    let profiles = vec![ProfileSpec::new("quick", 20, 20, 40)];

    let rows = Sweep::new(&s, base).run(&profiles, |_| {});
    assert_eq!(rows.len(), 1);
    let row = &rows[0];

    // ONLY /proc IS GUARANTEED HERE
    assert!(row.idle.ctx_switch_rate.is_some());
    assert!(row.active.ctx_switch_rate.is_some());
    assert_eq!(row.idle.cpu_percent, None);
    assert_eq!(row.active.wakeup_rate, None);
    assert_eq!(row.notes, "no load");

    let written = std::fs::read_to_string(&s.tmp_config).unwrap();
    assert!(written.contains("interval_ms = 20"));
    assert!(written.contains("read_blink_ms = 20"));
    assert!(written.contains("write_blink_ms = 40"));
    assert!(written.contains("quiet = true"));
}

// === RE-EXEC AND ABORT ===

#[test]
fn start_adopts_reexeced_child_and_stop_kills_both() {
    let _l = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path(), "d");
    s.daemon_bin = write_script(dir.path(), "d", REEXEC);

    let mgr = DaemonManager::new(&s);
    let handle = mgr.start(&s.base_config, &NEVER).expect("LAUNCHER FAILED TO START");
    let (spawned, effective) = (handle.spawned_pid(), handle.pid());
    assert_ne!(spawned, effective);
    assert_eq!(ProcFs::default().parent(effective), Some(spawned));
    assert!(mgr.is_running(spawned));
    assert!(mgr.is_running(effective));

    mgr.stop(handle);
    // THE ADOPTED CHILD IS REPARENTED ON EXIT; GIVE init A MOMENT TO REAP IT
    let deadline = Instant::now() + Duration::from_secs(2);
    while mgr.is_running(effective) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!mgr.is_running(spawned));
    assert!(!mgr.is_running(effective));
}

#[test]
fn abort_mid_window_stops_daemon() {
    let _l = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path(), "e");
    s.idle = Duration::from_secs(30);
    s.active = Duration::from_secs(30);
    let base = s.preflight().unwrap();
    let profiles = vec![
        ProfileSpec::new("first", 20, 20, 40),
        ProfileSpec::new("second", 50, 40, 60),
    ];

    let shutdown = Arc::new(AtomicBool::new(false));
    let abort = Arc::new(AtomicBool::new(false));
    {
        let (shutdown, abort) = (shutdown.clone(), abort.clone());
        std::thread::spawn(move || {
            // PAST THE 300ms WARM-UP, INSIDE THE IDLE WINDOW
            std::thread::sleep(Duration::from_millis(1000));
            shutdown.store(true, Ordering::Relaxed);
            abort.store(true, Ordering::Relaxed);
        });
    }

    let t0 = Instant::now();
    let rows = Sweep::new(&s, base)
        .with_shutdown(&shutdown)
        .with_abort(&abort)
        .run(&profiles, |_| {});
    assert!(t0.elapsed() < Duration::from_secs(15));

    assert_eq!(rows.len(), 2);
    assert!(rows[0].idle.is_empty());
    assert!(rows[0].active.is_empty());
    assert!(rows[0].notes.contains("interrupted"));
    assert_eq!(rows[1].notes, "interrupted");

    let name = s.daemon_bin.file_name().unwrap().to_string_lossy().into_owned();
    assert!(ProcFs::default().pids_named(&name).is_empty());
}
