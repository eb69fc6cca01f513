// NVME-LED-BENCH -- OVERHEAD OF THE NVME ACTIVITY LED DAEMON
// SWEEPS POLL-INTERVAL PROFILES, MEASURES CPU%, CONTEXT SWITCHES AND KERNEL
// WAKEUPS OF THE RUNNING DAEMON, IDLE AND UNDER SYNTHETIC DISK LOAD.
//
// THE LIBRARY DOES THE WORK. THIS FILE: ARGUMENTS, LOGGING, CTRL+C.

mod cli;

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{Parser, Subcommand};

use cli::{SweepArgs, TargetArgs};
use nvme_led_bench::profile::ProfileSpec;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);
static ABORT: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "nvme-led-bench")]
#[command(version)]
#[command(about = "NVME-LED-BENCH -- DAEMON OVERHEAD ACROSS POLL INTERVALS")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    // DEBUG-LEVEL DIAGNOSTICS (RUST_LOG OVERRIDES)
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Cmd {
    // RUN THE SWEEP AND PRINT THE TABLE (AND CSV)
    Run(SweepArgs),
    // VERIFY TOOLS, KERNEL SUPPORT, AND TARGET PATHS
    Check(TargetArgs),
    // LIST THE PROFILES A SWEEP WOULD RUN
    Profiles {
        #[arg(long = "profile", value_name = "LABEL:INTERVAL:READ:WRITE")]
        profiles: Vec<ProfileSpec>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .format_timestamp(None)
    .init();

    match cli.command {
        Cmd::Run(args) => {
            // FIRST CTRL+C: FINISH THE CURRENT PHASE, SKIP THE REST, STILL REPORT.
            // SECOND: CUT THE PHASE SHORT. EITHER WAY THE SWEEP UNWINDS NORMALLY
            // SO THE DAEMON IS STOPPED AND THE SERVICE RESTORED.
            ctrlc::set_handler(move || {
                if SHUTDOWN.swap(true, Ordering::Relaxed) {
                    ABORT.store(true, Ordering::Relaxed);
                    eprintln!("\nABORTING -- STOPPING DAEMON AND CLEANING UP");
                } else {
                    eprintln!("\nINTERRUPTED -- FINISHING CURRENT PHASE (CTRL+C AGAIN TO ABORT)");
                }
            })?;
            cli::run::run_sweep(&args.settings(), &args.profile_list(), &SHUTDOWN, &ABORT)?;
            if ABORT.load(Ordering::Relaxed) {
                std::process::exit(130);
            }
            Ok(())
        }
        Cmd::Check(args) => cli::check::run_check(&args.settings()),
        Cmd::Profiles { profiles } => {
            let list = if profiles.is_empty() {
                nvme_led_bench::profile::default_profiles()
            } else {
                profiles
            };
            cli::profiles::run_profiles(&list);
            Ok(())
        }
    }
}
