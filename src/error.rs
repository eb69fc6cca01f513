// NVME-LED-BENCH ERROR TAXONOMY
// EVERY FAILURE STAYS INSIDE ITS OWN SCOPE: ONE METRIC, ONE PROFILE, OR
// (PRE-FLIGHT ONLY) THE WHOLE SWEEP.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    // EXTERNAL MEASUREMENT TOOL MISSING. DEGRADES ONE FIELD TO n/a.
    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    // TOOL RAN BUT ITS OUTPUT MATCHED NOTHING WE KNOW. SAME TREATMENT AS ABOVE.
    #[error("could not parse {tool} output")]
    ParseFailure { tool: String },

    // DAEMON DID NOT START OR ITS EFFECTIVE PID COULD NOT BE RESOLVED.
    // SKIPS ONE PROFILE.
    #[error("daemon start failed: {0}")]
    StartFailure(String),

    // A PRIOR DAEMON INSTANCE SURVIVED SIGTERM + SIGKILL.
    #[error("{name} still running (pids {pids:?})")]
    ResourceBusy { name: String, pids: Vec<u32> },

    // SECOND CTRL+C ARRIVED MID-WINDOW OR MID-WARM-UP. NOTHING IS MEASURED.
    #[error("interrupted")]
    Interrupted,

    // PRE-FLIGHT ONLY. ABORTS THE SWEEP BEFORE ANY PROFILE RUNS.
    #[error("{0}")]
    Fatal(String),
}
