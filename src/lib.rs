// NVME-LED-BENCH LIBRARY
// EVERYTHING THE SWEEP DOES, EXPOSED FOR THE BINARY AND THE INTEGRATION TESTS.
// THE BINARY ONLY ADDS ARGUMENT PARSING, SIGNAL HANDLING, AND PRINTING.

pub mod activity;
pub mod config;
pub mod daemon;
pub mod error;
pub mod parse;
pub mod proc;
pub mod profile;
pub mod report;
pub mod sampler;
pub mod sweep;
pub mod synth;
