//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "regconv", version, about = "Power converter regulation core demo CLI")]
pub struct Cli {
    /// Path to converter config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/regconv.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[cfg(target_os = "macos")]
        {
            return RtLock::None;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

/// Which quantity a `regulate` run should close the loop on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RegulateSignal {
    Voltage,
    Current,
    Field,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the regulation loop against the simulated power converter for a fixed duration.
    Run {
        /// Which signal to close the loop on
        #[arg(long, value_enum, default_value = "current")]
        signal: RegulateSignal,
        /// Reference value to track, in the regulated signal's native units
        #[arg(long)]
        reference: f32,
        /// How long to run, in milliseconds
        #[arg(long, default_value_t = 1000)]
        duration_ms: u64,
        /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
        #[arg(long, action = ArgAction::SetTrue)]
        rt: bool,
        /// Real-time priority for SCHED_FIFO on Linux (1..=max); ignored on macOS
        #[arg(long, value_name = "PRIO")]
        rt_prio: Option<i32>,
        /// Select memory locking mode for --rt: none, current, or all
        #[arg(long, value_enum, value_name = "MODE")]
        rt_lock: Option<RtLock>,
        /// Real-time CPU index to pin the process to (Linux only)
        #[arg(long, value_name = "CPU")]
        rt_cpu: Option<usize>,
        /// Print one JSONL telemetry line per iteration to stdout
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
    },
    /// Quick health check: build the converter from config and run a handful of iterations.
    SelfCheck,
}
