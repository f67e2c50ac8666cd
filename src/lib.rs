//! # query_proc_info
//!
//! A library for querying Linux process and socket state from `/proc`:
//! - Which process owns the socket listening on a TCP port
//! - A process's full `stat` record
//! - A process's share of system CPU over a sampling interval
//! - Process resident memory and system memory totals
//!
//! ## Sources
//!
//! | Query | Files read |
//! |-------|------------|
//! | Port owner | `/proc/net/tcp`, `/proc/net/tcp6`, `/proc/[pid]/fd/*` |
//! | Process stat | `/proc/[pid]/stat` |
//! | CPU fraction | `/proc/stat`, `/proc/[pid]/stat` |
//! | Process memory | `/proc/[pid]/status` |
//! | System memory | `/proc/meminfo` |
//!
//! Every query is a one-shot synchronous read; nothing is cached between calls.
//! Each top-level function has an `*_in` twin taking a [`ProcSource`], which is
//! how the parsers are run against fixture trees.
//!
//! ## Example
//!
//! ```rust,no_run
//! use query_proc_info::{cpu, memory, process, socket};
//! use std::time::Duration;
//!
//! fn main() -> query_proc_info::Result<()> {
//!     // Who is listening on port 22, on any address?
//!     let pid = socket::find_pid_listening_on_port(22, true)?;
//!     println!("sshd is pid {}", pid);
//!
//!     let stat = process::read_process_stat(pid as i32)?;
//!     println!("{} ({}) has {} threads", stat.comm, stat.state, stat.num_threads);
//!
//!     // Blocks for the whole interval
//!     let fraction = cpu::sample_cpu_fraction(pid as i32, Duration::from_millis(500))?;
//!     println!("CPU: {:.2}% of busy system time", fraction * 100.0);
//!
//!     println!("RSS: {} kB of {} kB",
//!         process::process_memory_kb(pid as i32)?,
//!         memory::total_memory_kb()?);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Failures come in three kinds: the file could not be read
//! ([`ProcError::Io`]), its content had an unexpected shape
//! ([`ProcError::Format`]), or the thing asked for does not exist
//! ([`ProcError::NoProcessListening`], [`ProcError::NoProcessWithSocket`]).
//! Nothing is retried; a process exiting mid-query surfaces as an IO error.

pub mod cpu;
pub mod error;
pub mod memory;
pub mod process;
pub mod socket;
pub mod source;
pub mod types;
pub mod util;

// Re-export commonly used types
pub use error::{ProcError, Result};
pub use source::{ProcRoot, ProcSource};
pub use types::*;

use serde::Serialize;
use std::time::Duration;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get a summary of one process: its stat record, memory and CPU share.
///
/// Blocks for `interval` while sampling CPU.
pub fn get_process_summary(pid: i32, interval: Duration) -> Result<ProcessSummary> {
    get_process_summary_in(&source::live_root()?, pid, interval)
}

/// [`get_process_summary`] against an arbitrary /proc tree
pub fn get_process_summary_in(
    src: &dyn ProcSource,
    pid: i32,
    interval: Duration,
) -> Result<ProcessSummary> {
    let cpu_fraction = cpu::sample_cpu_fraction_in(src, pid, interval)?;
    Ok(ProcessSummary {
        stat: process::read_process_stat_in(src, pid)?,
        rss_kb: process::process_memory_kb_in(src, pid)?,
        total_memory_kb: memory::total_memory_kb_in(src)?,
        cpu_fraction,
    })
}

/// Complete process summary
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    /// Parsed stat record, read after the CPU sample
    pub stat: ProcessStat,
    /// Resident set size in kB
    pub rss_kb: u64,
    /// System memory in kB
    pub total_memory_kb: u64,
    /// Share of busy system CPU ticks over the sampling interval, in `[0, 1]`
    pub cpu_fraction: f64,
}
