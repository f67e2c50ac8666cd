//! CPU accounting
//!
//! Per-process CPU usage needs two samples with a delay. The sampler follows a
//! fixed protocol: read the system counters and the process record, block for
//! the interval, read both again, then compare the deltas.

use crate::error::{ProcError, Result};
use crate::process;
use crate::source::{self, ProcSource};
use crate::types::SystemCpuSnapshot;
use crate::util::parse_dec;
use std::thread;
use std::time::Duration;

/// Interval used by [`sample_cpu_fraction_default`]
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Sum of the first three counters of the aggregate `cpu` line of `/proc/stat`
pub fn total_cpu_ticks() -> Result<u64> {
    total_cpu_ticks_in(&source::live_root()?)
}

/// [`total_cpu_ticks`] against an arbitrary /proc tree
pub fn total_cpu_ticks_in(src: &dyn ProcSource) -> Result<u64> {
    Ok(read_system_cpu_in(src)?.total())
}

/// Read the aggregate counters from `/proc/stat`
pub fn read_system_cpu_in(src: &dyn ProcSource) -> Result<SystemCpuSnapshot> {
    let stat = src.read_to_string("stat")?;
    parse_system_cpu(&stat)
}

/// Parse the first line of `/proc/stat`: a label followed by the user, nice and
/// system tick counters. Later counters on the line are ignored.
pub fn parse_system_cpu(stat: &str) -> Result<SystemCpuSnapshot> {
    let line = stat
        .lines()
        .next()
        .ok_or_else(|| ProcError::format("/proc/stat is empty"))?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(ProcError::format(format!(
            "/proc/stat: expected a label and three counters, got {:?}",
            line
        )));
    }

    Ok(SystemCpuSnapshot {
        user: parse_dec(parts[1], "cpu user ticks")?,
        nice: parse_dec(parts[2], "cpu nice ticks")?,
        system: parse_dec(parts[3], "cpu system ticks")?,
    })
}

/// Share of the busy system ticks (user, nice, system) spent by `pid` over
/// `interval`, in `[0, 1]`.
///
/// Blocks the calling thread for `interval`. Idle time is not in the
/// denominator, so one busy process on an otherwise idle host reads close to
/// 1.0 regardless of the core count.
pub fn sample_cpu_fraction(pid: i32, interval: Duration) -> Result<f64> {
    sample_cpu_fraction_in(&source::live_root()?, pid, interval)
}

/// [`sample_cpu_fraction`] over [`DEFAULT_SAMPLE_INTERVAL`]
pub fn sample_cpu_fraction_default(pid: i32) -> Result<f64> {
    sample_cpu_fraction(pid, DEFAULT_SAMPLE_INTERVAL)
}

/// [`sample_cpu_fraction`] against an arbitrary /proc tree
pub fn sample_cpu_fraction_in(
    src: &dyn ProcSource,
    pid: i32,
    interval: Duration,
) -> Result<f64> {
    sample_cpu_fraction_with(src, pid, interval, thread::sleep)
}

/// Run the sampling protocol with a caller-supplied wait between the two
/// snapshots. Any failed read aborts the sample.
pub fn sample_cpu_fraction_with<W>(
    src: &dyn ProcSource,
    pid: i32,
    interval: Duration,
    wait: W,
) -> Result<f64>
where
    W: FnOnce(Duration),
{
    let system_before = read_system_cpu_in(src)?;
    let process_before = process::read_process_stat_in(src, pid)?;

    wait(interval);

    let system_after = read_system_cpu_in(src)?;
    let process_after = process::read_process_stat_in(src, pid)?;

    let fraction = cpu_fraction(
        process_before.total_ticks(),
        process_after.total_ticks(),
        &system_before,
        &system_after,
    );
    log::debug!(
        "pid {} used {:.4} of system cpu over {:?}",
        pid,
        fraction,
        interval
    );
    Ok(fraction)
}

/// Process tick delta over system tick delta, clamped to `[0, 1]`. A
/// non-positive system delta, or a process delta that went backwards, yields 0.
///
/// The system total leaves out idle, iowait and irq time, and the process is
/// read after the system on each side, so the raw ratio can exceed 1.
pub fn cpu_fraction(
    process_before: u64,
    process_after: u64,
    system_before: &SystemCpuSnapshot,
    system_after: &SystemCpuSnapshot,
) -> f64 {
    let system_delta = system_after.total() as i128 - system_before.total() as i128;
    if system_delta <= 0 {
        return 0.0;
    }
    let process_delta = process_after as i128 - process_before as i128;
    if process_delta <= 0 {
        return 0.0;
    }
    (process_delta as f64 / system_delta as f64).min(1.0)
}

/// Kernel clock ticks per second (`USER_HZ`), the unit of every tick counter here
pub fn clock_ticks_per_second() -> Result<u64> {
    #[cfg(unix)]
    return sysconf_clock_ticks();

    #[cfg(not(unix))]
    Err(ProcError::NotSupported(
        "clock ticks are only defined on Unix".to_string(),
    ))
}

#[cfg(unix)]
fn sysconf_clock_ticks() -> Result<u64> {
    // SAFETY: sysconf has no memory safety preconditions
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz <= 0 {
        return Err(ProcError::NotSupported(
            "sysconf(_SC_CLK_TCK) failed".to_string(),
        ));
    }
    Ok(hz as u64)
}

/// Convert a tick count into seconds
pub fn ticks_to_seconds(ticks: u64, ticks_per_second: u64) -> f64 {
    if ticks_per_second == 0 {
        return 0.0;
    }
    ticks as f64 / ticks_per_second as f64
}
