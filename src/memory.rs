//! System memory totals

use crate::error::{ProcError, Result};
use crate::source::{self, ProcSource};
use crate::util::parse_dec;

/// Total physical memory in kB, from the first line of `/proc/meminfo`
pub fn total_memory_kb() -> Result<u64> {
    total_memory_kb_in(&source::live_root()?)
}

/// [`total_memory_kb`] against an arbitrary /proc tree
pub fn total_memory_kb_in(src: &dyn ProcSource) -> Result<u64> {
    let meminfo = src.read_to_string("meminfo")?;
    parse_total_memory(&meminfo)
}

// First line is "MemTotal:       16384000 kB"
fn parse_total_memory(meminfo: &str) -> Result<u64> {
    let mut parts = meminfo
        .lines()
        .next()
        .unwrap_or_default()
        .split_whitespace();

    match (parts.next(), parts.next()) {
        (Some(_label), Some(value)) => parse_dec(value, "MemTotal"),
        _ => Err(ProcError::format(
            "/proc/meminfo: expected a label and a total on the first line",
        )),
    }
}
