//! Per-process records: `/proc/<pid>/stat`, `/proc/<pid>/status` and fd links
//!
//! `stat` is decoded strictly. The name sits between the first `(` and the
//! *last* `)` on the line, since the name itself may contain spaces or
//! parentheses. The fields after it must match one of the layouts the kernel
//! has printed over time:
//!
//! | Fields after name | Kernel | Adds |
//! |---|---|---|
//! | 42 | 2.6.24 | up to `cguest_time` |
//! | 45 | 3.3 | `start_data`, `end_data`, `start_brk` |
//! | 50 | 3.5 | `arg_start`, `arg_end`, `env_start`, `env_end`, `exit_code` |
//!
//! Anything else is rejected rather than partially decoded.

use crate::error::{ProcError, Result};
use crate::source::{self, ProcSource};
use crate::types::{ArgEnvLayout, DataSegment, ProcessStat, SocketToken};
use crate::util::parse_dec;
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

/// Fields after the name in the 2.6.24 layout
pub const STAT_CORE_FIELDS: usize = 42;
const STAT_DATA_SEGMENT_FIELDS: usize = STAT_CORE_FIELDS + 3;
const STAT_ARG_ENV_FIELDS: usize = STAT_DATA_SEGMENT_FIELDS + 5;

static SOCKET_LINK_REGEX: OnceLock<Regex> = OnceLock::new();

/// Read and parse `/proc/<pid>/stat`
pub fn read_process_stat(pid: i32) -> Result<ProcessStat> {
    read_process_stat_in(&source::live_root()?, pid)
}

/// [`read_process_stat`] against an arbitrary /proc tree
pub fn read_process_stat_in(src: &dyn ProcSource, pid: i32) -> Result<ProcessStat> {
    let contents = src.read_to_string(&format!("{}/stat", pid))?;
    parse_stat(&contents)
}

/// Resident set size of a process in kB, from the `VmRSS:` line of
/// `/proc/<pid>/status`
pub fn process_memory_kb(pid: i32) -> Result<u64> {
    process_memory_kb_in(&source::live_root()?, pid)
}

/// [`process_memory_kb`] against an arbitrary /proc tree
pub fn process_memory_kb_in(src: &dyn ProcSource, pid: i32) -> Result<u64> {
    let status = src.read_to_string(&format!("{}/status", pid))?;
    parse_vm_rss(&status)
}

/// Socket tokens held by a process, in descriptor order
pub fn socket_tokens_of(pid: u32) -> Result<Vec<SocketToken>> {
    socket_tokens_in(&source::live_root()?, pid)
}

/// [`socket_tokens_of`] against an arbitrary /proc tree. Descriptors closed
/// while scanning are skipped.
pub fn socket_tokens_in(src: &dyn ProcSource, pid: u32) -> Result<Vec<SocketToken>> {
    let socket_regex = SOCKET_LINK_REGEX
        .get_or_init(|| Regex::new(r"^socket:\[(\d+)\]$").expect("Failed to create socket regex"));

    let fd_dir = format!("{}/fd", pid);
    let mut tokens = Vec::new();
    for fd in src.list_dir(&fd_dir)? {
        let link = match src.read_link(&format!("{}/{}", fd_dir, fd)) {
            Ok(link) => link,
            Err(e) => {
                log::trace!("skipping fd {} of pid {}: {}", fd, pid, e);
                continue;
            }
        };
        if let Some(caps) = socket_regex.captures(&link) {
            tokens.push(SocketToken(caps[1].to_string()));
        }
    }
    Ok(tokens)
}

/// Parse the contents of a `/proc/<pid>/stat` file
pub fn parse_stat(contents: &str) -> Result<ProcessStat> {
    let close = contents
        .rfind(')')
        .ok_or_else(|| ProcError::format("stat: no closing parenthesis after name"))?;
    let open = contents[..close]
        .find('(')
        .ok_or_else(|| ProcError::format("stat: no opening parenthesis before name"))?;

    let pid = parse_dec::<i64>(contents[..open].trim(), "stat pid")?;
    let comm = contents[open + 1..close].to_string();

    let fields: Vec<&str> = contents[close + 1..].split_whitespace().collect();
    match fields.len() {
        STAT_CORE_FIELDS | STAT_DATA_SEGMENT_FIELDS | STAT_ARG_ENV_FIELDS => {}
        n => {
            return Err(ProcError::format(format!(
                "stat: {} fields after name, expected {}, {} or {}",
                n, STAT_CORE_FIELDS, STAT_DATA_SEGMENT_FIELDS, STAT_ARG_ENV_FIELDS
            )))
        }
    }

    let mut f = Fields { fields, pos: 0 };
    let mut stat = ProcessStat {
        pid,
        comm,
        state: f.next("state")?,
        ppid: f.next("ppid")?,
        pgrp: f.next("pgrp")?,
        session: f.next("session")?,
        tty_nr: f.next("tty_nr")?,
        tpgid: f.next("tpgid")?,
        flags: f.next("flags")?,
        minflt: f.next("minflt")?,
        cminflt: f.next("cminflt")?,
        majflt: f.next("majflt")?,
        cmajflt: f.next("cmajflt")?,
        utime: f.next("utime")?,
        stime: f.next("stime")?,
        cutime: f.next("cutime")?,
        cstime: f.next("cstime")?,
        priority: f.next("priority")?,
        nice: f.next("nice")?,
        num_threads: f.next("num_threads")?,
        itrealvalue: f.next("itrealvalue")?,
        starttime: f.next("starttime")?,
        vsize: f.next("vsize")?,
        rss: f.next("rss")?,
        rsslim: f.next("rsslim")?,
        startcode: f.next("startcode")?,
        endcode: f.next("endcode")?,
        startstack: f.next("startstack")?,
        kstkesp: f.next("kstkesp")?,
        kstkeip: f.next("kstkeip")?,
        signal: f.next("signal")?,
        blocked: f.next("blocked")?,
        sigignore: f.next("sigignore")?,
        sigcatch: f.next("sigcatch")?,
        wchan: f.next("wchan")?,
        nswap: f.next("nswap")?,
        cnswap: f.next("cnswap")?,
        exit_signal: f.next("exit_signal")?,
        processor: f.next("processor")?,
        rt_priority: f.next("rt_priority")?,
        policy: f.next("policy")?,
        delayacct_blkio_ticks: f.next("delayacct_blkio_ticks")?,
        guest_time: f.next("guest_time")?,
        cguest_time: f.next("cguest_time")?,
        data_segment: None,
        arg_env: None,
    };

    if f.remaining() > 0 {
        stat.data_segment = Some(DataSegment {
            start_data: f.next("start_data")?,
            end_data: f.next("end_data")?,
            start_brk: f.next("start_brk")?,
        });
    }
    if f.remaining() > 0 {
        stat.arg_env = Some(ArgEnvLayout {
            arg_start: f.next("arg_start")?,
            arg_end: f.next("arg_end")?,
            env_start: f.next("env_start")?,
            env_end: f.next("env_end")?,
            exit_code: f.next("exit_code")?,
        });
    }

    Ok(stat)
}

/// Positional reader over the fields after the name
struct Fields<'a> {
    fields: Vec<&'a str>,
    pos: usize,
}

impl Fields<'_> {
    fn next<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self
            .fields
            .get(self.pos)
            .ok_or_else(|| ProcError::format(format!("stat: missing {}", what)))?;
        self.pos += 1;
        parse_dec(token, what)
    }

    fn remaining(&self) -> usize {
        self.fields.len() - self.pos
    }
}

// The status file is scanned token by token, like the kernel prints it:
// "VmRSS:\t    1234 kB"
fn parse_vm_rss(status: &str) -> Result<u64> {
    let mut tokens = status.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "VmRSS:" {
            let value = tokens
                .next()
                .ok_or_else(|| ProcError::format("status: VmRSS without a value"))?;
            return parse_dec(value, "VmRSS");
        }
    }
    Err(ProcError::format("status: no VmRSS line"))
}
