//! Common types used across the library

use serde::Serialize;
use std::fmt;

/// TCP connection state code for a listening socket (`TCP_LISTEN`)
pub const TCP_STATE_LISTEN: u8 = 0x0A;

/// Address family of a kernel TCP table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AddressFamily {
    /// IPv4, `/proc/net/tcp`
    Ipv4,
    /// IPv6, `/proc/net/tcp6`
    Ipv6,
}

impl AddressFamily {
    /// Scan order used by the port resolver
    pub const ALL: [AddressFamily; 2] = [AddressFamily::Ipv4, AddressFamily::Ipv6];

    /// Path of the TCP table, relative to the /proc root
    pub fn tcp_table(&self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "net/tcp",
            AddressFamily::Ipv6 => "net/tcp6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "tcp"),
            AddressFamily::Ipv6 => write!(f, "tcp6"),
        }
    }
}

/// Identifier of one kernel socket object (its inode number, as text)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SocketToken(pub String);

impl SocketToken {
    /// The fd link target a process holding this socket would show
    pub fn link_target(&self) -> String {
        format!("socket:[{}]", self.0)
    }
}

impl fmt::Display for SocketToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of `/proc/net/tcp` or `/proc/net/tcp6`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpEntry {
    /// Local address as the kernel prints it (hex, host byte order words)
    pub local_address: String,
    /// Local port
    pub local_port: u16,
    /// Connection state code
    pub state: u8,
    /// Socket inode
    pub token: SocketToken,
}

impl TcpEntry {
    pub fn is_listening(&self) -> bool {
        self.state == TCP_STATE_LISTEN
    }

    /// Bound to the any-address (`0.0.0.0` or `::`)
    pub fn is_wildcard(&self) -> bool {
        self.local_address == "00000000" || self.local_address == "00000000000000000000000000000000"
    }
}

/// A listening socket found in a TCP table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListeningSocket {
    pub family: AddressFamily,
    pub port: u16,
    pub token: SocketToken,
    /// Bound to the any-address rather than a specific one
    pub wildcard: bool,
}

/// A listening socket together with the process holding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listener {
    #[serde(flatten)]
    pub socket: ListeningSocket,
    /// None when no readable process holds the socket
    pub pid: Option<u32>,
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ProcessState {
    /// Running
    Running,
    /// Interruptible sleep
    Sleeping,
    /// Uninterruptible disk sleep
    DiskSleep,
    /// Stopped or traced
    Stopped,
    /// Zombie
    Zombie,
    /// Dead
    Dead,
    /// Idle kernel thread
    Idle,
    /// Unknown state
    #[default]
    Unknown,
}

impl ProcessState {
    pub fn from_code(code: &str) -> Self {
        match code {
            "R" => ProcessState::Running,
            "S" => ProcessState::Sleeping,
            "D" => ProcessState::DiskSleep,
            "T" | "t" => ProcessState::Stopped,
            "Z" => ProcessState::Zombie,
            "X" | "x" => ProcessState::Dead,
            "I" => ProcessState::Idle,
            _ => ProcessState::Unknown,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Running => write!(f, "Running"),
            ProcessState::Sleeping => write!(f, "Sleeping"),
            ProcessState::DiskSleep => write!(f, "DiskSleep"),
            ProcessState::Stopped => write!(f, "Stopped"),
            ProcessState::Zombie => write!(f, "Zombie"),
            ProcessState::Dead => write!(f, "Dead"),
            ProcessState::Idle => write!(f, "Idle"),
            ProcessState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Data segment and heap boundaries (Linux 3.3+)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSegment {
    pub start_data: u64,
    pub end_data: u64,
    pub start_brk: u64,
}

/// Argument and environment boundaries plus exit code (Linux 3.5+)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgEnvLayout {
    pub arg_start: u64,
    pub arg_end: u64,
    pub env_start: u64,
    pub env_end: u64,
    pub exit_code: i64,
}

/// Parsed `/proc/<pid>/stat`. Field names follow proc(5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessStat {
    pub pid: i64,
    /// Executable name, without the surrounding parentheses
    pub comm: String,
    /// State letter as printed by the kernel
    pub state: String,
    pub ppid: i64,
    pub pgrp: i64,
    pub session: i64,
    pub tty_nr: i64,
    pub tpgid: i64,
    pub flags: u64,
    pub minflt: u64,
    pub cminflt: u64,
    pub majflt: u64,
    pub cmajflt: u64,
    /// User mode ticks
    pub utime: u64,
    /// Kernel mode ticks
    pub stime: u64,
    pub cutime: i64,
    pub cstime: i64,
    pub priority: i64,
    pub nice: i64,
    pub num_threads: i64,
    pub itrealvalue: i64,
    /// Ticks after boot at which the process started
    pub starttime: i64,
    /// Virtual memory size in bytes
    pub vsize: u64,
    /// Resident set size in pages
    pub rss: i64,
    pub rsslim: u64,
    pub startcode: u64,
    pub endcode: u64,
    pub startstack: u64,
    pub kstkesp: u64,
    pub kstkeip: u64,
    pub signal: u64,
    pub blocked: u64,
    pub sigignore: u64,
    pub sigcatch: u64,
    pub wchan: u64,
    pub nswap: u64,
    pub cnswap: u64,
    pub exit_signal: i64,
    pub processor: i64,
    pub rt_priority: u64,
    pub policy: u64,
    pub delayacct_blkio_ticks: u64,
    pub guest_time: u64,
    pub cguest_time: i64,
    /// Present on kernels that print the data segment fields
    pub data_segment: Option<DataSegment>,
    /// Present on kernels that print the arg/env fields
    pub arg_env: Option<ArgEnvLayout>,
}

impl ProcessStat {
    pub fn process_state(&self) -> ProcessState {
        ProcessState::from_code(&self.state)
    }

    /// User plus kernel ticks
    pub fn total_ticks(&self) -> u64 {
        self.utime.saturating_add(self.stime)
    }
}

/// Aggregate CPU counters from the first line of `/proc/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SystemCpuSnapshot {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
}

impl SystemCpuSnapshot {
    pub fn total(&self) -> u64 {
        self.user
            .saturating_add(self.nice)
            .saturating_add(self.system)
    }
}
