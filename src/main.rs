//! `query-proc`: one-shot queries against /proc from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use query_proc_info::{cpu, memory, process, socket, ProcRoot, ProcSource};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// `USER_HZ` on every mainstream Linux architecture
const FALLBACK_CLOCK_TICKS: u64 = 100;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text (default)
    Text,
    /// JSON for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "query-proc")]
#[command(version)]
#[command(about = "Query listening sockets and process accounting from /proc", long_about = None)]
struct Cli {
    /// Root of the procfs tree to read
    #[arg(long, env = "QUERY_PROC_ROOT", default_value = "/proc", global = true)]
    proc_root: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the pid of the process listening on a TCP port
    Port {
        port: u16,
        /// Only match sockets bound to the any-address
        #[arg(long)]
        wildcard_only: bool,
    },
    /// Print the parsed /proc/<pid>/stat record
    Stat { pid: i32 },
    /// Sample a process's share of system CPU
    Cpu {
        pid: i32,
        /// Sampling interval in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
    /// Print resident memory of a process, or total memory without a pid
    Mem { pid: Option<i32> },
    /// List every listening TCP socket and its owner
    Listeners,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    log::debug!(
        "query-proc v{} reading {}",
        query_proc_info::VERSION,
        cli.proc_root.display()
    );

    let src = ProcRoot::new(&cli.proc_root);
    run(&cli.command, &src, cli.format)
}

fn run(command: &Command, src: &dyn ProcSource, format: OutputFormat) -> Result<()> {
    match command {
        Command::Port {
            port,
            wildcard_only,
        } => {
            let pid = socket::find_pid_listening_on_port_in(src, *port, *wildcard_only)
                .with_context(|| format!("resolving owner of port {}", port))?;
            emit(format, &PortOwner { port: *port, pid }, || pid.to_string())
        }
        Command::Stat { pid } => {
            let stat = process::read_process_stat_in(src, *pid)
                .with_context(|| format!("reading stat of pid {}", pid))?;
            emit(format, &stat, || {
                let hz = ticks_or_fallback(cpu::clock_ticks_per_second());
                [
                    format!("pid:       {}", stat.pid),
                    format!("comm:      {}", stat.comm),
                    format!("state:     {} ({})", stat.state, stat.process_state()),
                    format!("ppid:      {}", stat.ppid),
                    format!("threads:   {}", stat.num_threads),
                    format!("nice:      {}", stat.nice),
                    format!(
                        "utime:     {} ticks ({:.2}s)",
                        stat.utime,
                        cpu::ticks_to_seconds(stat.utime, hz)
                    ),
                    format!(
                        "stime:     {} ticks ({:.2}s)",
                        stat.stime,
                        cpu::ticks_to_seconds(stat.stime, hz)
                    ),
                    format!("vsize:     {} bytes", stat.vsize),
                    format!("rss:       {} pages", stat.rss),
                    format!("starttime: {}", stat.starttime),
                ]
                .join("\n")
            })
        }
        Command::Cpu { pid, interval_ms } => {
            let interval = Duration::from_millis(*interval_ms);
            let fraction = cpu::sample_cpu_fraction_in(src, *pid, interval)
                .with_context(|| format!("sampling cpu of pid {}", pid))?;
            emit(
                format,
                &CpuSample {
                    pid: *pid,
                    interval_ms: *interval_ms,
                    fraction,
                },
                || format!("{:.2}%", fraction * 100.0),
            )
        }
        Command::Mem { pid: Some(pid) } => {
            let kb = process::process_memory_kb_in(src, *pid)
                .with_context(|| format!("reading VmRSS of pid {}", pid))?;
            emit(format, &MemoryKb { pid: Some(*pid), kb }, || format!("{} kB", kb))
        }
        Command::Mem { pid: None } => {
            let kb = memory::total_memory_kb_in(src).context("reading MemTotal")?;
            emit(format, &MemoryKb { pid: None, kb }, || format!("{} kB", kb))
        }
        Command::Listeners => {
            let listeners = socket::listeners_in(src).context("listing listeners")?;
            emit(format, &listeners, || {
                let mut out = format!("{:<6} {:>5} {:<8} {}", "PROTO", "PORT", "SCOPE", "PID");
                for l in &listeners {
                    out.push_str(&format!(
                        "\n{:<6} {:>5} {:<8} {}",
                        l.socket.family.to_string(),
                        l.socket.port,
                        if l.socket.wildcard { "any" } else { "bound" },
                        l.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
                    ));
                }
                out
            })
        }
    }
}

/// Tick rate for rendering seconds; a failed lookup is logged, not fatal
fn ticks_or_fallback(hz: query_proc_info::Result<u64>) -> u64 {
    match hz {
        Ok(hz) => hz,
        Err(e) => {
            log::warn!("{}, assuming {} ticks per second", e, FALLBACK_CLOCK_TICKS);
            FALLBACK_CLOCK_TICKS
        }
    }
}

fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce() -> String,
) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

#[derive(Serialize)]
struct PortOwner {
    port: u16,
    pid: u32,
}

#[derive(Serialize)]
struct CpuSample {
    pid: i32,
    interval_ms: u64,
    fraction: f64,
}

#[derive(Serialize)]
struct MemoryKb {
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<i32>,
    kb: u64,
}
