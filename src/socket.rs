//! Listening socket to process resolution
//!
//! The kernel does not say which process owns a socket. We find the socket's
//! inode in the TCP table (`/proc/net/tcp`, `/proc/net/tcp6`), then look for a
//! process whose `fd` directory holds a link to `socket:[<inode>]`.
//!
//! Owner resolution tolerates per-process failures: a process whose `fd`
//! directory or fd link cannot be read (permission denied, exited mid-scan) is
//! skipped. Failing to list the process directory itself is an error.

use crate::error::{ProcError, Result};
use crate::process;
use crate::source::{self, ProcSource};
use crate::types::{AddressFamily, Listener, ListeningSocket, SocketToken, TcpEntry};
use crate::util::{is_all_digits, parse_dec, parse_hex_u16, parse_hex_u8};
use std::collections::HashMap;

/// Columns after splitting a row on whitespace and ':'
const LOCAL_ADDRESS: usize = 1;
const LOCAL_PORT: usize = 2;
const STATE: usize = 5;
const INODE: usize = 13;
const MIN_FIELDS: usize = INODE + 1;

/// Find the pid of the process listening on `port`, IPv4 first, then IPv6.
///
/// With `wildcard_only`, only sockets bound to the any-address qualify.
pub fn find_pid_listening_on_port(port: u16, wildcard_only: bool) -> Result<u32> {
    find_pid_listening_on_port_in(&source::live_root()?, port, wildcard_only)
}

/// [`find_pid_listening_on_port`] against an arbitrary /proc tree
pub fn find_pid_listening_on_port_in(
    src: &dyn ProcSource,
    port: u16,
    wildcard_only: bool,
) -> Result<u32> {
    let mut not_found = ProcError::NoProcessListening { port };

    for family in AddressFamily::ALL {
        match find_pid_listening_in(src, family, port, wildcard_only) {
            Ok(pid) if pid > 0 => return Ok(pid),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                log::debug!("{} pass for port {}: {}", family, port, e);
                // a listener without an owner says more than an empty table
                if matches!(not_found, ProcError::NoProcessListening { .. }) {
                    not_found = e;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(not_found)
}

/// Resolve the listener on `port` within a single address family
pub fn find_pid_listening_in(
    src: &dyn ProcSource,
    family: AddressFamily,
    port: u16,
    wildcard_only: bool,
) -> Result<u32> {
    let table = match read_table(src, family)? {
        Some(table) => table,
        None => return Err(ProcError::NoProcessListening { port }),
    };

    match first_listener(&table, port, wildcard_only)? {
        Some(token) => {
            log::debug!("port {} is socket:[{}] in {}", port, token, family);
            resolve_owner_in(src, &token)
        }
        None => Err(ProcError::NoProcessListening { port }),
    }
}

/// Scan a TCP table top to bottom and return the token of the first
/// listening row on `port`. Rows after the match are not parsed.
fn first_listener(table: &str, port: u16, wildcard_only: bool) -> Result<Option<SocketToken>> {
    for line in table.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let entry = parse_tcp_line(line)?;
        if entry.is_listening()
            && entry.local_port == port
            && (!wildcard_only || entry.is_wildcard())
        {
            return Ok(Some(entry.token));
        }
    }
    Ok(None)
}

/// Read a TCP table. A missing IPv6 table means IPv6 is disabled and is
/// reported as `None`.
fn read_table(src: &dyn ProcSource, family: AddressFamily) -> Result<Option<String>> {
    match src.read_to_string(family.tcp_table()) {
        Ok(table) => Ok(Some(table)),
        Err(e) if family == AddressFamily::Ipv6 && e.is_missing_file() => {
            log::debug!("no {} table, skipping", family);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Parse one row of `/proc/net/tcp{,6}`
///
/// ```text
///   0: 00000000:0016 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 12345 1 ...
/// ```
pub fn parse_tcp_line(line: &str) -> Result<TcpEntry> {
    let fields: Vec<&str> = line
        .split(|c: char| c.is_whitespace() || c == ':')
        .filter(|f| !f.is_empty())
        .collect();

    if fields.len() < MIN_FIELDS {
        return Err(ProcError::format(format!(
            "tcp table row has {} fields, expected at least {}: {:?}",
            fields.len(),
            MIN_FIELDS,
            line
        )));
    }

    Ok(TcpEntry {
        local_address: fields[LOCAL_ADDRESS].to_string(),
        local_port: parse_hex_u16(fields[LOCAL_PORT], "local port")?,
        state: parse_hex_u8(fields[STATE], "socket state")?,
        token: SocketToken(fields[INODE].to_string()),
    })
}

/// Parse a whole TCP table, header included
pub fn parse_tcp_table(table: &str) -> Result<Vec<TcpEntry>> {
    table
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(parse_tcp_line)
        .collect()
}

/// Every listening socket in a TCP table, in file order
pub fn listening_sockets(family: AddressFamily, table: &str) -> Result<Vec<ListeningSocket>> {
    Ok(parse_tcp_table(table)?
        .into_iter()
        .filter(TcpEntry::is_listening)
        .map(|entry| ListeningSocket {
            family,
            port: entry.local_port,
            wildcard: entry.is_wildcard(),
            token: entry.token,
        })
        .collect())
}

/// Find the process holding `token` among the process directories of `src`.
///
/// Processes are visited in directory order and their descriptors in
/// descriptor order; the first match wins.
pub fn resolve_owner_in(src: &dyn ProcSource, token: &SocketToken) -> Result<u32> {
    let target = token.link_target();

    for name in src.list_dir("")? {
        if !is_all_digits(&name) {
            continue;
        }
        let fd_dir = format!("{}/fd", name);
        let fds = match src.list_dir(&fd_dir) {
            Ok(fds) => fds,
            Err(e) => {
                log::debug!("skipping pid {}: {}", name, e);
                continue;
            }
        };
        for fd in fds {
            match src.read_link(&format!("{}/{}", fd_dir, fd)) {
                Ok(link) if link == target => return parse_dec::<u32>(&name, "pid"),
                Ok(_) => {}
                Err(e) => log::trace!("skipping fd {} of pid {}: {}", fd, name, e),
            }
        }
    }

    Err(ProcError::NoProcessWithSocket {
        token: token.0.clone(),
    })
}

/// Every listening TCP socket on the host with its owning process
pub fn all_listeners() -> Result<Vec<Listener>> {
    listeners_in(&source::live_root()?)
}

/// [`all_listeners`] against an arbitrary /proc tree
pub fn listeners_in(src: &dyn ProcSource) -> Result<Vec<Listener>> {
    let mut sockets = Vec::new();
    for family in AddressFamily::ALL {
        if let Some(table) = read_table(src, family)? {
            sockets.extend(listening_sockets(family, &table)?);
        }
    }

    let owners = socket_owners_in(src)?;
    Ok(sockets
        .into_iter()
        .map(|socket| Listener {
            pid: owners.get(&socket.token).copied(),
            socket,
        })
        .collect())
}

/// Map every socket token held by a readable process to that process.
/// When several processes share a socket the first in directory order wins.
fn socket_owners_in(src: &dyn ProcSource) -> Result<HashMap<SocketToken, u32>> {
    let mut owners = HashMap::new();
    for name in src.list_dir("")? {
        if !is_all_digits(&name) {
            continue;
        }
        let pid = parse_dec::<u32>(&name, "pid")?;
        let tokens = match process::socket_tokens_in(src, pid) {
            Ok(tokens) => tokens,
            Err(e) => {
                log::debug!("skipping pid {}: {}", pid, e);
                continue;
            }
        };
        for token in tokens {
            owners.entry(token).or_insert(pid);
        }
    }
    Ok(owners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixture::{FakeProc, MemProc};

    const HEADER: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n";

    fn row(sl: u32, addr: &str, port: u16, state: u8, inode: &str) -> String {
        format!(
            "{:>4}: {}:{:04X} 00000000:0000 {:02X} 00000000:00000000 00:00000000 00000000     0        0 {} 1 0000000000000000 100 0 0 10 0\n",
            sl, addr, port, state, inode
        )
    }

    fn row6(sl: u32, addr: &str, port: u16, state: u8, inode: &str) -> String {
        format!(
            "{:>4}: {}:{:04X} 00000000000000000000000000000000:0000 {:02X} 00000000:00000000 00:00000000 00000000     0        0 {} 1 0000000000000000 100 0 0 10 0\n",
            sl, addr, port, state, inode
        )
    }

    fn table(rows: &[String]) -> String {
        let mut t = HEADER.to_string();
        for r in rows {
            t.push_str(r);
        }
        t
    }

    #[test]
    fn test_parse_tcp_line() {
        let entry = parse_tcp_line(&row(0, "00000000", 22, 0x0A, "12345")).unwrap();
        assert_eq!(entry.local_address, "00000000");
        assert_eq!(entry.local_port, 22);
        assert!(entry.is_listening());
        assert!(entry.is_wildcard());
        assert_eq!(entry.token, SocketToken("12345".to_string()));
    }

    #[test]
    fn test_parse_tcp6_line() {
        let entry = parse_tcp_line(&row6(
            3,
            "00000000000000000000000001000000",
            8080,
            0x01,
            "777",
        ))
        .unwrap();
        assert_eq!(entry.local_port, 8080);
        assert!(!entry.is_listening());
        assert!(!entry.is_wildcard());
        assert_eq!(entry.token.0, "777");
    }

    #[test]
    fn test_short_row_is_format_error() {
        let err = parse_tcp_line("   0: 00000000:0016 00000000:0000 0A").unwrap_err();
        assert!(matches!(err, ProcError::Format(_)));
    }

    #[test]
    fn test_bad_port_is_format_error() {
        let line = row(0, "00000000", 22, 0x0A, "1").replace(":0016", ":00ZZ");
        assert!(matches!(parse_tcp_line(&line), Err(ProcError::Format(_))));
    }

    #[test]
    fn test_listening_sockets_filters_state() {
        let t = table(&[
            row(0, "0100007F", 631, 0x0A, "10"),
            row(1, "0100007F", 40000, 0x01, "11"),
            row(2, "00000000", 22, 0x0A, "12"),
        ]);
        let sockets = listening_sockets(AddressFamily::Ipv4, &t).unwrap();
        assert_eq!(sockets.len(), 2);
        assert_eq!(sockets[0].port, 631);
        assert!(!sockets[0].wildcard);
        assert_eq!(sockets[1].port, 22);
        assert!(sockets[1].wildcard);
    }

    #[test]
    fn test_first_listener_wins() {
        let t = table(&[
            row(0, "0100007F", 22, 0x0A, "100"),
            row(1, "00000000", 22, 0x0A, "200"),
        ]);
        assert_eq!(
            first_listener(&t, 22, false).unwrap(),
            Some(SocketToken("100".into()))
        );
        assert_eq!(
            first_listener(&t, 22, true).unwrap(),
            Some(SocketToken("200".into()))
        );
        assert_eq!(first_listener(&t, 80, false).unwrap(), None);
    }

    #[test]
    fn test_resolves_wildcard_listener() {
        let fake = FakeProc::new();
        fake.file("net/tcp", &table(&[row(0, "00000000", 22, 0x0A, "12345")]))
            .file("net/tcp6", HEADER)
            .fd_link(7, 0, "/dev/null")
            .fd_link(7, 3, "socket:[12345]")
            .fd_link(9, 4, "socket:[999]")
            .dir("self");

        assert_eq!(find_pid_listening_on_port_in(&fake.source(), 22, true).unwrap(), 7);
        assert_eq!(find_pid_listening_on_port_in(&fake.source(), 22, false).unwrap(), 7);
    }

    #[test]
    fn test_specific_address_rejected_when_wildcard_only() {
        let fake = FakeProc::new();
        fake.file("net/tcp", &table(&[row(0, "0100007F", 22, 0x0A, "12345")]))
            .file("net/tcp6", HEADER)
            .fd_link(7, 3, "socket:[12345]");

        let err = find_pid_listening_on_port_in(&fake.source(), 22, true).unwrap_err();
        assert!(matches!(err, ProcError::NoProcessListening { port: 22 }));
        assert_eq!(find_pid_listening_on_port_in(&fake.source(), 22, false).unwrap(), 7);
    }

    #[test]
    fn test_malformed_row_aborts_scan() {
        let mut t = table(&[row(0, "0100007F", 80, 0x0A, "1")]);
        t.push_str("   1: 00000000:0016 00000000:0000 0A\n");
        t.push_str(&row(2, "00000000", 22, 0x0A, "12345"));

        let fake = FakeProc::new();
        fake.file("net/tcp", &t)
            .file(
                "net/tcp6",
                &table(&[row6(0, "00000000000000000000000000000000", 22, 0x0A, "12345")]),
            )
            .fd_link(7, 3, "socket:[12345]");

        let err = find_pid_listening_on_port_in(&fake.source(), 22, true).unwrap_err();
        assert!(matches!(err, ProcError::Format(_)));
    }

    #[test]
    fn test_falls_through_to_ipv6() {
        let fake = FakeProc::new();
        fake.file("net/tcp", HEADER)
            .file(
                "net/tcp6",
                &table(&[row6(0, "00000000000000000000000000000000", 443, 0x0A, "55")]),
            )
            .fd_link(300, 5, "socket:[55]");

        assert_eq!(find_pid_listening_on_port_in(&fake.source(), 443, true).unwrap(), 300);
    }

    #[test]
    fn test_missing_tcp6_is_not_found() {
        let fake = FakeProc::new();
        fake.file("net/tcp", HEADER);
        let err = find_pid_listening_on_port_in(&fake.source(), 22, false).unwrap_err();
        assert!(matches!(err, ProcError::NoProcessListening { port: 22 }));
    }

    #[test]
    fn test_missing_tcp_is_io_error() {
        let fake = FakeProc::new();
        fake.file("net/tcp6", HEADER);
        let err = find_pid_listening_on_port_in(&fake.source(), 22, false).unwrap_err();
        assert!(err.is_missing_file());
    }

    #[test]
    fn test_unowned_socket() {
        let fake = FakeProc::new();
        fake.file("net/tcp", &table(&[row(0, "00000000", 22, 0x0A, "12345")]))
            .file("net/tcp6", HEADER)
            .fd_link(7, 3, "socket:[54321]");

        let err = find_pid_listening_on_port_in(&fake.source(), 22, true).unwrap_err();
        assert!(matches!(err, ProcError::NoProcessWithSocket { ref token } if token == "12345"));
    }

    #[test]
    fn test_resolve_owner_skips_non_pid_entries() {
        let fake = FakeProc::new();
        fake.dir("sys").fd_link(12, 1, "socket:[8]");
        // "self" looks like a process but is not all digits
        fake.file("self/fd/placeholder", "");

        let pid = resolve_owner_in(&fake.source(), &SocketToken("8".into())).unwrap();
        assert_eq!(pid, 12);
    }

    #[test]
    fn test_resolve_owner_skips_process_without_fd_dir() {
        let fake = FakeProc::new();
        fake.dir("5").fd_link(6, 2, "socket:[77]");

        assert_eq!(resolve_owner_in(&fake.source(), &SocketToken("77".into())).unwrap(), 6);
    }

    #[test]
    fn test_resolve_owner_skips_unreadable_fd_link() {
        let fake = FakeProc::new();
        fake.file("5/fd/3", "not a link")
            .fd_link(5, 4, "socket:[1]")
            .fd_link(6, 2, "socket:[77]");

        assert_eq!(resolve_owner_in(&fake.source(), &SocketToken("77".into())).unwrap(), 6);
    }

    #[test]
    fn test_resolve_owner_continues_past_bad_fd_in_same_process() {
        let mut mem = MemProc::new();
        mem.file("5/fd/3", "not a link").fd_link(5, 4, "socket:[77]");

        assert_eq!(resolve_owner_in(&mem, &SocketToken("77".into())).unwrap(), 5);
    }

    #[test]
    fn test_first_process_in_directory_order_wins() {
        let mut mem = MemProc::new();
        mem.fd_link(900, 3, "socket:[7]").fd_link(5, 3, "socket:[7]");
        assert_eq!(resolve_owner_in(&mem, &SocketToken("7".into())).unwrap(), 900);

        let mut mem = MemProc::new();
        mem.fd_link(5, 3, "socket:[7]").fd_link(900, 3, "socket:[7]");
        assert_eq!(resolve_owner_in(&mem, &SocketToken("7".into())).unwrap(), 5);
    }

    #[test]
    fn test_ipv4_owner_wins_over_ipv6() {
        let mut mem = MemProc::new();
        mem.file("net/tcp", &table(&[row(0, "00000000", 80, 0x0A, "10")]))
            .file(
                "net/tcp6",
                &table(&[row6(0, "00000000000000000000000000000000", 80, 0x0A, "20")]),
            )
            // the IPv6 owner comes first in directory order
            .fd_link(20, 3, "socket:[20]")
            .fd_link(10, 3, "socket:[10]");

        assert_eq!(find_pid_listening_on_port_in(&mem, 80, true).unwrap(), 10);
    }

    #[test]
    fn test_unowned_ipv4_listener_falls_through_to_ipv6() {
        let mut mem = MemProc::new();
        mem.file("net/tcp", &table(&[row(0, "00000000", 80, 0x0A, "10")]))
            .file(
                "net/tcp6",
                &table(&[row6(0, "00000000000000000000000000000000", 80, 0x0A, "20")]),
            )
            .fd_link(20, 3, "socket:[20]");

        assert_eq!(find_pid_listening_on_port_in(&mem, 80, false).unwrap(), 20);
    }

    #[test]
    fn test_resolve_owner_missing_proc_dir_is_error() {
        let src = crate::source::ProcRoot::new("/nonexistent/query_proc_info/proc");
        let err = resolve_owner_in(&src, &SocketToken("1".into())).unwrap_err();
        assert!(matches!(err, ProcError::Io { .. }));
    }

    #[test]
    fn test_listeners_in() {
        let fake = FakeProc::new();
        fake.file(
            "net/tcp",
            &table(&[
                row(0, "00000000", 22, 0x0A, "10"),
                row(1, "0100007F", 5432, 0x0A, "11"),
                row(2, "0100007F", 5432, 0x01, "12"),
            ]),
        )
        .file(
            "net/tcp6",
            &table(&[row6(0, "00000000000000000000000000000000", 22, 0x0A, "20")]),
        )
        .fd_link(100, 3, "socket:[10]")
        .fd_link(100, 4, "socket:[20]");

        let listeners = listeners_in(&fake.source()).unwrap();
        assert_eq!(listeners.len(), 3);
        assert_eq!(listeners[0].pid, Some(100));
        assert_eq!(listeners[1].socket.port, 5432);
        assert_eq!(listeners[1].pid, None);
        assert_eq!(listeners[2].socket.family, AddressFamily::Ipv6);
        assert_eq!(listeners[2].pid, Some(100));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_finds_own_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
        let port = listener.local_addr().unwrap().port();

        let pid = find_pid_listening_on_port(port, false).expect("Failed to resolve own listener");
        assert_eq!(pid, std::process::id());

        let err = find_pid_listening_on_port(port, true).unwrap_err();
        assert!(err.is_not_found());
    }
}
