//! Host-specific connection enumeration and per-process accounting

use crate::types::RawConnection;
use crate::Result;

/// List all inet connections with their owning process, if known
///
/// # Errors
/// Returns an error if the connection tables cannot be read
pub fn get_connections() -> Result<Vec<RawConnection>> {
    #[cfg(target_os = "linux")]
    {
        linux::get_connections()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_connections()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Err(crate::Error::unsupported_platform("connection enumeration"))
    }
}

/// Cumulative bytes written by a process
///
/// # Errors
/// Returns [`crate::Error::ProcessGone`] or [`crate::Error::PermissionDenied`]
/// when the counters cannot be read
pub fn get_bytes_written(pid: u32) -> Result<u64> {
    #[cfg(target_os = "linux")]
    {
        linux::get_bytes_written(pid)
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_bytes_written(pid)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = pid;
        Err(crate::Error::unsupported_platform("process I/O counters"))
    }
}

/// Short executable name of a process
///
/// # Errors
/// Returns an error if the process cannot be queried
pub fn get_process_name(pid: u32) -> Result<String> {
    #[cfg(target_os = "linux")]
    {
        linux::get_process_name(pid)
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_process_name(pid)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = pid;
        Err(crate::Error::unsupported_platform("process names"))
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::collections::HashMap;
    use std::fs;
    #[cfg(not(feature = "linux-procfs"))]
    use std::io::{self, BufRead, BufReader};
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
    use std::path::Path;

    use libproc::proc_pid;
    #[cfg(not(feature = "linux-procfs"))]
    use log::debug;

    use crate::types::RawConnection;
    use crate::{Error, Result};

    /// Kernel limit on `comm` (TASK_COMM_LEN minus the terminator)
    const COMM_LEN: usize = 15;

    #[cfg(not(feature = "linux-procfs"))]
    const SOCKET_TABLES: [(&str, i32); 4] = [
        ("/proc/net/tcp", libc::SOCK_STREAM),
        ("/proc/net/tcp6", libc::SOCK_STREAM),
        ("/proc/net/udp", libc::SOCK_DGRAM),
        ("/proc/net/udp6", libc::SOCK_DGRAM),
    ];

    #[cfg(not(feature = "linux-procfs"))]
    pub fn get_connections() -> Result<Vec<RawConnection>> {
        let inode_to_pid = build_inode_to_pid_map()?;
        let mut connections = Vec::new();

        for (path, socket_type) in SOCKET_TABLES {
            match parse_socket_file(path, socket_type, &inode_to_pid) {
                Ok(entries) => connections.extend(entries),
                // tcp6/udp6 are absent when IPv6 is disabled
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{path} not present, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(connections)
    }

    #[cfg(feature = "linux-procfs")]
    pub fn get_connections() -> Result<Vec<RawConnection>> {
        use procfs::net::{tcp, tcp6, udp, udp6};

        let inode_to_pid = procfs_inode_map();
        let table_error = |table: &str, e: procfs::ProcError| Error::invalid_format(table, e.to_string());
        let mut connections = Vec::new();

        for entry in tcp()
            .map_err(|e| table_error("/proc/net/tcp", e))?
            .into_iter()
            .chain(tcp6().unwrap_or_default())
        {
            connections.push(RawConnection::new(
                inode_to_pid.get(&entry.inode).copied(),
                Some(entry.local_address),
                Some(entry.remote_address),
                libc::SOCK_STREAM,
            ));
        }

        for entry in udp()
            .map_err(|e| table_error("/proc/net/udp", e))?
            .into_iter()
            .chain(udp6().unwrap_or_default())
        {
            connections.push(RawConnection::new(
                inode_to_pid.get(&entry.inode).copied(),
                Some(entry.local_address),
                Some(entry.remote_address),
                libc::SOCK_DGRAM,
            ));
        }

        Ok(connections)
    }

    #[cfg(feature = "linux-procfs")]
    fn procfs_inode_map() -> HashMap<u64, u32> {
        use procfs::process::{all_processes, FDTarget};

        let mut map = HashMap::new();
        let Ok(processes) = all_processes() else {
            return map;
        };

        for process in processes.flatten() {
            let Ok(pid) = u32::try_from(process.pid()) else {
                continue;
            };
            if let Ok(fds) = process.fd() {
                for fd in fds.flatten() {
                    if let FDTarget::Socket(inode) = fd.target {
                        map.insert(inode, pid);
                    }
                }
            }
        }

        map
    }

    #[cfg(feature = "linux-procfs")]
    fn from_proc_error(pid: u32, err: procfs::ProcError) -> Error {
        match err {
            procfs::ProcError::NotFound(_) => Error::process_gone(pid),
            procfs::ProcError::PermissionDenied(_) => {
                Error::permission_denied(format!("process {pid}"))
            }
            other => Error::invalid_format(format!("/proc/{pid}"), other.to_string()),
        }
    }

    #[cfg(not(feature = "linux-procfs"))]
    pub fn get_bytes_written(pid: u32) -> Result<u64> {
        let path = format!("/proc/{pid}/io");
        let content = fs::read_to_string(&path).map_err(|e| Error::from_io_for_pid(pid, e))?;
        parse_write_bytes(&content).ok_or_else(|| Error::invalid_format(path, "missing write_bytes"))
    }

    #[cfg(feature = "linux-procfs")]
    pub fn get_bytes_written(pid: u32) -> Result<u64> {
        let pid_i32 =
            i32::try_from(pid).map_err(|_| Error::invalid_format("pid", pid.to_string()))?;
        let process =
            procfs::process::Process::new(pid_i32).map_err(|e| from_proc_error(pid, e))?;
        Ok(process.io().map_err(|e| from_proc_error(pid, e))?.write_bytes)
    }

    pub fn get_process_name(pid: u32) -> Result<String> {
        let comm = fs::read_to_string(format!("/proc/{pid}/comm"))
            .map_err(|e| Error::from_io_for_pid(pid, e))?;
        let comm = comm.trim_end_matches('\n').to_string();
        if comm.len() < COMM_LEN {
            return Ok(comm);
        }

        // comm was truncated by the kernel
        Ok(executable_name(pid)
            .filter(|name| name.starts_with(&comm))
            .unwrap_or(comm))
    }

    fn executable_name(pid: u32) -> Option<String> {
        let path = proc_pid::pidpath(i32::try_from(pid).ok()?).ok()?;
        Path::new(&path)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
    }

    #[cfg_attr(feature = "linux-procfs", allow(dead_code))]
    fn parse_write_bytes(content: &str) -> Option<u64> {
        content
            .lines()
            .find_map(|line| line.strip_prefix("write_bytes:"))
            .and_then(|value| value.trim().parse().ok())
    }

    #[cfg(not(feature = "linux-procfs"))]
    fn build_inode_to_pid_map() -> Result<HashMap<u64, u32>> {
        let mut map = HashMap::new();

        for entry in fs::read_dir("/proc")? {
            let entry = entry?;
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
                continue;
            };

            // Other users' fd tables are unreadable without privileges
            let Ok(fd_dir) = fs::read_dir(format!("/proc/{pid}/fd")) else {
                continue;
            };
            for fd_entry in fd_dir.flatten() {
                if let Ok(link) = fs::read_link(fd_entry.path()) {
                    if let Some(inode) = extract_socket_inode(&link.to_string_lossy()) {
                        map.insert(inode, pid);
                    }
                }
            }
        }

        Ok(map)
    }

    #[cfg(not(feature = "linux-procfs"))]
    fn extract_socket_inode(link: &str) -> Option<u64> {
        link.strip_prefix("socket:[")?
            .strip_suffix(']')?
            .parse()
            .ok()
    }

    #[cfg(not(feature = "linux-procfs"))]
    fn parse_socket_file(
        path: &str,
        socket_type: i32,
        inode_to_pid: &HashMap<u64, u32>,
    ) -> Result<Vec<RawConnection>> {
        let reader = BufReader::new(fs::File::open(path)?);

        Ok(reader
            .lines()
            .skip(1)
            .map_while(std::result::Result::ok)
            .filter_map(|line| parse_socket_line(&line, socket_type, inode_to_pid))
            .collect())
    }

    #[cfg_attr(feature = "linux-procfs", allow(dead_code))]
    fn parse_socket_line(
        line: &str,
        socket_type: i32,
        inode_to_pid: &HashMap<u64, u32>,
    ) -> Option<RawConnection> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            return None;
        }

        let local = parse_hex_address(parts[1])?;
        let remote = parse_hex_address(parts[2])?;
        let inode = parts[9].parse::<u64>().ok()?;

        Some(RawConnection::new(
            inode_to_pid.get(&inode).copied(),
            Some(local),
            Some(remote),
            socket_type,
        ))
    }

    /// Parse `0100007F:0050` style addresses. Each 32-bit word is printed in
    /// host byte order.
    #[cfg_attr(feature = "linux-procfs", allow(dead_code))]
    fn parse_hex_address(hex_addr: &str) -> Option<SocketAddr> {
        let (addr, port) = hex_addr.split_once(':')?;
        let port = u16::from_str_radix(port, 16).ok()?;

        let ip = match addr.len() {
            8 => {
                let word = u32::from_str_radix(addr, 16).ok()?;
                IpAddr::V4(Ipv4Addr::from(word.to_be()))
            }
            32 => {
                let mut bytes = [0u8; 16];
                for (i, chunk) in bytes.chunks_exact_mut(4).enumerate() {
                    let word = u32::from_str_radix(addr.get(i * 8..i * 8 + 8)?, 16).ok()?;
                    chunk.copy_from_slice(&word.to_be().to_be_bytes());
                }
                IpAddr::V6(Ipv6Addr::from(bytes))
            }
            _ => return None,
        };

        Some(SocketAddr::new(ip, port))
    }

}

#[cfg(target_os = "macos")]
mod macos {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

    use libproc::file_info::{pidfdinfo, ListFDs, ProcFDType};
    use libproc::libproc::bsd_info::BSDInfo;
    use libproc::net_info::{InSockInfo, SocketFDInfo, SocketInfoKind};
    use libproc::pid_rusage::{pidrusage, RUsageInfoV2};
    use libproc::proc_pid::{listpidinfo, name, pidinfo};
    use libproc::processes::{pids_by_type, ProcFilter};

    use crate::types::RawConnection;
    use crate::{Error, Result};

    const INI_IPV6: u8 = 0x2;

    pub fn get_connections() -> Result<Vec<RawConnection>> {
        let pids = pids_by_type(ProcFilter::All)
            .map_err(|e| Error::permission_denied(format!("process list ({e})")))?;
        let mut connections = Vec::new();

        for pid in pids {
            let Ok(pid_i32) = i32::try_from(pid) else {
                continue;
            };
            // Processes owned by other users fail here without root
            let Ok(bsd_info) = pidinfo::<BSDInfo>(pid_i32, 0) else {
                continue;
            };
            let Ok(fds) = listpidinfo::<ListFDs>(pid_i32, bsd_info.pbi_nfiles as usize) else {
                continue;
            };

            for fd in fds {
                if !matches!(ProcFDType::from(fd.proc_fdtype), ProcFDType::Socket) {
                    continue;
                }
                if let Ok(info) = pidfdinfo::<SocketFDInfo>(pid_i32, fd.proc_fd) {
                    if let Some(conn) = to_raw_connection(pid, &info) {
                        connections.push(conn);
                    }
                }
            }
        }

        Ok(connections)
    }

    fn to_raw_connection(pid: u32, fd_info: &SocketFDInfo) -> Option<RawConnection> {
        let socket_info = &fd_info.psi;
        if !matches!(socket_info.soi_protocol, libc::IPPROTO_TCP | libc::IPPROTO_UDP) {
            return None;
        }

        // Union access is guarded by soi_kind
        let in_info: &InSockInfo = match SocketInfoKind::from(socket_info.soi_kind) {
            SocketInfoKind::Tcp => unsafe { &socket_info.soi_proto.pri_tcp.tcpsi_ini },
            SocketInfoKind::In => unsafe { &socket_info.soi_proto.pri_in },
            _ => return None,
        };

        let is_v6 = in_info.insi_vflag & INI_IPV6 != 0;
        let (local_ip, remote_ip) = unsafe {
            if is_v6 {
                (
                    IpAddr::V6(Ipv6Addr::from(in_info.insi_laddr.ina_6.s6_addr)),
                    IpAddr::V6(Ipv6Addr::from(in_info.insi_faddr.ina_6.s6_addr)),
                )
            } else {
                (
                    IpAddr::V4(Ipv4Addr::from(u32::from_be(
                        in_info.insi_laddr.ina_46.i46a_addr4.s_addr,
                    ))),
                    IpAddr::V4(Ipv4Addr::from(u32::from_be(
                        in_info.insi_faddr.ina_46.i46a_addr4.s_addr,
                    ))),
                )
            }
        };

        Some(RawConnection::new(
            Some(pid),
            Some(SocketAddr::new(local_ip, network_port(in_info.insi_lport))),
            Some(SocketAddr::new(remote_ip, network_port(in_info.insi_fport))),
            socket_info.soi_type,
        ))
    }

    /// Ports are stored in network byte order in the low 16 bits
    fn network_port(raw: i32) -> u16 {
        u16::try_from(raw & 0xffff).map_or(0, u16::from_be)
    }

    fn classify(pid: u32, err: &str) -> Error {
        if err.contains("No such process") {
            Error::process_gone(pid)
        } else {
            Error::permission_denied(format!("process {pid} ({err})"))
        }
    }

    pub fn get_bytes_written(pid: u32) -> Result<u64> {
        let pid_i32 =
            i32::try_from(pid).map_err(|_| Error::invalid_format("pid", pid.to_string()))?;
        pidrusage::<RUsageInfoV2>(pid_i32)
            .map(|usage| usage.ri_diskio_byteswritten)
            .map_err(|e| classify(pid, &e))
    }

    pub fn get_process_name(pid: u32) -> Result<String> {
        let pid_i32 =
            i32::try_from(pid).map_err(|_| Error::invalid_format("pid", pid.to_string()))?;
        name(pid_i32).map_err(|e| classify(pid, &e))
    }
}
