#![allow(clippy::uninlined_format_args)]

use std::net::SocketAddr;

use chrono::{DateTime, Local};

#[cfg(feature = "serde-support")]
use serde::Serialize;

/// Placeholder shown when a connection has no local address.
pub const NO_LOCAL_SOCKET: &str = "N/A";

/// Placeholder shown when the owning process cannot be named.
pub const UNKNOWN_APPLICATION: &str = "Unknown";

/// A connection as reported by the operating system, before any attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConnection {
    /// Owning process, if the OS could attribute one
    pub pid: Option<u32>,
    /// Local endpoint
    pub local: Option<SocketAddr>,
    /// Remote endpoint (None for listening or unconnected sockets)
    pub remote: Option<SocketAddr>,
    /// Raw socket type code (`SOCK_STREAM`, `SOCK_DGRAM`, ...)
    pub socket_type: i32,
}

impl RawConnection {
    /// Create a connection record with the given endpoints
    #[must_use]
    pub const fn new(
        pid: Option<u32>,
        local: Option<SocketAddr>,
        remote: Option<SocketAddr>,
        socket_type: i32,
    ) -> Self {
        Self {
            pid,
            local,
            remote,
            socket_type,
        }
    }

    /// The remote endpoint, treating the unspecified address with port 0 as
    /// "not connected".
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.remote
            .filter(|addr| !(addr.ip().is_unspecified() && addr.port() == 0))
    }

    /// `ip:port` of the local endpoint, or `N/A`
    #[must_use]
    pub fn local_socket(&self) -> String {
        self.local.map_or_else(
            || NO_LOCAL_SOCKET.to_string(),
            |addr| format!("{}:{}", addr.ip(), addr.port()),
        )
    }
}

/// Key used to carry a process's cumulative write counter across ticks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    pub pid: u32,
    pub remote: String,
    pub local: String,
}

impl ConnectionIdentity {
    #[must_use]
    pub fn new(pid: u32, remote: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            pid,
            remote: remote.into(),
            local: local.into(),
        }
    }
}

/// Grouping key for one displayed row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize))]
pub struct DisplayKey {
    pub application: String,
    pub remote: String,
    pub local: String,
    pub protocol: String,
}

/// One row of a sample: a display key and the bytes attributed to it this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize))]
pub struct ConnectionSample {
    pub key: DisplayKey,
    pub bytes: u64,
}

/// The result of one tick, rows ordered by descending byte count.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize))]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub rows: Vec<ConnectionSample>,
}

impl Sample {
    #[must_use]
    pub const fn new(timestamp: DateTime<Local>, rows: Vec<ConnectionSample>) -> Self {
        Self { timestamp, rows }
    }

    /// Whether any connection produced traffic during this tick
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total bytes across all rows
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.rows.iter().map(|row| row.bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    fn addr(ip: [u8; 4], port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), port)
    }

    #[test]
    fn unspecified_remote_is_not_a_peer() {
        let listening = RawConnection::new(
            Some(1),
            Some(addr([0, 0, 0, 0], 22)),
            Some(addr([0, 0, 0, 0], 0)),
            libc::SOCK_STREAM,
        );
        assert_eq!(listening.peer(), None);

        let v6 = RawConnection::new(
            Some(1),
            None,
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)),
            libc::SOCK_STREAM,
        );
        assert_eq!(v6.peer(), None);

        let connected = RawConnection::new(
            Some(1),
            Some(addr([10, 0, 0, 2], 50000)),
            Some(addr([1, 2, 3, 4], 443)),
            libc::SOCK_STREAM,
        );
        assert_eq!(connected.peer(), Some(addr([1, 2, 3, 4], 443)));
    }

    #[test]
    fn local_socket_falls_back_to_placeholder() {
        let conn = RawConnection::new(Some(1), None, Some(addr([1, 2, 3, 4], 53)), libc::SOCK_DGRAM);
        assert_eq!(conn.local_socket(), "N/A");

        let conn = RawConnection::new(
            Some(1),
            Some(addr([127, 0, 0, 1], 8080)),
            None,
            libc::SOCK_STREAM,
        );
        assert_eq!(conn.local_socket(), "127.0.0.1:8080");
    }
}
