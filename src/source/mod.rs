//! Operating system collaborators
//!
//! The aggregation layer only sees these traits. [`SystemSource`] implements
//! all of them against the running host.

pub mod platform;

use crate::types::RawConnection;
use crate::Result;

/// Enumerates active inet connections.
pub trait ConnectionSource {
    /// List all TCP and UDP connections, IPv4 and IPv6, in OS order
    ///
    /// # Errors
    /// Returns an error if the connection tables cannot be read at all
    fn connections(&self) -> Result<Vec<RawConnection>>;
}

/// Reads a process's cumulative write counter.
pub trait IoAccountant {
    /// Total bytes written by `pid` since it started
    ///
    /// # Errors
    /// [`crate::Error::ProcessGone`] when the process exited,
    /// [`crate::Error::PermissionDenied`] when its counters are not readable
    fn bytes_written(&self, pid: u32) -> Result<u64>;
}

/// Maps a process id to a display name.
pub trait ProcessNamer {
    /// Short name of the executable running as `pid`
    ///
    /// # Errors
    /// Returns an error if the process cannot be queried
    fn process_name(&self, pid: u32) -> Result<String>;
}

/// Everything the sampler needs from the host.
pub trait HostSource: ConnectionSource + IoAccountant + ProcessNamer {}

impl<T: ConnectionSource + IoAccountant + ProcessNamer> HostSource for T {}

/// The running host, via `/proc` on Linux and `libproc` on macOS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSource;

impl SystemSource {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ConnectionSource for SystemSource {
    fn connections(&self) -> Result<Vec<RawConnection>> {
        platform::get_connections()
    }
}

impl IoAccountant for SystemSource {
    fn bytes_written(&self, pid: u32) -> Result<u64> {
        platform::get_bytes_written(pid)
    }
}

impl ProcessNamer for SystemSource {
    fn process_name(&self, pid: u32) -> Result<String> {
        platform::get_process_name(pid)
    }
}
