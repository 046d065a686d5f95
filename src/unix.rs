use nix::unistd::geteuid;

/// Whether the process runs with root privileges and can therefore see every
/// process's sockets and I/O counters.
#[must_use]
pub fn is_elevated() -> bool {
    geteuid().is_root()
}
