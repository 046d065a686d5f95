use std::io;
use std::net::IpAddr;

/// The error type for connection sampling and monitoring operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O error occurred while reading a system resource
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The process exited between enumeration and the follow-up query
    #[error("Process {pid} no longer exists")]
    ProcessGone { pid: u32 },

    /// Permission denied accessing system resource
    #[error("Permission denied accessing {resource}. Try running with elevated privileges.")]
    PermissionDenied { resource: String },

    /// Feature not supported on this platform
    #[error("Feature '{feature}' not supported on {platform}")]
    UnsupportedPlatform { feature: String, platform: String },

    /// Invalid data format encountered
    #[error("Invalid data format in {0}: {1}")]
    InvalidFormat(String, String),

    /// Reverse name lookup failed or timed out
    #[error("Reverse lookup for {ip} failed: {reason}")]
    Lookup { ip: IpAddr, reason: String },

    /// Signal handler registration failed
    #[error("Failed to set up signal handling: {0}")]
    Signal(String),

    /// Monitor configuration is invalid
    #[error("Configuration error: {details}")]
    ConfigError { details: String },
}

impl Error {
    /// Create a new process gone error
    pub const fn process_gone(pid: u32) -> Self {
        Self::ProcessGone { pid }
    }

    /// Create a new permission denied error
    pub fn permission_denied(resource: impl Into<String>) -> Self {
        Self::PermissionDenied {
            resource: resource.into(),
        }
    }

    /// Create a new unsupported platform error
    pub fn unsupported_platform(feature: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            feature: feature.into(),
            platform: std::env::consts::OS.to_string(),
        }
    }

    /// Create a new invalid format error
    pub fn invalid_format(source: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidFormat(source.into(), details.into())
    }

    /// Create a new lookup error
    pub fn lookup(ip: IpAddr, reason: impl Into<String>) -> Self {
        Self::Lookup {
            ip,
            reason: reason.into(),
        }
    }

    /// Create a new configuration error
    pub fn config_error(details: impl Into<String>) -> Self {
        Self::ConfigError {
            details: details.into(),
        }
    }

    /// Classify an I/O failure that happened while reading `/proc/<pid>/...`
    /// or an equivalent per-process resource.
    pub fn from_io_for_pid(pid: u32, err: io::Error) -> Self {
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Self::process_gone(pid);
        }
        match err.kind() {
            io::ErrorKind::NotFound => Self::process_gone(pid),
            io::ErrorKind::PermissionDenied => Self::permission_denied(format!("process {pid}")),
            _ => Self::Io(err),
        }
    }

    /// Whether this error means "skip the connection for this tick" rather
    /// than a failure worth surfacing.
    #[must_use]
    pub const fn is_skippable(&self) -> bool {
        matches!(self, Self::ProcessGone { .. } | Self::PermissionDenied { .. })
    }
}

/// A specialized `Result` type for monitoring operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified_per_process() {
        let gone = Error::from_io_for_pid(42, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(gone, Error::ProcessGone { pid: 42 }));
        assert!(gone.is_skippable());

        let denied = Error::from_io_for_pid(42, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, Error::PermissionDenied { .. }));
        assert!(denied.is_skippable());

        let other = Error::from_io_for_pid(42, io::Error::from(io::ErrorKind::InvalidData));
        assert!(matches!(other, Error::Io(_)));
        assert!(!other.is_skippable());
    }

    #[test]
    fn messages_name_the_resource() {
        let err = Error::permission_denied("/proc/1/io");
        assert_eq!(
            err.to_string(),
            "Permission denied accessing /proc/1/io. Try running with elevated privileges."
        );
        assert_eq!(
            Error::process_gone(7).to_string(),
            "Process 7 no longer exists"
        );
    }
}
