#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Hogwatch
//!
//! Per-process outbound network traffic monitoring.
//!
//! Every tick the monitor lists the host's TCP and UDP connections, reads the
//! cumulative write counter of each owning process and reports the bytes
//! written since the previous tick, grouped by application, local socket,
//! remote endpoint and protocol. Remote addresses are reverse resolved once
//! and cached, including failures.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hogwatch::{Monitor, MonitorConfig, SystemSource};
//!
//! let mut monitor = Monitor::new(SystemSource, MonitorConfig::default())?;
//! monitor.cancel_token().install_signal_handlers()?;
//! monitor.run(&mut std::io::stdout())?;
//! # Ok::<(), hogwatch::Error>(())
//! ```
//!
//! ## Features
//!
//! - `linux-procfs` - read `/proc` through the `procfs` crate
//! - `serde-support` - `Serialize` for samples and rows

mod error;
mod types;

pub mod aggregator;
pub mod config;
pub mod dns;
pub mod format;
pub mod history;
pub mod monitor;
pub mod render;
pub mod schedule;
pub mod source;
pub mod tracker;

pub use aggregator::{SampleAggregator, SkipReason, Step};
pub use config::MonitorConfig;
pub use dns::{DnsCache, DnsResolver, ReverseLookup, SystemLookup};
pub use error::{Error, Result};
pub use history::HistoryBuffer;
pub use monitor::Monitor;
pub use render::TableRenderer;
pub use schedule::{CancelToken, TickOutcome, Ticker};
pub use source::{ConnectionSource, HostSource, IoAccountant, ProcessNamer, SystemSource};
pub use tracker::DeltaTracker;
pub use types::{
    ConnectionIdentity, ConnectionSample, DisplayKey, RawConnection, Sample, NO_LOCAL_SOCKET,
    UNKNOWN_APPLICATION,
};

/// Privilege checks
#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::*;

/// Elevation cannot be determined here; assume an unprivileged user.
#[cfg(not(unix))]
#[must_use]
pub const fn is_elevated() -> bool {
    false
}
