//! One tick of connection sampling
//!
//! [`SampleAggregator`] walks the host's connections once, attributes each
//! process's new writes to its remote endpoint and folds the results into a
//! [`Sample`]. Per-connection failures are reported as [`Step::Skipped`] and
//! never abort the tick.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Local;
use log::debug;

use crate::dns::{DnsResolver, ReverseLookup, SystemLookup};
use crate::format::protocol_label;
use crate::schedule::CancelToken;
use crate::source::HostSource;
use crate::tracker::DeltaTracker;
use crate::types::{
    ConnectionIdentity, ConnectionSample, DisplayKey, RawConnection, Sample, UNKNOWN_APPLICATION,
};
use crate::{Error, Result};

/// Why a connection contributed nothing this tick
#[derive(Debug)]
pub enum SkipReason {
    /// No remote endpoint, e.g. a listening socket
    NoRemote,
    /// The OS did not attribute the socket to a process
    NoProcess,
    /// The owning process's write counter could not be read
    Accounting(Error),
}

/// Outcome of evaluating a single connection
#[derive(Debug)]
pub enum Step {
    /// New bytes were written since the last observation
    Counted { key: DisplayKey, bytes: u64 },
    /// Counter unchanged or reset; nothing to show
    Idle,
    /// Connection excluded from this tick
    Skipped(SkipReason),
}

/// Per-tick sample builder owning the delta and DNS state.
#[derive(Debug)]
pub struct SampleAggregator<L = SystemLookup> {
    tracker: DeltaTracker,
    resolver: DnsResolver<L>,
}

impl Default for SampleAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleAggregator {
    /// Create an aggregator resolving names through the system resolver
    #[must_use]
    pub fn new() -> Self {
        Self::with_resolver(DnsResolver::new())
    }

    /// Create an aggregator with a custom reverse lookup timeout
    #[must_use]
    pub fn with_dns_timeout(timeout: Duration) -> Self {
        Self::with_resolver(DnsResolver::with_timeout(timeout))
    }
}

impl<L: ReverseLookup> SampleAggregator<L> {
    pub fn with_resolver(resolver: DnsResolver<L>) -> Self {
        Self {
            tracker: DeltaTracker::new(),
            resolver,
        }
    }

    /// Produce one sample from the current state of `source`
    ///
    /// # Errors
    /// Returns an error only if the connection list itself is unavailable
    pub fn collect<S>(&mut self, source: &S) -> Result<Sample>
    where
        S: HostSource + ?Sized,
    {
        let sample = self.collect_inner(source, || false)?;
        Ok(sample.unwrap_or_else(|| Sample::new(Local::now(), Vec::new())))
    }

    /// Like [`collect`](Self::collect), but checks `cancel` between
    /// connections. Returns `Ok(None)` if the tick was abandoned.
    ///
    /// # Errors
    /// Returns an error only if the connection list itself is unavailable
    pub fn collect_until<S>(&mut self, source: &S, cancel: &CancelToken) -> Result<Option<Sample>>
    where
        S: HostSource + ?Sized,
    {
        self.collect_inner(source, || cancel.is_cancelled())
    }

    fn collect_inner<S, F>(&mut self, source: &S, is_cancelled: F) -> Result<Option<Sample>>
    where
        S: HostSource + ?Sized,
        F: Fn() -> bool,
    {
        let connections = source.connections()?;
        let mut totals = Accumulator::default();
        let mut skipped = 0usize;

        for conn in &connections {
            if is_cancelled() {
                debug!("tick abandoned after cancellation");
                return Ok(None);
            }

            match self.observe_connection(source, conn) {
                Step::Counted { key, bytes } => totals.add(key, bytes),
                Step::Idle => {}
                Step::Skipped(SkipReason::Accounting(e)) => {
                    skipped += 1;
                    debug!("skipping connection: {e}");
                }
                Step::Skipped(_) => {}
            }
        }

        self.tracker.end_tick();
        debug!(
            "sampled {} connections, {} unreadable",
            connections.len(),
            skipped
        );

        Ok(Some(Sample::new(Local::now(), totals.into_rows())))
    }

    /// Evaluate one connection against the delta state
    pub fn observe_connection<S>(&mut self, source: &S, conn: &RawConnection) -> Step
    where
        S: HostSource + ?Sized,
    {
        let Some(peer) = conn.peer() else {
            return Step::Skipped(SkipReason::NoRemote);
        };
        let Some(pid) = conn.pid else {
            return Step::Skipped(SkipReason::NoProcess);
        };

        let remote = format!("{}:{}", self.resolver.resolve(peer.ip()), peer.port());
        let local = conn.local_socket();
        let protocol = protocol_label(conn.socket_type);
        let application = source.process_name(pid).unwrap_or_else(|e| {
            debug!("cannot name process {pid}: {e}");
            UNKNOWN_APPLICATION.to_string()
        });

        let written = match source.bytes_written(pid) {
            Ok(written) => written,
            Err(e) => return Step::Skipped(SkipReason::Accounting(e)),
        };

        let identity = ConnectionIdentity::new(pid, remote.clone(), local.clone());
        let delta = self.tracker.observe(&identity, written);

        match u64::try_from(delta) {
            Ok(bytes) if bytes > 0 => Step::Counted {
                key: DisplayKey {
                    application,
                    remote,
                    local,
                    protocol,
                },
                bytes,
            },
            _ => Step::Idle,
        }
    }

    /// Drop delta state for identities unseen for `max_idle` ticks
    pub fn evict_stale(&mut self, max_idle: u64) -> usize {
        self.tracker.evict_stale(max_idle)
    }

    #[must_use]
    pub const fn tracker(&self) -> &DeltaTracker {
        &self.tracker
    }

    #[must_use]
    pub const fn resolver(&self) -> &DnsResolver<L> {
        &self.resolver
    }
}

/// Sums bytes per display key, remembering first-insertion order.
#[derive(Debug, Default)]
struct Accumulator {
    index: HashMap<DisplayKey, usize>,
    rows: Vec<ConnectionSample>,
}

impl Accumulator {
    fn add(&mut self, key: DisplayKey, bytes: u64) {
        if let Some(&i) = self.index.get(&key) {
            self.rows[i].bytes = self.rows[i].bytes.saturating_add(bytes);
        } else {
            self.index.insert(key.clone(), self.rows.len());
            self.rows.push(ConnectionSample { key, bytes });
        }
    }

    /// Rows by descending bytes; the sort is stable so ties keep insertion order
    fn into_rows(mut self) -> Vec<ConnectionSample> {
        self.rows.sort_by(|a, b| b.bytes.cmp(&a.bytes));
        self.rows
    }
}
