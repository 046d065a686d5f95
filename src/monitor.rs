//! The sampling loop
//!
//! [`Monitor`] ties a [`HostSource`] to the aggregator, history and renderer
//! and drives them on a fixed interval until cancelled.

use std::io::Write;

use bytesize::ByteSize;
use chrono::Local;
use log::{debug, info, warn};

use crate::aggregator::SampleAggregator;
use crate::config::MonitorConfig;
use crate::dns::{DnsResolver, ReverseLookup, SystemLookup};
use crate::history::HistoryBuffer;
use crate::render::{countdown_line, TableRenderer, CLEAR_SCREEN};
use crate::schedule::{CancelToken, TickOutcome, Ticker};
use crate::source::HostSource;
use crate::types::Sample;
use crate::Result;

/// Periodic per-process outbound traffic monitor
#[derive(Debug)]
pub struct Monitor<S, L = SystemLookup> {
    source: S,
    aggregator: SampleAggregator<L>,
    history: HistoryBuffer,
    renderer: TableRenderer,
    ticker: Ticker,
    cancel: CancelToken,
    config: MonitorConfig,
    elevated: bool,
}

impl<S: HostSource> Monitor<S> {
    /// Create a monitor using the system resolver
    ///
    /// # Errors
    /// Returns [`crate::Error::ConfigError`] if `config` is invalid
    pub fn new(source: S, config: MonitorConfig) -> Result<Self> {
        let resolver = DnsResolver::with_timeout(config.dns_timeout);
        Self::with_resolver(source, resolver, config)
    }
}

impl<S: HostSource, L: ReverseLookup> Monitor<S, L> {
    /// Create a monitor resolving names through `resolver`
    ///
    /// # Errors
    /// Returns [`crate::Error::ConfigError`] if `config` is invalid
    pub fn with_resolver(source: S, resolver: DnsResolver<L>, config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            aggregator: SampleAggregator::with_resolver(resolver),
            history: HistoryBuffer::new(config.history_capacity),
            renderer: TableRenderer::new(),
            ticker: Ticker::new(config.interval),
            cancel: CancelToken::new(),
            config,
            elevated: crate::is_elevated(),
        })
    }

    /// Override the detected privilege level
    #[must_use]
    pub fn with_elevation(mut self, elevated: bool) -> Self {
        self.elevated = elevated;
        self
    }

    /// Stop when `cancel` fires instead of the monitor's own token
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that stops [`run`](Self::run) when cancelled
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub const fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Take one sample and append it to the history.
    ///
    /// A tick interrupted by cancellation is discarded and reported as
    /// [`TickOutcome::Cancelled`]. If the connection tables cannot be read
    /// the tick still records an empty sample.
    pub fn tick(&mut self) -> TickOutcome {
        let sample = match self.aggregator.collect_until(&self.source, &self.cancel) {
            Ok(Some(sample)) => sample,
            Ok(None) => return TickOutcome::Cancelled,
            Err(e) => {
                warn!("cannot enumerate connections: {e}");
                Sample::new(Local::now(), Vec::new())
            }
        };

        info!(
            "tick: {} rows, {} written",
            sample.rows.len(),
            ByteSize::b(sample.total_bytes())
        );
        self.history.push(sample);

        let evicted = self.aggregator.evict_stale(self.config.stale_after_ticks);
        if evicted > 0 {
            debug!("evicted {evicted} idle connection baselines");
        }
        TickOutcome::Tick
    }

    /// Sample, redraw and wait until cancelled.
    ///
    /// # Errors
    /// Returns an error if writing to `out` fails
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<()> {
        writeln!(out, "Network Monitor - Starting...")?;
        writeln!(out, "Note: run with root privileges to see every process")?;
        if !self.elevated {
            info!("not running as root; connections of other users will be missing");
            writeln!(
                out,
                "Warning: not running as root, some connections may not be visible"
            )?;
        }
        out.flush()?;

        // keep the notices readable before the first clear
        if Ticker::new(self.config.startup_pause).wait(&self.cancel, |_| {})
            == TickOutcome::Cancelled
        {
            return self.stop(out);
        }

        loop {
            if self.tick() == TickOutcome::Cancelled {
                break;
            }

            if self.config.clear_screen {
                write!(out, "{CLEAR_SCREEN}")?;
            }
            write!(out, "{}", self.renderer.render(&self.history))?;
            out.flush()?;

            let mut write_error = None;
            let outcome = self.ticker.wait(&self.cancel, |secs| {
                if write_error.is_none() {
                    if let Err(e) = write!(out, "{}", countdown_line(secs)).and_then(|()| out.flush()) {
                        write_error = Some(e);
                    }
                }
            });
            if let Some(e) = write_error {
                return Err(e.into());
            }
            if outcome == TickOutcome::Cancelled {
                break;
            }
        }

        self.stop(out)
    }

    fn stop<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "\n\nMonitoring stopped.")?;
        out.flush()?;
        info!("monitoring stopped after {} samples", self.history.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::resolver::MockReverseLookup;
    use crate::source::{ConnectionSource, IoAccountant, ProcessNamer};
    use crate::types::RawConnection;
    use crate::Error;
    use std::cell::Cell;
    use std::thread;
    use std::time::{Duration, Instant};

    /// One process writing `step` more bytes every time it is asked
    struct GrowingHost {
        written: Cell<u64>,
        step: u64,
        broken: bool,
    }

    impl GrowingHost {
        fn new(step: u64) -> Self {
            Self {
                written: Cell::new(0),
                step,
                broken: false,
            }
        }
    }

    impl ConnectionSource for GrowingHost {
        fn connections(&self) -> Result<Vec<RawConnection>> {
            if self.broken {
                return Err(Error::permission_denied("/proc/net/tcp"));
            }
            Ok(vec![RawConnection::new(
                Some(42),
                "10.0.0.2:50000".parse().ok(),
                "192.0.2.7:443".parse().ok(),
                libc::SOCK_STREAM,
            )])
        }
    }

    impl IoAccountant for GrowingHost {
        fn bytes_written(&self, _pid: u32) -> Result<u64> {
            let next = self.written.get() + self.step;
            self.written.set(next);
            Ok(next)
        }
    }

    impl ProcessNamer for GrowingHost {
        fn process_name(&self, _pid: u32) -> Result<String> {
            Ok("uploader".to_string())
        }
    }

    fn offline() -> DnsResolver<MockReverseLookup> {
        let mut lookup = MockReverseLookup::new();
        lookup
            .expect_reverse_lookup()
            .returning(|ip| Err(Error::lookup(ip, "offline")));
        DnsResolver::with_lookup(lookup)
    }

    fn quiet_config() -> MonitorConfig {
        MonitorConfig::new()
            .interval(Duration::from_secs(30))
            .history_capacity(2)
            .clear_screen(false)
            .startup_pause(Duration::ZERO)
    }

    const ROOT_WARNING: &str = "Warning: not running as root";

    /// Records when each write happened
    #[derive(Default)]
    struct TimedWriter {
        chunks: Vec<(Instant, String)>,
    }

    impl TimedWriter {
        fn first_containing(&self, needle: &str) -> Option<Instant> {
            self.chunks
                .iter()
                .find(|(_, text)| text.contains(needle))
                .map(|(at, _)| *at)
        }
    }

    impl Write for TimedWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.chunks
                .push((Instant::now(), String::from_utf8_lossy(buf).into_owned()));
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn cancel_after(token: CancelToken, millis: u64) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(millis));
            token.cancel();
        })
    }

    #[test]
    fn rejects_invalid_config() {
        let config = MonitorConfig::new().history_capacity(0);
        assert!(Monitor::with_resolver(GrowingHost::new(1), offline(), config).is_err());
    }

    #[test]
    fn ticks_fill_history_up_to_capacity() {
        let mut monitor =
            Monitor::with_resolver(GrowingHost::new(100), offline(), quiet_config()).unwrap();

        for _ in 0..3 {
            assert_eq!(monitor.tick(), TickOutcome::Tick);
        }

        let history = monitor.history();
        assert_eq!(history.len(), 2);
        let latest = history.latest().unwrap();
        assert_eq!(latest.rows.len(), 1);
        assert_eq!(latest.rows[0].bytes, 100);
        assert_eq!(latest.rows[0].key.remote, "192.0.2.7:443");
    }

    #[test]
    fn unreadable_connection_tables_record_an_empty_sample() {
        let mut host = GrowingHost::new(1);
        host.broken = true;
        let mut monitor = Monitor::with_resolver(host, offline(), quiet_config()).unwrap();

        assert_eq!(monitor.tick(), TickOutcome::Tick);
        assert!(monitor.history().latest().unwrap().is_empty());
    }

    #[test]
    fn cancelled_before_first_tick_prints_only_banner_and_stop() {
        let mut monitor =
            Monitor::with_resolver(GrowingHost::new(1), offline(), quiet_config()).unwrap();
        monitor.cancel_token().cancel();

        let mut out = Vec::new();
        monitor.run(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Network Monitor - Starting..."));
        assert!(text.ends_with("Monitoring stopped.\n"));
        assert!(!text.contains("[Update #1"));
        assert!(monitor.history().is_empty());
    }

    #[test]
    fn cancellation_during_the_wait_ends_the_loop() {
        let token = CancelToken::new();
        let mut monitor = Monitor::with_resolver(GrowingHost::new(10), offline(), quiet_config())
            .unwrap()
            .with_cancel_token(token.clone());

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            token.cancel();
        });

        let mut out = Vec::new();
        monitor.run(&mut out).unwrap();
        stopper.join().unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("[Update #1 - "));
        assert!(text.contains("uploader"));
        assert!(text.contains("Next update in 30 seconds..."));
        assert!(text.ends_with("Monitoring stopped.\n"));
        assert_eq!(monitor.history().len(), 1);
    }

    #[test]
    fn unprivileged_run_warns_once_and_keeps_sampling() {
        let token = CancelToken::new();
        let mut monitor = Monitor::with_resolver(GrowingHost::new(10), offline(), quiet_config())
            .unwrap()
            .with_elevation(false)
            .with_cancel_token(token.clone());

        let stopper = cancel_after(token, 300);
        let mut out = Vec::new();
        monitor.run(&mut out).unwrap();
        stopper.join().unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text.matches(ROOT_WARNING).count(), 1);
        assert!(text.contains("[Update #1 - "));
        assert_eq!(monitor.history().len(), 1);
    }

    #[test]
    fn privileged_run_skips_the_root_warning() {
        let mut monitor =
            Monitor::with_resolver(GrowingHost::new(1), offline(), quiet_config())
                .unwrap()
                .with_elevation(true);
        monitor.cancel_token().cancel();

        let mut out = Vec::new();
        monitor.run(&mut out).unwrap();
        assert!(!String::from_utf8(out).unwrap().contains(ROOT_WARNING));
    }

    #[test]
    fn startup_notices_stay_up_for_the_pause() {
        let pause = Duration::from_millis(400);
        let config = quiet_config().clear_screen(true).startup_pause(pause);
        let token = CancelToken::new();
        let mut monitor = Monitor::with_resolver(GrowingHost::new(1), offline(), config)
            .unwrap()
            .with_elevation(false)
            .with_cancel_token(token.clone());

        let stopper = cancel_after(token, 800);
        let mut out = TimedWriter::default();
        monitor.run(&mut out).unwrap();
        stopper.join().unwrap();

        let warned = out.first_containing(ROOT_WARNING).unwrap();
        let cleared = out.first_containing(CLEAR_SCREEN).unwrap();
        assert!(cleared.duration_since(warned) >= pause);
        assert_eq!(monitor.history().len(), 1);
    }

    #[test]
    fn cancellation_during_the_startup_pause_skips_every_tick() {
        let config = quiet_config().startup_pause(Duration::from_secs(30));
        let token = CancelToken::new();
        let mut monitor = Monitor::with_resolver(GrowingHost::new(1), offline(), config)
            .unwrap()
            .with_cancel_token(token.clone());

        let started = Instant::now();
        let stopper = cancel_after(token, 150);
        let mut out = Vec::new();
        monitor.run(&mut out).unwrap();
        stopper.join().unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(text.ends_with("Monitoring stopped.\n"));
        assert!(!text.contains("[Update #1"));
        assert!(monitor.history().is_empty());
    }
}
