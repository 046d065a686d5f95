//! Tick scheduling and cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::{Error, Result};

/// How often a waiting ticker checks for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared stop flag, set by a signal handler or by [`CancelToken::cancel`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag on SIGINT and SIGTERM instead of terminating the process
    ///
    /// # Errors
    /// Returns an error if a handler cannot be registered
    pub fn install_signal_handlers(&self) -> Result<()> {
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.flag))
                .map_err(|e| Error::Signal(format!("signal {signal}: {e}")))?;
        }
        Ok(())
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Result of waiting for the next tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The interval elapsed
    Tick,
    /// Cancellation was requested while waiting
    Cancelled,
}

/// Fixed-interval ticker with a per-second countdown.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Duration,
    poll: Duration,
}

impl Ticker {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            poll: POLL_INTERVAL,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the interval elapses or `cancel` fires.
    ///
    /// `on_second` receives the whole seconds remaining each time that
    /// number changes, starting with the full interval.
    pub fn wait<F>(&self, cancel: &CancelToken, mut on_second: F) -> TickOutcome
    where
        F: FnMut(u64),
    {
        let deadline = Instant::now() + self.interval;
        let mut announced = None;

        loop {
            if cancel.is_cancelled() {
                return TickOutcome::Cancelled;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return TickOutcome::Tick;
            }

            let secs_left = whole_seconds_ceil(remaining);
            if announced != Some(secs_left) {
                on_second(secs_left);
                announced = Some(secs_left);
            }

            thread::sleep(remaining.min(self.poll));
        }
    }
}

fn whole_seconds_ceil(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
