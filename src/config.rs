use std::time::Duration;

use crate::dns::DEFAULT_LOOKUP_TIMEOUT;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::{Error, Result};

/// Settings for a [`crate::Monitor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Number of samples kept on screen
    pub history_capacity: usize,
    /// Upper bound on a single reverse DNS lookup
    pub dns_timeout: Duration,
    /// Ticks an identity may go unseen before its counter baseline is dropped
    pub stale_after_ticks: u64,
    /// Clear the terminal before each redraw
    pub clear_screen: bool,
    /// How long the startup notices stay on screen before the first redraw
    pub startup_pause: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            dns_timeout: DEFAULT_LOOKUP_TIMEOUT,
            stale_after_ticks: 30,
            clear_screen: true,
            startup_pause: Duration::from_secs(2),
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the polling interval
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set how many samples are retained
    #[must_use]
    pub const fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the reverse lookup timeout
    #[must_use]
    pub const fn dns_timeout(mut self, timeout: Duration) -> Self {
        self.dns_timeout = timeout;
        self
    }

    /// Set the idle tick count after which delta state is evicted
    #[must_use]
    pub const fn stale_after_ticks(mut self, ticks: u64) -> Self {
        self.stale_after_ticks = ticks;
        self
    }

    /// Enable or disable clearing the screen between redraws
    #[must_use]
    pub const fn clear_screen(mut self, clear: bool) -> Self {
        self.clear_screen = clear;
        self
    }

    /// Set the pause between the startup notices and the first tick
    #[must_use]
    pub const fn startup_pause(mut self, pause: Duration) -> Self {
        self.startup_pause = pause;
        self
    }

    /// Check the settings are usable
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for a zero interval, zero history
    /// capacity or zero DNS timeout
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::config_error("interval must be greater than zero"));
        }
        if self.history_capacity == 0 {
            return Err(Error::config_error("history capacity must be at least 1"));
        }
        if self.dns_timeout.is_zero() {
            return Err(Error::config_error("DNS timeout must be greater than zero"));
        }
        Ok(())
    }
}
