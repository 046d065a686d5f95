use std::net::IpAddr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::debug;

use super::cache::{CacheEntry, DnsCache};
use crate::{Error, Result};

/// Default bound on a single reverse lookup
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(500);

const WWW_PREFIX: &str = "www.";

/// Performs a single reverse (PTR) lookup.
#[cfg_attr(test, mockall::automock)]
pub trait ReverseLookup {
    /// Resolve `ip` to a host name
    ///
    /// # Errors
    /// Returns an error if the address has no name or the lookup timed out
    fn reverse_lookup(&self, ip: IpAddr) -> Result<String>;
}

/// Reverse lookup through the system resolver (`getnameinfo`), bounded by a
/// timeout.
///
/// The blocking call runs on a helper thread. When the timeout fires the
/// thread is left to finish on its own and its result is discarded.
#[derive(Debug, Clone)]
pub struct SystemLookup {
    timeout: Duration,
}

impl SystemLookup {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for SystemLookup {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_TIMEOUT)
    }
}

impl ReverseLookup for SystemLookup {
    fn reverse_lookup(&self, ip: IpAddr) -> Result<String> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("reverse-dns".to_string())
            .spawn(move || {
                let _ = tx.send(dns_lookup::lookup_addr(&ip));
            })?;

        match rx.recv_timeout(self.timeout) {
            // getnameinfo hands back the numeric form when no PTR record exists
            Ok(Ok(name)) if name == ip.to_string() => Err(Error::lookup(ip, "no PTR record")),
            Ok(Ok(name)) => Ok(name),
            Ok(Err(e)) => Err(Error::lookup(ip, e.to_string())),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(Error::lookup(ip, format!("timed out after {:?}", self.timeout)))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(Error::lookup(ip, "lookup thread exited"))
            }
        }
    }
}

/// Memoizing reverse resolver producing display names for remote hosts.
#[derive(Debug)]
pub struct DnsResolver<L = SystemLookup> {
    lookup: L,
    cache: DnsCache,
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsResolver {
    /// Create a resolver backed by the system resolver
    #[must_use]
    pub fn new() -> Self {
        Self::with_lookup(SystemLookup::default())
    }

    /// Create a resolver backed by the system resolver with a custom timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_lookup(SystemLookup::new(timeout))
    }
}

impl<L: ReverseLookup> DnsResolver<L> {
    /// Create a resolver on top of an arbitrary lookup backend
    pub fn with_lookup(lookup: L) -> Self {
        Self {
            lookup,
            cache: DnsCache::new(),
        }
    }

    /// Display name for `ip`: the cached or freshly resolved host name with a
    /// leading `www.` removed, or the address itself when it cannot be
    /// resolved. Each address is looked up at most once.
    pub fn resolve(&mut self, ip: IpAddr) -> String {
        match self.cache.get(&ip) {
            Some(CacheEntry::Resolved(name)) => return name.clone(),
            Some(CacheEntry::Unresolved) => return ip.to_string(),
            None => {}
        }

        match self.lookup.reverse_lookup(ip) {
            Ok(name) => {
                let name = strip_www(&name).to_string();
                debug!("resolved {ip} to {name}");
                self.cache.add_resolved(ip, name.clone());
                name
            }
            Err(e) => {
                debug!("caching negative entry: {e}");
                self.cache.add_unresolved(ip);
                ip.to_string()
            }
        }
    }

    /// The underlying cache
    #[must_use]
    pub const fn cache(&self) -> &DnsCache {
        &self.cache
    }
}

fn strip_www(name: &str) -> &str {
    name.strip_prefix(WWW_PREFIX).unwrap_or(name)
}
