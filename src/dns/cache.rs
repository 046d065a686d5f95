use std::collections::HashMap;
use std::net::IpAddr;

/// Outcome of a past reverse lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// The address resolved to this display name
    Resolved(String),
    /// The lookup failed; the raw address is shown instead
    Unresolved,
}

/// Reverse lookup results keyed by address.
///
/// Entries never expire. Once an address has been looked up, successfully or
/// not, it is never looked up again for the lifetime of the cache.
#[derive(Debug, Default)]
pub struct DnsCache {
    records: HashMap<IpAddr, CacheEntry>,
}

impl DnsCache {
    /// Create a new DNS cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached entry
    #[must_use]
    pub fn get(&self, ip: &IpAddr) -> Option<&CacheEntry> {
        self.records.get(ip)
    }

    /// Record a successful lookup
    pub fn add_resolved(&mut self, ip: IpAddr, name: String) {
        self.records.insert(ip, CacheEntry::Resolved(name));
    }

    /// Record a failed lookup
    pub fn add_unresolved(&mut self, ip: IpAddr) {
        self.records.insert(ip, CacheEntry::Unresolved);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of addresses cached as unresolvable
    #[must_use]
    pub fn unresolved_count(&self) -> usize {
        self.records
            .values()
            .filter(|entry| **entry == CacheEntry::Unresolved)
            .count()
    }

    /// Clear all records from the cache
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
