//! Reverse name resolution for remote endpoints
//!
//! Lookups are memoized for the lifetime of the resolver, including failures,
//! so a hot polling loop never blocks twice on the same address.

pub mod cache;
pub mod resolver;

// Re-export main types
pub use cache::{CacheEntry, DnsCache};
pub use resolver::{DnsResolver, ReverseLookup, SystemLookup, DEFAULT_LOOKUP_TIMEOUT};
