//! Cache Module
//!
//! Provides an in-memory cache with LRU eviction driven by entry counts and
//! usage expiration.

mod entry;
mod policy;
mod stats;
mod store;


pub(crate) use entry::CacheEntry;
pub use policy::EvictionPolicy;
pub use stats::CacheStats;
pub use store::EvictionCache;
