//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with usage tracking.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::elapsed_between;

// == Cache Entry ==
/// A stored value together with its last usage.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Time of the last `get` or `put`
    pub last_used: DateTime<Utc>,
    /// Usage sequence number, breaks ties between equal timestamps
    pub usage_seq: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry used at `now`.
    pub fn new(value: V, now: DateTime<Utc>, usage_seq: u64) -> Self {
        Self {
            value,
            last_used: now,
            usage_seq,
        }
    }

    // == Touch ==
    /// Marks the entry as used at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>, usage_seq: u64) {
        self.last_used = now;
        self.usage_seq = usage_seq;
    }

    // == Age ==
    /// Time since last usage as seen from `now`.
    ///
    /// Clock steps backwards yield an age of zero instead of a negative one.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        elapsed_between(self.last_used, now)
    }
}
