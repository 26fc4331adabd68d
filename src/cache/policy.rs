//! Eviction Policy Module
//!
//! Retention rules applied during a maintenance pass.

use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

// == Eviction Policy ==
/// Combined retention rule for cache entries.
///
/// The default policy is unbounded: no minimum, no maximum and no usage
/// expiration, so nothing is ever evicted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionPolicy {
    /// Number of most recently used entries that are always kept
    pub min_entries: usize,
    /// Maximum number of entries to keep, None = unbounded
    pub max_entries: Option<usize>,
    /// Maximum time since last usage before an unprotected entry is evicted
    pub usage_expiration: Option<Duration>,
}

impl EvictionPolicy {
    // == Constructor ==
    /// Creates an unbounded policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the policy with `min_entries` set.
    pub fn with_min_entries(mut self, min_entries: usize) -> Result<Self> {
        self.set_min_entries(min_entries)?;
        Ok(self)
    }

    /// Returns the policy with `max_entries` set.
    pub fn with_max_entries(mut self, max_entries: usize) -> Result<Self> {
        self.set_max_entries(Some(max_entries))?;
        Ok(self)
    }

    /// Returns the policy with `usage_expiration` set.
    pub fn with_usage_expiration(mut self, usage_expiration: Duration) -> Result<Self> {
        self.set_usage_expiration(Some(usage_expiration))?;
        Ok(self)
    }

    // == Setters ==
    /// Sets the number of protected most-recent entries.
    ///
    /// Rejected if it would exceed the configured maximum.
    pub fn set_min_entries(&mut self, min_entries: usize) -> Result<()> {
        if let Some(max) = self.max_entries {
            if min_entries > max {
                return Err(Error::InvalidPolicy(format!(
                    "min_entries {} exceeds max_entries {}",
                    min_entries, max
                )));
            }
        }

        self.min_entries = min_entries;
        Ok(())
    }

    /// Sets or clears the maximum number of entries.
    ///
    /// Rejected if it would fall below the configured minimum.
    pub fn set_max_entries(&mut self, max_entries: Option<usize>) -> Result<()> {
        if let Some(max) = max_entries {
            if max < self.min_entries {
                return Err(Error::InvalidPolicy(format!(
                    "max_entries {} is below min_entries {}",
                    max, self.min_entries
                )));
            }
        }

        self.max_entries = max_entries;
        Ok(())
    }

    /// Sets or clears the usage expiration.
    ///
    /// Zero durations and durations too large to compare against timestamps
    /// are rejected.
    pub fn set_usage_expiration(&mut self, usage_expiration: Option<Duration>) -> Result<()> {
        if let Some(expiration) = usage_expiration {
            if expiration.is_zero() {
                return Err(Error::InvalidPolicy(
                    "usage_expiration must be positive".to_string(),
                ));
            }
            if chrono::Duration::from_std(expiration).is_err() {
                return Err(Error::InvalidPolicy(format!(
                    "usage_expiration {:?} is out of range",
                    expiration
                )));
            }
        }

        self.usage_expiration = usage_expiration;
        Ok(())
    }

    // == Decision ==
    /// Decides the fate of the entry at `index` of the age-sorted sequence.
    pub(crate) fn verdict(&self, index: usize, age: Duration) -> Verdict {
        if index < self.min_entries {
            return Verdict::Keep;
        }

        if self.max_entries.is_some_and(|max| index >= max) {
            return Verdict::EvictCapacity;
        }

        match self.usage_expiration {
            Some(expiration) if age > expiration => Verdict::EvictExpired,
            _ => Verdict::Keep,
        }
    }
}

/// Outcome for a single entry during maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Keep,
    EvictCapacity,
    EvictExpired,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded() {
        let policy = EvictionPolicy::new();

        assert_eq!(policy.min_entries, 0);
        assert!(policy.max_entries.is_none());
        assert!(policy.usage_expiration.is_none());
        assert_eq!(policy.verdict(1_000_000, Duration::MAX), Verdict::Keep);
    }

    #[test]
    fn test_min_entries_protects_expired() {
        let policy = EvictionPolicy::new()
            .with_usage_expiration(Duration::from_secs(10))
            .unwrap()
            .with_min_entries(2)
            .unwrap();

        assert_eq!(policy.verdict(0, Duration::from_secs(60)), Verdict::Keep);
        assert_eq!(policy.verdict(1, Duration::from_secs(60)), Verdict::Keep);
        assert_eq!(
            policy.verdict(2, Duration::from_secs(60)),
            Verdict::EvictExpired
        );
    }

    #[test]
    fn test_capacity_beats_freshness() {
        let policy = EvictionPolicy::new()
            .with_max_entries(1)
            .unwrap()
            .with_usage_expiration(Duration::from_secs(10))
            .unwrap();

        assert_eq!(policy.verdict(0, Duration::ZERO), Verdict::Keep);
        assert_eq!(policy.verdict(1, Duration::ZERO), Verdict::EvictCapacity);
    }

    #[test]
    fn test_expiration_is_inclusive() {
        let policy = EvictionPolicy::new()
            .with_usage_expiration(Duration::from_secs(10))
            .unwrap();

        assert_eq!(policy.verdict(0, Duration::from_secs(10)), Verdict::Keep);
        assert_eq!(
            policy.verdict(0, Duration::from_millis(10_001)),
            Verdict::EvictExpired
        );
    }

    #[test]
    fn test_rejects_max_below_min() {
        let policy = EvictionPolicy::new().with_min_entries(5).unwrap();
        assert!(matches!(
            policy.with_max_entries(4),
            Err(Error::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_rejects_min_above_max() {
        let policy = EvictionPolicy::new().with_max_entries(3).unwrap();
        assert!(matches!(
            policy.with_min_entries(4),
            Err(Error::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_rejects_zero_expiration() {
        assert!(matches!(
            EvictionPolicy::new().with_usage_expiration(Duration::ZERO),
            Err(Error::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_expiration() {
        assert!(matches!(
            EvictionPolicy::new().with_usage_expiration(Duration::MAX),
            Err(Error::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_max_zero_with_min_zero_is_allowed() {
        let policy = EvictionPolicy::new().with_max_entries(0).unwrap();
        assert_eq!(policy.verdict(0, Duration::ZERO), Verdict::EvictCapacity);
    }
}
