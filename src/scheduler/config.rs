//! Serial scheduler timing configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default delay before a failed task is attempted again.
pub const DEFAULT_FAILURE_RETRY_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default upper bound for a single sleep of the scheduling loop.
pub const DEFAULT_IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest wait the loops will perform, avoids spinning on zero intervals.
pub(crate) const MIN_WAIT: Duration = Duration::from_millis(1);

/// Timings used by [`SerialScheduler`](super::SerialScheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    failure_retry_interval: Duration,
    idle_check_interval: Duration,
}

impl SchedulerConfig {
    /// Sets the delay applied instead of the repeat interval after a task or
    /// its factory failed.
    ///
    /// # Errors
    /// [`Error::InvalidInterval`] below one millisecond, which would retry a
    /// failing task in a tight loop.
    pub fn with_failure_retry_interval(mut self, interval: Duration) -> Result<Self> {
        if interval < MIN_WAIT {
            return Err(Error::InvalidInterval(format!(
                "failure retry interval must be at least {:?}, got {:?}",
                MIN_WAIT, interval
            )));
        }
        self.failure_retry_interval = interval;
        Ok(self)
    }

    /// Sets the longest time the loop sleeps before re-evaluating the
    /// schedule. Values below one millisecond are raised to it.
    pub fn with_idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval.max(MIN_WAIT);
        self
    }

    pub fn failure_retry_interval(&self) -> Duration {
        self.failure_retry_interval
    }

    pub fn idle_check_interval(&self) -> Duration {
        self.idle_check_interval
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            failure_retry_interval: DEFAULT_FAILURE_RETRY_INTERVAL,
            idle_check_interval: DEFAULT_IDLE_CHECK_INTERVAL,
        }
    }
}
