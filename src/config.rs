//! Configuration Module
//!
//! Loads server, cache and scheduler settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::EvictionPolicy;
use crate::error::Result;
use crate::scheduler::SchedulerConfig;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Entries protected from any eviction
    pub min_entries: usize,
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Seconds an unused entry survives, 0 disables expiration
    pub usage_expiration_secs: u64,
    /// Seconds between cache maintenance runs
    pub maintenance_interval_secs: u64,
    /// Seconds before a failed task is retried
    pub failure_retry_secs: u64,
    /// Longest scheduler sleep in milliseconds
    pub idle_check_millis: u64,
    /// Seconds to wait for the scheduler on shutdown
    pub shutdown_timeout_secs: u64,
    /// HTTP server port
    pub server_port: u16,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MIN_ENTRIES` - Protected entries (default: 0)
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `CACHE_USAGE_EXPIRATION_SECS` - Usage expiration, 0 = off (default: 300)
    /// - `MAINTENANCE_INTERVAL_SECS` - Maintenance frequency (default: 1)
    /// - `FAILURE_RETRY_SECS` - Failed task retry delay (default: 300)
    /// - `IDLE_CHECK_MILLIS` - Scheduler idle check (default: 1000)
    /// - `SHUTDOWN_TIMEOUT_SECS` - Scheduler shutdown wait (default: 10)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_entries: env_or("CACHE_MIN_ENTRIES", defaults.min_entries),
            max_entries: env_or("CACHE_MAX_ENTRIES", defaults.max_entries),
            usage_expiration_secs: env_or(
                "CACHE_USAGE_EXPIRATION_SECS",
                defaults.usage_expiration_secs,
            ),
            maintenance_interval_secs: env_or(
                "MAINTENANCE_INTERVAL_SECS",
                defaults.maintenance_interval_secs,
            ),
            failure_retry_secs: env_or("FAILURE_RETRY_SECS", defaults.failure_retry_secs),
            idle_check_millis: env_or("IDLE_CHECK_MILLIS", defaults.idle_check_millis),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout_secs),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    /// Builds the cache eviction policy, rejecting inconsistent bounds.
    pub fn cache_policy(&self) -> Result<EvictionPolicy> {
        let mut policy = EvictionPolicy::new()
            .with_max_entries(self.max_entries)?
            .with_min_entries(self.min_entries)?;
        if self.usage_expiration_secs > 0 {
            policy = policy.with_usage_expiration(Duration::from_secs(self.usage_expiration_secs))?;
        }
        Ok(policy)
    }

    /// Builds the serial scheduler timings, rejecting a zero retry interval.
    pub fn scheduler_config(&self) -> Result<SchedulerConfig> {
        Ok(SchedulerConfig::default()
            .with_failure_retry_interval(Duration::from_secs(self.failure_retry_secs))?
            .with_idle_check_interval(Duration::from_millis(self.idle_check_millis)))
    }

    /// Interval of the cache maintenance task, at least one second.
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_entries: 0,
            max_entries: 1000,
            usage_expiration_secs: 300,
            maintenance_interval_secs: 1,
            failure_retry_secs: 300,
            idle_check_millis: 1000,
            shutdown_timeout_secs: 10,
            server_port: 3000,
        }
    }
}
