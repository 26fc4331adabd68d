//! Response DTOs for the server API

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheStats, EvictionPolicy};

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: String,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub key: String,
    /// Value the key held before, if any
    pub previous: Option<String>,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, previous: Option<String>) -> Self {
        Self {
            key: key.into(),
            previous,
        }
    }
}

/// Response body for the DELETE operation (DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub key: String,
    /// The removed value
    pub value: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Response body for a forced maintenance pass (POST /maintain)
#[derive(Debug, Clone, Serialize)]
pub struct MaintainResponse {
    /// Number of entries evicted
    pub removed: usize,
    /// Entries left afterwards
    pub remaining: usize,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    /// Evictions of any cause
    pub evictions: u64,
    pub capacity_evictions: u64,
    pub expiration_evictions: u64,
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    pub policy: PolicyView,
}

/// Serialized form of the eviction policy.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyView {
    pub min_entries: usize,
    pub max_entries: Option<usize>,
    pub usage_expiration_secs: Option<u64>,
}

impl From<&EvictionPolicy> for PolicyView {
    fn from(policy: &EvictionPolicy) -> Self {
        Self {
            min_entries: policy.min_entries,
            max_entries: policy.max_entries,
            usage_expiration_secs: policy.usage_expiration.map(|d| d.as_secs()),
        }
    }
}

impl StatsResponse {
    /// Creates a new StatsResponse from cache statistics and policy
    pub fn new(stats: &CacheStats, policy: &EvictionPolicy) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions(),
            capacity_evictions: stats.capacity_evictions,
            expiration_evictions: stats.expiration_evictions,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
            policy: policy.into(),
        }
    }
}

/// Response body for a manual trigger (POST /tasks/:name/trigger)
#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    pub name: String,
    /// Due time after the trigger, None if the task is running right now
    pub next_due: Option<DateTime<Utc>>,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
