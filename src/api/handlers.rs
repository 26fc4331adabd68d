//! API Handlers
//!
//! HTTP request handlers for the cache and scheduler endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::EvictionCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{
    DeleteResponse, GetResponse, HealthResponse, MaintainResponse, SetRequest, SetResponse,
    StatsResponse, TriggerResponse,
};
use crate::scheduler::{SchedulerSnapshot, SerialScheduler};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared string cache
    pub cache: Arc<EvictionCache<String, String>>,
    /// Scheduler running background maintenance
    pub scheduler: Arc<SerialScheduler>,
}

impl AppState {
    pub fn new(cache: EvictionCache<String, String>, scheduler: SerialScheduler) -> Self {
        Self {
            cache: Arc::new(cache),
            scheduler: Arc::new(scheduler),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Fails if the configured eviction bounds or scheduler timings are
    /// inconsistent.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = EvictionCache::new().with_policy(config.cache_policy()?);
        let scheduler = SerialScheduler::new(config.scheduler_config()?);
        Ok(Self::new(cache, scheduler))
    }
}

/// Handler for PUT /set
///
/// Stores a key-value pair, returning the value it replaced.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(Error::InvalidRequest(error_msg));
    }

    let previous = state.cache.put(req.key.clone(), req.value);
    Ok(Json(SetResponse::new(req.key, previous)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state
        .cache
        .get(key.as_str())
        .ok_or_else(|| Error::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let value = state
        .cache
        .remove(key.as_str())
        .ok_or_else(|| Error::NotFound(key.clone()))?;

    Ok(Json(DeleteResponse::new(key, value)))
}

/// Handler for POST /maintain
///
/// Runs a maintenance pass immediately instead of waiting for the scheduler.
pub async fn maintain_handler(State(state): State<AppState>) -> Json<MaintainResponse> {
    let removed = state.cache.maintain();
    Json(MaintainResponse {
        removed,
        remaining: state.cache.len(),
    })
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.stats();
    let policy = state.cache.policy();

    Json(StatsResponse::new(&stats, &policy))
}

/// Handler for GET /tasks
pub async fn tasks_handler(State(state): State<AppState>) -> Json<SchedulerSnapshot> {
    Json(state.scheduler.snapshot())
}

/// Handler for POST /tasks/:name/trigger
///
/// Makes the task due now; never postpones it.
pub async fn trigger_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TriggerResponse>> {
    state.scheduler.trigger(&name)?;
    let next_due = state.scheduler.next_due(&name);

    Ok(Json(TriggerResponse { name, next_due }))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
