//! Cache Maintenance Task
//!
//! Periodically evicts entries the cache policy no longer retains.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::cache::EvictionCache;
use crate::error::Result;
use crate::scheduler::{SerialScheduler, Task, TaskContext};

/// Name the maintenance task is registered under.
pub const MAINTENANCE_TASK: &str = "cache-maintenance";

/// One maintenance pass over the shared cache.
#[derive(Debug)]
pub struct CacheMaintenanceTask {
    cache: Arc<EvictionCache<String, String>>,
}

impl CacheMaintenanceTask {
    pub fn new(cache: Arc<EvictionCache<String, String>>) -> Self {
        Self { cache }
    }
}

impl Task for CacheMaintenanceTask {
    fn run(&mut self, ctx: &TaskContext) -> anyhow::Result<()> {
        if ctx.is_cancelled() {
            return Ok(());
        }

        let removed = self.cache.maintain();
        if removed > 0 {
            info!("Cache maintenance: evicted {} entries", removed);
        } else {
            debug!("Cache maintenance: nothing to evict");
        }
        Ok(())
    }
}

/// Registers the maintenance task, first due one interval from now.
///
/// # Arguments
/// * `scheduler` - Serial scheduler that will run the task
/// * `cache` - Shared cache to maintain
/// * `interval` - Delay between the end of one pass and the start of the next
pub fn register_maintenance_task(
    scheduler: &SerialScheduler,
    cache: Arc<EvictionCache<String, String>>,
    interval: Duration,
) -> Result<()> {
    let first_run = crate::clock::add_duration(Utc::now(), interval);
    scheduler.schedule(
        MAINTENANCE_TASK,
        move || Ok(CacheMaintenanceTask::new(cache.clone())),
        first_run,
        Some(interval),
    )?;

    info!(
        "Cache maintenance task registered with interval of {:?}",
        interval
    );
    Ok(())
}
