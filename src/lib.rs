//! Cache Sched - eviction cache and serial task scheduler
//!
//! Provides a usage-expiring LRU cache with min/max entry policies and a
//! scheduler that runs at most one background task at a time.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod tasks;

pub use api::AppState;
pub use cache::{EvictionCache, EvictionPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use scheduler::{SchedulerConfig, SerialScheduler, SimpleScheduler, Task, TaskContext};
pub use tasks::register_maintenance_task;
