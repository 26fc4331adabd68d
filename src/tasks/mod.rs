//! Background Tasks Module
//!
//! Contains background tasks that run on the serial scheduler during server
//! operation.
//!
//! # Tasks
//! - Cache Maintenance: Applies the eviction policy at configured intervals

mod maintenance;

pub use maintenance::{register_maintenance_task, CacheMaintenanceTask, MAINTENANCE_TASK};
