//! Scheduler Module
//!
//! Background task execution.
//!
//! # Components
//! - SerialScheduler: named tasks, at most one running at a time
//! - SimpleScheduler: one action retriggered at fixed intervals

mod config;
mod execution;
mod serial;
mod simple;
mod task;

pub use config::{SchedulerConfig, DEFAULT_FAILURE_RETRY_INTERVAL, DEFAULT_IDLE_CHECK_INTERVAL};
pub use serial::{SchedulerHandle, SchedulerSnapshot, SchedulerState, SerialScheduler, TaskSnapshot};
pub use simple::{SimpleScheduler, DEFAULT_CHECK_INTERVAL};
pub use task::{task_fn, CancellationFlag, Task, TaskContext};
