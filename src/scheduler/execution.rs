//! Task Execution Module
//!
//! Runs a single task instance on a dedicated worker thread and records how
//! it ended.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use tracing::{error, warn};

use super::serial::SchedulerHandle;
use super::task::{CancellationFlag, Task, TaskContext};

#[derive(Debug, Default)]
struct Outcome {
    done: bool,
    finished_at: Option<DateTime<Utc>>,
    failure: Option<String>,
}

// == Task Execution ==
/// One running task instance.
///
/// The worker thread is detached; completion is observed through
/// [`is_done`](Self::is_done) and [`wait`](Self::wait).
#[derive(Debug)]
pub(crate) struct TaskExecution {
    name: String,
    cancellation: CancellationFlag,
    outcome: Mutex<Outcome>,
    finished: Condvar,
}

impl TaskExecution {
    // == Spawn ==
    /// Starts `task` on a new thread named after it.
    ///
    /// `on_finish` runs on the worker after the outcome has been recorded.
    pub fn spawn<F>(
        name: &str,
        mut task: Box<dyn Task>,
        scheduler: SchedulerHandle,
        on_finish: F,
    ) -> io::Result<Arc<Self>>
    where
        F: FnOnce() + Send + 'static,
    {
        let execution = Arc::new(Self {
            name: name.to_string(),
            cancellation: CancellationFlag::default(),
            outcome: Mutex::new(Outcome::default()),
            finished: Condvar::new(),
        });

        let ctx = TaskContext::new(name.to_string(), execution.cancellation.clone(), scheduler);
        let worker = execution.clone();

        thread::Builder::new()
            .name(format!("task-{}", name))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| task.run(&ctx)));
                drop(task);

                let failure = match result {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => {
                        warn!("Task '{}' failed: {:#}", worker.name, err);
                        Some(format!("{:#}", err))
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!("Task '{}' panicked: {}", worker.name, message);
                        Some(format!("panicked: {}", message))
                    }
                };

                worker.complete(failure);
                on_finish();
            })?;

        Ok(execution)
    }

    fn complete(&self, failure: Option<String>) {
        let mut outcome = self.outcome.lock();
        outcome.done = true;
        outcome.finished_at = Some(Utc::now());
        outcome.failure = failure;
        self.finished.notify_all();
    }

    // == Accessors ==
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_done(&self) -> bool {
        self.outcome.lock().done
    }

    pub fn failed(&self) -> bool {
        self.outcome.lock().failure.is_some()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.outcome.lock().finished_at
    }

    // == Cancellation ==
    /// Requests cooperative cancellation without waiting.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Blocks until the task finished or the timeout elapsed.
    ///
    /// Returns whether the task finished.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut outcome = self.outcome.lock();
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                while !outcome.done {
                    if self.finished.wait_until(&mut outcome, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while !outcome.done {
                    self.finished.wait(&mut outcome);
                }
            }
        }
        outcome.done
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
