//! Task Module
//!
//! The unit of work run by the serial scheduler and the context it runs in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::serial::SchedulerHandle;

/// How often [`TaskContext::sleep`] re-checks the cancellation flag.
const CANCELLATION_POLL: Duration = Duration::from_millis(10);

// == Task Trait ==
/// A unit of work executed on its own worker thread.
///
/// Cancellation is cooperative: long running implementations must poll
/// [`TaskContext::is_cancelled`] and return early once it is set. Returning
/// an error (or panicking) marks the execution as failed, which reschedules
/// the task after the failure-retry interval.
pub trait Task: Send {
    fn run(&mut self, ctx: &TaskContext) -> anyhow::Result<()>;
}

impl<F> Task for F
where
    F: FnMut(&TaskContext) -> anyhow::Result<()> + Send,
{
    fn run(&mut self, ctx: &TaskContext) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// Pins a closure to the [`Task`] signature so its argument and error types
/// are inferred.
pub fn task_fn<F>(f: F) -> F
where
    F: FnMut(&TaskContext) -> anyhow::Result<()> + Send,
{
    f
}

/// Produces a fresh task instance for every execution.
pub(crate) type TaskFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn Task>> + Send + Sync>;

// == Cancellation Flag ==
/// Shared cancellation request, only settable by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

// == Task Context ==
/// Handed to a running task: its name, cancellation state and a handle back
/// to the scheduler that started it.
#[derive(Debug, Clone)]
pub struct TaskContext {
    name: String,
    cancellation: CancellationFlag,
    scheduler: SchedulerHandle,
}

impl TaskContext {
    pub(crate) fn new(name: String, cancellation: CancellationFlag, scheduler: SchedulerHandle) -> Self {
        Self {
            name,
            cancellation,
            scheduler,
        }
    }

    /// Name the task was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the scheduler asked this execution to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The scheduler running this task, for scheduling follow-up work.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Sleeps for `duration` unless cancelled first.
    ///
    /// Returns `false` if the sleep was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_cancelled() {
                return false;
            }
            let step = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    (deadline - now).min(CANCELLATION_POLL)
                }
                None => CANCELLATION_POLL,
            };
            thread::sleep(step);
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn detached_context() -> TaskContext {
        TaskContext::new(
            "test".to_string(),
            CancellationFlag::default(),
            SchedulerHandle::detached(),
        )
    }

    #[test]
    fn test_cancellation_flag() {
        let flag = CancellationFlag::default();
        let observer = flag.clone();

        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_closure_is_task() {
        let ctx = detached_context();
        let mut calls = 0;
        let mut task = task_fn(|ctx| {
            calls += 1;
            assert_eq!(ctx.name(), "test");
            Ok(())
        });

        task.run(&ctx).unwrap();
        task.run(&ctx).unwrap();
        drop(task);

        assert_eq!(calls, 2);
    }

    #[test]
    fn test_sleep_completes() {
        let ctx = detached_context();
        let started = Instant::now();

        assert!(ctx.sleep(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_sleep_interrupted_by_cancel() {
        let ctx = detached_context();
        let cancel = ctx.cancellation.clone();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        });

        let started = Instant::now();
        assert!(!ctx.sleep(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));

        canceller.join().unwrap();
    }

    #[test]
    fn test_detached_handle_rejects_calls() {
        let ctx = detached_context();
        assert!(ctx.scheduler().trigger("anything").is_err());
    }
}
