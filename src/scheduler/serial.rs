//! Serial Scheduler Module
//!
//! Runs at most one registered task at a time, picking whichever is due
//! first. Finished tasks are rescheduled by their repeat interval, failed
//! ones by the failure-retry interval.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::config::{SchedulerConfig, MIN_WAIT};
use super::execution::{panic_message, TaskExecution};
use super::task::{Task, TaskFactory};
use crate::clock::{add_duration, elapsed_between};
use crate::error::{Error, Result};

// == Scheduler State ==
/// Lifecycle of a [`SerialScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Created,
    Running,
    ShuttingDown,
    Terminated,
}

/// Registered task: how to build it and when to repeat it.
struct TaskDefinition {
    factory: TaskFactory,
    repeat_interval: Option<Duration>,
}

/// Everything guarded by the schedule lock.
#[derive(Debug)]
struct ScheduleState {
    /// Next due time per task name; absent while the task runs
    schedule: HashMap<String, DateTime<Utc>>,
    /// The single execution in flight, kept until the loop collects it
    running: Option<Arc<TaskExecution>>,
    /// Every name ever registered, survives shutdown
    registered: HashSet<String>,
    lifecycle: SchedulerState,
    loop_exited: bool,
}

struct Shared {
    config: SchedulerConfig,
    state: Mutex<ScheduleState>,
    /// Signalled on registration, trigger, task completion and shutdown
    wakeup: Condvar,
    /// Lock order: `state` before `definitions`
    definitions: RwLock<HashMap<String, Arc<TaskDefinition>>>,
    shutdown: AtomicBool,
}

// == Snapshots ==
/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    pub state: SchedulerState,
    /// Name of the task currently executing
    pub running: Option<String>,
    pub tasks: Vec<TaskSnapshot>,
}

/// Point-in-time view of one registered task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub name: String,
    /// None while running or when not rescheduled after its last run
    pub next_due: Option<DateTime<Utc>>,
    pub repeat_interval_ms: Option<u64>,
}

/// Moves `name` to `at` unless it is already due earlier; returns the
/// resulting due time.
fn reschedule_if_earlier(
    schedule: &mut HashMap<String, DateTime<Utc>>,
    name: &str,
    at: DateTime<Utc>,
) -> DateTime<Utc> {
    let effective = match schedule.get(name) {
        Some(current) if *current <= at => *current,
        _ => at,
    };
    schedule.insert(name.to_string(), effective);
    effective
}

impl Shared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    // == Registration ==
    fn schedule(
        &self,
        name: String,
        factory: TaskFactory,
        initial_start: DateTime<Utc>,
        repeat_interval: Option<Duration>,
    ) -> Result<()> {
        if repeat_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::InvalidInterval(format!(
                "repeat interval of task '{}' must be positive",
                name
            )));
        }

        let mut state = self.state.lock();
        if self.is_shutdown() {
            return Err(Error::ShutDown);
        }
        if !state.registered.insert(name.clone()) {
            return Err(Error::DuplicateTask(name));
        }

        self.definitions.write().insert(
            name.clone(),
            Arc::new(TaskDefinition {
                factory,
                repeat_interval,
            }),
        );
        state.schedule.insert(name.clone(), initial_start);

        info!(
            "Scheduled task '{}' at {} (repeat interval: {:?})",
            name, initial_start, repeat_interval
        );
        self.wakeup.notify_all();
        Ok(())
    }

    fn reschedule_if_earlier(&self, name: &str, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let mut state = self.state.lock();
        if self.is_shutdown() {
            return Err(Error::ShutDown);
        }
        if !self.definitions.read().contains_key(name) {
            return Err(Error::UnknownTask(name.to_string()));
        }

        let effective = reschedule_if_earlier(&mut state.schedule, name, at);
        debug!(
            "Requested task '{}' at {}, effective due time {}",
            name, at, effective
        );

        if effective == at {
            self.wakeup.notify_all();
        }
        Ok(effective)
    }

    fn next_due(&self, name: &str) -> Option<DateTime<Utc>> {
        self.state.lock().schedule.get(name).copied()
    }

    // == Scheduling Loop ==
    fn run_loop(self: &Arc<Self>) {
        info!("Scheduler started");

        let mut state = self.state.lock();
        while !self.is_shutdown() {
            self.collect_finished(&mut state);

            let now = Utc::now();
            let mut wake_at = add_duration(now, self.config.idle_check_interval().max(MIN_WAIT));
            if state.running.is_none() {
                if let Some(next_due) = self.start_next_due(&mut state) {
                    wake_at = wake_at.min(next_due);
                }
            }

            if self.is_shutdown() {
                break;
            }

            let sleep = elapsed_between(Utc::now(), wake_at).max(MIN_WAIT);
            debug!("Sleeping for {:?}", sleep);
            self.wakeup.wait_for(&mut state, sleep);
        }

        if let Some(execution) = state.running.as_ref().filter(|e| !e.is_done()) {
            warn!("Aborting running task '{}'", execution.name());
            execution.cancel();
        }

        state.loop_exited = true;
        if state.running.as_ref().map_or(true, |e| e.is_done()) {
            state.lifecycle = SchedulerState::Terminated;
        }
        self.wakeup.notify_all();

        info!("Scheduler terminated");
    }

    /// Reschedules the previous execution once it has completed.
    fn collect_finished(&self, state: &mut ScheduleState) {
        let Some(execution) = state.running.as_ref().filter(|e| e.is_done()).cloned() else {
            return;
        };
        state.running = None;

        let name = execution.name();
        let Some(definition) = self.definitions.read().get(name).cloned() else {
            debug!("Task '{}' finished after its definition was removed", name);
            return;
        };

        let interval = if execution.failed() {
            warn!(
                "Task '{}' has failed, applying retry interval of {:?}",
                name, self.config.failure_retry_interval()
            );
            Some(self.config.failure_retry_interval())
        } else {
            definition.repeat_interval
        };

        match interval {
            None => info!(
                "Task '{}' finished, not rescheduling (no interval configured)",
                name
            ),
            Some(interval) => {
                let finished_at = execution.finished_at().unwrap_or_else(Utc::now);
                let next = reschedule_if_earlier(
                    &mut state.schedule,
                    name,
                    add_duration(finished_at, interval),
                );
                info!("Task '{}' finished, rescheduled for {}", name, next);
            }
        }
    }

    /// Starts the earliest due task, postponing any whose factory fails.
    ///
    /// Returns the due time of the next task if none is due yet. Each task
    /// is attempted at most once per call.
    fn start_next_due(
        self: &Arc<Self>,
        state: &mut MutexGuard<'_, ScheduleState>,
    ) -> Option<DateTime<Utc>> {
        let mut postponed: HashSet<String> = HashSet::new();
        loop {
            let candidate = state
                .schedule
                .iter()
                .filter(|(name, _)| !postponed.contains(*name))
                .min_by_key(|(_, due)| **due)
                .map(|(name, due)| (name.clone(), *due));
            let (name, due) = match candidate {
                Some(candidate) => candidate,
                None if postponed.is_empty() => {
                    debug!("No tasks scheduled");
                    return None;
                }
                None => return state.schedule.values().min().copied(),
            };

            let now = Utc::now();
            if due > now {
                debug!(
                    "Next task '{}' is not due yet, time until start: {:?}",
                    name,
                    elapsed_between(now, due)
                );
                return Some(due);
            }

            let Some(definition) = self.definitions.read().get(&name).cloned() else {
                warn!("Dropping schedule entry of unknown task '{}'", name);
                state.schedule.remove(&name);
                continue;
            };

            debug!("Task '{}' is due", name);
            let instance = MutexGuard::unlocked(state, || instantiate(&name, &definition));
            if self.is_shutdown() {
                return None;
            }

            let started = instance.and_then(|task| {
                TaskExecution::spawn(&name, task, self.handle(), self.completion_notifier())
                    .map_err(|err| anyhow::anyhow!("failed to spawn worker thread: {}", err))
            });

            match started {
                Ok(execution) => {
                    info!("Starting task '{}'", name);
                    state.schedule.remove(&name);
                    state.running = Some(execution);
                    return None;
                }
                Err(err) => {
                    warn!(
                        "Postponing task '{}' for {:?} after failed start: {:#}",
                        name, self.config.failure_retry_interval(), err
                    );
                    state.schedule.insert(
                        name.clone(),
                        add_duration(Utc::now(), self.config.failure_retry_interval()),
                    );
                    postponed.insert(name);
                }
            }
        }
    }

    fn handle(self: &Arc<Self>) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::downgrade(self),
        }
    }

    /// Wakes the loop once the worker recorded its outcome.
    fn completion_notifier(self: &Arc<Self>) -> impl FnOnce() + Send + 'static {
        let shared = Arc::downgrade(self);
        move || {
            if let Some(shared) = shared.upgrade() {
                let mut state = shared.state.lock();
                if state.loop_exited {
                    state.lifecycle = SchedulerState::Terminated;
                }
                shared.wakeup.notify_all();
            }
        }
    }

    // == Shutdown ==
    fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        let mut state = self.state.lock();
        state.schedule.clear();
        if let Some(execution) = state.running.as_ref().filter(|e| !e.is_done()) {
            info!("Cancelling running task '{}'", execution.name());
            execution.cancel();
        }
        state.lifecycle = match state.lifecycle {
            SchedulerState::Created => SchedulerState::Terminated,
            SchedulerState::Running => SchedulerState::ShuttingDown,
            other => other,
        };
        self.definitions.write().clear();
        self.wakeup.notify_all();
    }
}

/// Builds a task instance, treating panics like factory errors.
fn instantiate(name: &str, definition: &TaskDefinition) -> anyhow::Result<Box<dyn Task>> {
    match panic::catch_unwind(AssertUnwindSafe(|| (definition.factory)())) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!(
            "factory of task '{}' panicked: {}",
            name,
            panic_message(payload.as_ref())
        )),
    }
}

fn box_factory<F, T>(factory: F) -> TaskFactory
where
    F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    T: Task + 'static,
{
    Box::new(move || factory().map(|task| Box::new(task) as Box<dyn Task>))
}

// == Serial Scheduler ==
/// Scheduler executing at most one task at any instant.
///
/// Tasks are registered by name with a factory that builds a fresh instance
/// for every run. The scheduling loop runs on its own thread once
/// [`start`](Self::start) is called; each task runs on a separate worker
/// thread. Dropping the scheduler requests shutdown without waiting.
///
/// Factories must not capture the scheduler itself; tasks reach it through
/// [`TaskContext::scheduler`](super::TaskContext::scheduler) instead.
pub struct SerialScheduler {
    shared: Arc<Shared>,
    started: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SerialScheduler {
    // == Constructor ==
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(ScheduleState {
                    schedule: HashMap::new(),
                    running: None,
                    registered: HashSet::new(),
                    lifecycle: SchedulerState::Created,
                    loop_exited: false,
                }),
                wakeup: Condvar::new(),
                definitions: RwLock::new(HashMap::new()),
                shutdown: AtomicBool::new(false),
            }),
            started: AtomicBool::new(false),
            thread: Mutex::new(None),
        }
    }

    // == Registration ==
    /// Registers a task under a unique name, first due at `initial_start`.
    ///
    /// Without a `repeat_interval` the task is not rescheduled after a
    /// successful run.
    ///
    /// # Errors
    /// - [`Error::DuplicateTask`] if the name was ever registered before
    /// - [`Error::InvalidInterval`] for a zero repeat interval
    /// - [`Error::ShutDown`] after shutdown was requested
    pub fn schedule<F, T>(
        &self,
        name: impl Into<String>,
        factory: F,
        initial_start: DateTime<Utc>,
        repeat_interval: Option<Duration>,
    ) -> Result<()>
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
        T: Task + 'static,
    {
        self.shared
            .schedule(name.into(), box_factory(factory), initial_start, repeat_interval)
    }

    /// Makes the task due now, unless it is already due earlier.
    pub fn trigger(&self, name: &str) -> Result<()> {
        self.shared.reschedule_if_earlier(name, Utc::now()).map(|_| ())
    }

    /// Moves the task to `at` if that is earlier than its current due time.
    ///
    /// Returns the effective due time, equal to `at` if the request won.
    pub fn reschedule_if_earlier(&self, name: &str, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.shared.reschedule_if_earlier(name, at)
    }

    // == Lifecycle ==
    /// Starts the scheduling loop on a dedicated thread.
    ///
    /// Calling it again, or after shutdown, only logs a warning.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Scheduler was attempted to be started twice");
            return Ok(());
        }

        {
            let mut state = self.shared.state.lock();
            if self.shared.is_shutdown() {
                warn!("Scheduler was shut down before start");
                state.loop_exited = true;
                return Ok(());
            }
            state.lifecycle = SchedulerState::Running;
        }

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("serial-scheduler".to_string())
            .spawn(move || shared.run_loop());

        match spawned {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                Ok(())
            }
            Err(err) => {
                error!("Failed to spawn scheduler thread: {}", err);
                let mut state = self.shared.state.lock();
                state.lifecycle = SchedulerState::Terminated;
                state.loop_exited = true;
                Err(Error::Internal(format!(
                    "failed to spawn scheduler thread: {}",
                    err
                )))
            }
        }
    }

    /// Requests shutdown without blocking.
    ///
    /// Cancels the running task and drops all registrations right away so
    /// captured resources are released even before the loop notices.
    pub fn shutdown_async(&self) {
        info!("Requesting scheduler shutdown");
        self.shared.request_shutdown();
    }

    /// Requests shutdown and waits for the loop and the running task.
    ///
    /// The timeout covers both waits together. Returns `false` if either was
    /// still running when it expired, e.g. a task ignoring cancellation.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        self.shutdown_async();

        if !self.started.load(Ordering::SeqCst) {
            debug!("Scheduler was never started");
            return true;
        }

        info!("Waiting for scheduler to shut down (at most {:?})", timeout);
        let deadline = started.checked_add(timeout);
        let running = {
            let mut state = self.shared.state.lock();
            while !state.loop_exited {
                match deadline {
                    Some(deadline) => {
                        if self.shared.wakeup.wait_until(&mut state, deadline).timed_out()
                            && !state.loop_exited
                        {
                            warn!("Scheduler is still running after {:?}", timeout);
                            return false;
                        }
                    }
                    None => self.shared.wakeup.wait(&mut state),
                }
            }
            state.running.clone()
        };

        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!("Scheduler thread panicked");
            }
        }

        if let Some(execution) = running.filter(|e| !e.is_done()) {
            let remaining = timeout.saturating_sub(started.elapsed());
            info!(
                "Waiting for task '{}' to shut down (at most remaining {:?})",
                execution.name(),
                remaining
            );
            execution.cancel();
            if !execution.wait(remaining) {
                warn!(
                    "Task '{}' is still running after total timeout of {:?}",
                    execution.name(),
                    timeout
                );
                return false;
            }
        }

        self.shared.state.lock().lifecycle = SchedulerState::Terminated;
        true
    }

    // == Inspection ==
    pub fn state(&self) -> SchedulerState {
        self.shared.state.lock().lifecycle
    }

    /// Due time of the task, None while it runs or if it is not scheduled.
    pub fn next_due(&self, name: &str) -> Option<DateTime<Utc>> {
        self.shared.next_due(name)
    }

    /// Name of the task currently executing.
    pub fn running_task(&self) -> Option<String> {
        self.shared
            .state
            .lock()
            .running
            .as_ref()
            .filter(|e| !e.is_done())
            .map(|e| e.name().to_string())
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.shared.state.lock();
        let definitions = self.shared.definitions.read();

        let mut tasks: Vec<TaskSnapshot> = definitions
            .iter()
            .map(|(name, definition)| TaskSnapshot {
                name: name.clone(),
                next_due: state.schedule.get(name).copied(),
                repeat_interval_ms: definition
                    .repeat_interval
                    .map(|interval| u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)),
            })
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));

        SchedulerSnapshot {
            state: state.lifecycle,
            running: state
                .running
                .as_ref()
                .filter(|e| !e.is_done())
                .map(|e| e.name().to_string()),
            tasks,
        }
    }

    /// A weak handle for code that must not keep the scheduler alive.
    pub fn handle(&self) -> SchedulerHandle {
        self.shared.handle()
    }
}

impl Default for SerialScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Drop for SerialScheduler {
    fn drop(&mut self) {
        if !self.shared.is_shutdown() {
            self.shared.request_shutdown();
        }
    }
}

impl fmt::Debug for SerialScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialScheduler")
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// == Scheduler Handle ==
/// Non-owning access to a scheduler, handed to running tasks.
///
/// Calls fail with [`Error::ShutDown`] once the scheduler is gone.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Weak<Shared>,
}

impl SchedulerHandle {
    /// A handle not attached to any scheduler.
    pub(crate) fn detached() -> Self {
        Self {
            shared: Weak::new(),
        }
    }

    fn shared(&self) -> Result<Arc<Shared>> {
        self.shared.upgrade().ok_or(Error::ShutDown)
    }

    /// See [`SerialScheduler::schedule`].
    pub fn schedule<F, T>(
        &self,
        name: impl Into<String>,
        factory: F,
        initial_start: DateTime<Utc>,
        repeat_interval: Option<Duration>,
    ) -> Result<()>
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
        T: Task + 'static,
    {
        self.shared()?
            .schedule(name.into(), box_factory(factory), initial_start, repeat_interval)
    }

    /// See [`SerialScheduler::trigger`].
    pub fn trigger(&self, name: &str) -> Result<()> {
        self.shared()?
            .reschedule_if_earlier(name, Utc::now())
            .map(|_| ())
    }

    /// See [`SerialScheduler::reschedule_if_earlier`].
    pub fn reschedule_if_earlier(&self, name: &str, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.shared()?.reschedule_if_earlier(name, at)
    }

    pub fn next_due(&self, name: &str) -> Option<DateTime<Utc>> {
        self.shared().ok()?.next_due(name)
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("attached", &(self.shared.strong_count() > 0))
            .finish()
    }
}
