//! Simple Scheduler Module
//!
//! A single action re-triggered at fixed intervals, checked by a thread that
//! wakes up periodically.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use super::config::MIN_WAIT;
use super::execution::panic_message;
use crate::clock::add_duration;
use crate::error::{Error, Result};

/// Default time between checks for a due trigger.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

type Action = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

struct Settings {
    check_interval: Duration,
    repeat_interval: Option<Duration>,
    retry_interval: Option<Duration>,
    enabled: bool,
    /// None = never
    next_trigger: Option<DateTime<Utc>>,
    action: Option<Action>,
    error_handler: Option<ErrorHandler>,
    exited: bool,
}

struct Inner {
    name: String,
    settings: Mutex<Settings>,
    wakeup: Condvar,
    shutdown: AtomicBool,
}

impl Inner {
    fn run_loop(&self) {
        debug!("Scheduler thread spawned for '{}'", self.name);

        let mut settings = self.settings.lock();
        while !self.shutdown.load(Ordering::SeqCst) {
            trace!("Scheduler for '{}' woke up", self.name);

            let due = settings
                .next_trigger
                .is_some_and(|next| Utc::now() > next);

            if !settings.enabled {
                debug!("Scheduler for '{}' is disabled, not triggering", self.name);
            } else if due {
                self.fire(&mut settings);
            }

            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let interval = settings.check_interval;
            self.wakeup.wait_for(&mut settings, interval);
        }

        settings.exited = true;
        self.wakeup.notify_all();
        debug!("Scheduler thread for '{}' exited", self.name);
    }

    /// Runs the action once and sets the following trigger time.
    fn fire(&self, settings: &mut MutexGuard<'_, Settings>) {
        debug!("Triggering '{}'", self.name);
        settings.next_trigger = None;

        let action = settings.action.clone();
        let handler = settings.error_handler.clone();

        let failed = MutexGuard::unlocked(settings, || {
            let Some(action) = action else {
                warn!("No action set for scheduler '{}'", self.name);
                return false;
            };

            let error = match panic::catch_unwind(AssertUnwindSafe(|| action())) {
                Ok(Ok(())) => return false,
                Ok(Err(err)) => err,
                Err(payload) => anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())),
            };
            warn!("Trigger for '{}' failed: {:#}", self.name, error);

            if let Some(handler) = handler {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&error))) {
                    warn!(
                        "Error handler for '{}' failed: {}",
                        self.name,
                        panic_message(payload.as_ref())
                    );
                }
            }
            true
        });

        let retry = if failed { settings.retry_interval } else { None };
        let delay = [retry, settings.repeat_interval].into_iter().flatten().min();
        if let Some(delay) = delay {
            set_if_earlier(settings, add_duration(Utc::now(), delay));
        }
    }
}

fn set_if_earlier(settings: &mut Settings, at: DateTime<Utc>) -> bool {
    let effective = match settings.next_trigger {
        Some(current) if current <= at => current,
        _ => at,
    };
    settings.next_trigger = Some(effective);
    effective == at
}

// == Simple Scheduler ==
/// Periodically triggers one action, rescheduling it depending on whether
/// it succeeded or failed.
///
/// The scheduler starts disabled with no trigger time set; enable it and
/// set a trigger (directly or via a repeat interval after a first run) to
/// get the action called. Triggers are only noticed when the thread wakes
/// up, so the check interval bounds the delay.
pub struct SimpleScheduler {
    inner: Arc<Inner>,
    started: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SimpleScheduler {
    // == Constructor ==
    /// Creates a scheduler identified in logs and thread names by `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                settings: Mutex::new(Settings {
                    check_interval: DEFAULT_CHECK_INTERVAL,
                    repeat_interval: None,
                    retry_interval: None,
                    enabled: false,
                    next_trigger: None,
                    action: None,
                    error_handler: None,
                    exited: false,
                }),
                wakeup: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
            started: AtomicBool::new(false),
            thread: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // == Settings ==
    /// Sets how often the thread wakes up to check for a due trigger.
    pub fn set_check_interval(&self, check_interval: Duration) -> &Self {
        debug!(
            "Setting '{}' check interval to {:?}",
            self.inner.name, check_interval
        );
        self.inner.settings.lock().check_interval = check_interval.max(MIN_WAIT);
        self
    }

    /// Overrides the next trigger time unconditionally.
    pub fn set_next_trigger(&self, next_trigger: DateTime<Utc>) -> &Self {
        debug!(
            "Setting '{}' trigger time to {}",
            self.inner.name, next_trigger
        );
        self.inner.settings.lock().next_trigger = Some(next_trigger);
        self
    }

    pub fn next_trigger(&self) -> Option<DateTime<Utc>> {
        self.inner.settings.lock().next_trigger
    }

    /// Sets the interval to retrigger at after a successful run.
    pub fn set_repeat_interval(&self, repeat_interval: Duration) -> &Self {
        debug!(
            "Setting '{}' repeat interval to {:?}",
            self.inner.name, repeat_interval
        );
        self.inner.settings.lock().repeat_interval = Some(repeat_interval);
        self
    }

    pub fn disable_repetition(&self) -> &Self {
        debug!("Disabling '{}' repetition", self.inner.name);
        self.inner.settings.lock().repeat_interval = None;
        self
    }

    /// Sets the interval to reattempt at after a failed run.
    ///
    /// A shorter repeat interval still wins.
    pub fn set_retry_interval(&self, retry_interval: Duration) -> &Self {
        debug!(
            "Setting '{}' retry interval to {:?}",
            self.inner.name, retry_interval
        );
        self.inner.settings.lock().retry_interval = Some(retry_interval);
        self
    }

    pub fn disable_retries(&self) -> &Self {
        debug!("Disabling '{}' retry interval", self.inner.name);
        self.inner.settings.lock().retry_interval = None;
        self
    }

    /// Sets the action to run when triggered.
    pub fn on_trigger<F>(&self, action: F) -> &Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.settings.lock().action = Some(Arc::new(action));
        self
    }

    /// Sets a callback receiving the errors of failed runs.
    pub fn on_error<F>(&self, handler: F) -> &Self
    where
        F: Fn(&anyhow::Error) + Send + Sync + 'static,
    {
        self.inner.settings.lock().error_handler = Some(Arc::new(handler));
        self
    }

    pub fn set_enabled(&self, enabled: bool) -> &Self {
        self.inner.settings.lock().enabled = enabled;
        info!(
            "Scheduler '{}' is now {}",
            self.inner.name,
            if enabled { "enabled" } else { "disabled" }
        );
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.settings.lock().enabled
    }

    // == Conditional Triggers ==
    /// Sets the next trigger to `at` unless an earlier one is pending.
    ///
    /// Returns `true` if `at` is now the next trigger time.
    pub fn set_next_trigger_if_earlier(&self, at: DateTime<Utc>) -> bool {
        let mut settings = self.inner.settings.lock();
        let won = set_if_earlier(&mut settings, at);
        debug!(
            "Trigger time for '{}' is {:?}",
            self.inner.name, settings.next_trigger
        );
        won
    }

    /// Same as [`set_next_trigger_if_earlier`](Self::set_next_trigger_if_earlier)
    /// with a delay from now.
    pub fn set_next_trigger_in(&self, delay: Duration) -> bool {
        self.set_next_trigger_if_earlier(add_duration(Utc::now(), delay))
    }

    // == Lifecycle ==
    /// Spawns the checking thread. Repeated calls only log a warning.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Scheduler '{}' was attempted to be started twice", self.inner.name);
            return Ok(());
        }

        let inner = self.inner.clone();
        let handle = thread::Builder::new()
            .name(self.inner.name.clone())
            .spawn(move || inner.run_loop())
            .map_err(|err| {
                error!("Failed to spawn scheduler '{}': {}", self.inner.name, err);
                self.inner.settings.lock().exited = true;
                Error::Internal(format!("failed to spawn scheduler thread: {}", err))
            })?;

        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Stops the thread and waits at most `timeout` for it to exit.
    ///
    /// An action in progress is not interrupted. Returns whether the thread
    /// exited in time.
    pub fn shutdown_and_join(&self, timeout: Duration) -> bool {
        debug!("Shutting down '{}'", self.inner.name);
        self.inner.shutdown.store(true, Ordering::SeqCst);

        if !self.started.load(Ordering::SeqCst) {
            return true;
        }

        {
            let mut settings = self.inner.settings.lock();
            self.inner.wakeup.notify_all();

            let deadline = Instant::now().checked_add(timeout);
            while !settings.exited {
                match deadline {
                    Some(deadline) => {
                        if self.inner.wakeup.wait_until(&mut settings, deadline).timed_out() {
                            break;
                        }
                    }
                    None => self.inner.wakeup.wait(&mut settings),
                }
            }

            if !settings.exited {
                return false;
            }
        }

        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!("Scheduler thread '{}' panicked", self.inner.name);
            }
        }
        true
    }
}

impl Drop for SimpleScheduler {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        // the loop checks the flag under this lock before it waits
        let _settings = self.inner.settings.lock();
        self.inner.wakeup.notify_all();
    }
}
