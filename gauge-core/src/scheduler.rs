//! Deferred and periodic task scheduling.
//!
//! The [`TimerScheduler`] runs plain closures on the tokio runtime after a
//! delay or at a fixed rate. Every scheduled task owns a child
//! [`CancellationToken`] of the scheduler's current root token, so tasks can
//! be cancelled one at a time through their [`TaskHandle`] or all at once
//! through [`TimerScheduler::cancel_all`].
//!
//! Cancellation is best-effort: a task whose timer has already elapsed and
//! which is being polled may still run once after `cancel()` returns.
//! Callbacks must therefore be idempotent.
//!
//! A panic inside a task is caught at the task boundary and logged; it never
//! takes down the scheduler or other tasks.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::error::SchedulerError;

/// Handle to a single scheduled task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    token: CancellationToken,
}

impl TaskHandle {
    /// Stop the task from firing again.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the task will not fire again: it was cancelled, individually
    /// or via its scheduler, or it was a one-shot task that already ran.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Schedules one-shot and fixed-rate callbacks on a tokio runtime.
///
/// Cloning is cheap; clones share the same root token, so `cancel_all` on
/// any clone cancels tasks scheduled through every clone.
#[derive(Clone)]
pub struct TimerScheduler {
    name: Arc<str>,
    handle: Handle,
    root: Arc<Mutex<CancellationToken>>,
}

impl TimerScheduler {
    /// Create a scheduler on the current tokio runtime.
    pub fn new(name: impl Into<String>) -> Result<Self, SchedulerError> {
        let name = name.into();
        let handle = Handle::try_current().map_err(|_| SchedulerError::NoRuntime(name.clone()))?;
        Ok(Self::with_handle(name, handle))
    }

    /// Create a scheduler on an explicit runtime handle.
    pub fn with_handle(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            name: Arc::from(name.into()),
            handle,
            root: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// Name used in log output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `task` once after `delay`.
    pub fn schedule_once<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.child_token();
        let task_token = token.clone();
        let name = Arc::clone(&self.name);
        let deadline = Instant::now() + delay;

        trace!(scheduler = %name, delay_ms = delay.as_millis() as u64, "Scheduling one-shot task");

        self.handle.spawn(async move {
            tokio::select! {
                biased;

                _ = task_token.cancelled() => {
                    trace!(scheduler = %name, "One-shot task cancelled before firing");
                }

                _ = tokio::time::sleep_until(deadline) => {
                    run_guarded(&name, task);
                    task_token.cancel();
                }
            }
        });

        TaskHandle { token }
    }

    /// Run `task` every `period`, starting after `initial_delay`.
    ///
    /// Missed ticks are caught up, keeping a fixed rate rather than a fixed
    /// delay between runs.
    pub fn schedule_fixed_rate<F>(
        &self,
        initial_delay: Duration,
        period: Duration,
        mut task: F,
    ) -> Result<TaskHandle, SchedulerError>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }

        let token = self.child_token();
        let task_token = token.clone();
        let name = Arc::clone(&self.name);

        debug!(
            scheduler = %name,
            initial_delay_ms = initial_delay.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "Scheduling fixed-rate task"
        );

        let start = Instant::now() + initial_delay;

        self.handle.spawn(async move {
            let mut ticks = interval_at(start, period);
            loop {
                tokio::select! {
                    biased;

                    _ = task_token.cancelled() => {
                        trace!(scheduler = %name, "Fixed-rate task cancelled");
                        break;
                    }

                    _ = ticks.tick() => {
                        run_guarded(&name, &mut task);
                    }
                }
            }
        });

        Ok(TaskHandle { token })
    }

    /// Cancel every task scheduled so far.
    ///
    /// The scheduler stays usable; tasks scheduled afterwards are unaffected.
    pub fn cancel_all(&self) {
        let mut root = self.root.lock().unwrap_or_else(|e| e.into_inner());
        root.cancel();
        *root = CancellationToken::new();
        debug!(scheduler = %self.name, "Cancelled all scheduled tasks");
    }

    fn child_token(&self) -> CancellationToken {
        self.root
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .child_token()
    }
}

impl std::fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("name", &self.name)
            .finish()
    }
}

/// Run a task, logging and suppressing any panic.
fn run_guarded<F: FnOnce()>(scheduler: &str, task: F) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(scheduler = %scheduler, panic = %message, "Scheduled task panicked");
    }
}
