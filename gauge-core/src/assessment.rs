//! Assessment level state machine with delayed auto-reset.
//!
//! ## State Machine
//!
//! ```text
//!              update(level != current)
//!   ┌─────────┐ ─────────────────────────► ┌──────────┐
//!   │ default │                            │ changed  │ ──┐ update(other level)
//!   └─────────┘ ◄───────────────────────── └──────────┘ ◄─┘ reschedules reset
//!                 reset delay elapsed
//!                 (clears explanation, signals once)
//! ```
//!
//! A plain [`AssessmentStateMachine::update`] never notifies the owner; the
//! owner decides when to publish. A forced rollup and the auto-reset always
//! notify through the signal supplied at construction.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AssessmentError;
use crate::scheduler::{TaskHandle, TimerScheduler};

/// Ordered assessment level. Lower is worse, `Unknown` sorts first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentLevel {
    #[default]
    Unknown,
    BelowExpectation,
    AtExpectation,
    AboveExpectation,
}

impl AssessmentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::BelowExpectation => "below_expectation",
            Self::AtExpectation => "at_expectation",
            Self::AboveExpectation => "above_expectation",
        }
    }

    /// Merge two authored outcomes: the lowest known level wins.
    pub fn lowest_known(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unknown, level) | (level, Self::Unknown) => level,
            (a, b) => a.min(b),
        }
    }
}

impl fmt::Display for AssessmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSnapshot {
    pub level: AssessmentLevel,
    pub explanation: Option<String>,
    pub confidence: f32,
    pub competence: f32,
    pub trend: f32,
    pub priority: Option<u32>,
}

impl AssessmentSnapshot {
    fn initial(level: AssessmentLevel) -> Self {
        Self {
            level,
            explanation: None,
            confidence: MAX_METRIC,
            competence: MAX_METRIC,
            trend: MAX_METRIC,
            priority: None,
        }
    }
}

const MIN_METRIC: f32 = 0.0;
const MIN_TREND: f32 = -1.0;
const MAX_METRIC: f32 = 1.0;

/// Called with the current snapshot whenever the machine publishes.
pub type AssessmentSignal = Arc<dyn Fn(&AssessmentSnapshot) + Send + Sync>;

struct Shared {
    state: Mutex<AssessmentSnapshot>,
    default_level: AssessmentLevel,
    reset_delay: Option<Duration>,
    reset_task: Mutex<Option<TaskHandle>>,
    scheduler: TimerScheduler,
    signal: AssessmentSignal,
}

/// Current/default assessment level plus confidence, competence and trend.
#[derive(Clone)]
pub struct AssessmentStateMachine {
    shared: Arc<Shared>,
}

impl AssessmentStateMachine {
    /// Create a machine starting at `default_level`.
    ///
    /// A `reset_delay` of `None` or zero disables auto-reset.
    pub fn new(
        default_level: AssessmentLevel,
        reset_delay: Option<Duration>,
        scheduler: TimerScheduler,
        signal: AssessmentSignal,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(AssessmentSnapshot::initial(default_level)),
                default_level,
                reset_delay: reset_delay.filter(|d| !d.is_zero()),
                reset_task: Mutex::new(None),
                scheduler,
                signal,
            }),
        }
    }

    pub fn level(&self) -> AssessmentLevel {
        self.lock_state().level
    }

    pub fn default_level(&self) -> AssessmentLevel {
        self.shared.default_level
    }

    pub fn reset_delay(&self) -> Option<Duration> {
        self.shared.reset_delay
    }

    pub fn snapshot(&self) -> AssessmentSnapshot {
        self.lock_state().clone()
    }

    pub fn explanation(&self) -> Option<String> {
        self.lock_state().explanation.clone()
    }

    pub fn set_explanation(&self, explanation: Option<String>) {
        self.lock_state().explanation = explanation;
    }

    /// Move to `level`. Returns whether the level changed.
    ///
    /// Repeating the current level is a no-op and leaves any pending reset
    /// untouched. A change cancels the pending reset and schedules a new one.
    pub fn update(&self, level: AssessmentLevel) -> bool {
        let changed = {
            let mut state = self.lock_state();
            if state.level == level {
                false
            } else {
                debug!(from = %state.level, to = %level, "Assessment level changed");
                state.level = level;
                true
            }
        };

        if changed {
            self.schedule_reset();
        }
        changed
    }

    /// Like [`update`](Self::update), publishing regardless of change when
    /// `force_rollup` is set.
    pub fn update_with_rollup(&self, level: AssessmentLevel, force_rollup: bool) -> bool {
        let changed = self.update(level);
        if force_rollup {
            self.publish();
        }
        changed
    }

    /// Publish the current snapshot to the owner.
    pub fn publish(&self) {
        let snapshot = self.snapshot();
        (self.shared.signal)(&snapshot);
    }

    pub fn update_confidence(&self, value: f32) -> Result<(), AssessmentError> {
        check_range("confidence", value, MIN_METRIC, MAX_METRIC)?;
        self.lock_state().confidence = value;
        Ok(())
    }

    pub fn update_competence(&self, value: f32) -> Result<(), AssessmentError> {
        check_range("competence", value, MIN_METRIC, MAX_METRIC)?;
        self.lock_state().competence = value;
        Ok(())
    }

    pub fn update_trend(&self, value: f32) -> Result<(), AssessmentError> {
        check_range("trend", value, MIN_TREND, MAX_METRIC)?;
        self.lock_state().trend = value;
        Ok(())
    }

    /// Set or clear the priority. Must be at least 1.
    pub fn update_priority(&self, priority: Option<u32>) -> Result<(), AssessmentError> {
        if let Some(p) = priority.filter(|p| *p < 1) {
            return Err(AssessmentError::InvalidPriority(p));
        }
        self.lock_state().priority = priority;
        Ok(())
    }

    /// Whether an auto-reset is pending.
    pub fn reset_pending(&self) -> bool {
        self.lock_reset()
            .as_ref()
            .is_some_and(|task| !task.is_cancelled())
    }

    /// Drop any pending auto-reset.
    pub fn cancel_reset(&self) {
        if let Some(task) = self.lock_reset().take() {
            task.cancel();
        }
    }

    /// Revert to the default level if not already there.
    ///
    /// Clears the explanation and publishes once. Returns whether it reverted.
    pub fn reset_to_default(&self) -> bool {
        reset(&self.shared)
    }

    fn schedule_reset(&self) {
        let Some(delay) = self.shared.reset_delay else {
            return;
        };

        let weak = Arc::downgrade(&self.shared);
        let task = self.shared.scheduler.schedule_once(delay, move || {
            if let Some(shared) = weak.upgrade() {
                reset(&shared);
            }
        });

        if let Some(previous) = self.lock_reset().replace(task) {
            previous.cancel();
        }
        debug!(delay_ms = delay.as_millis() as u64, "Scheduled assessment reset");
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AssessmentSnapshot> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_reset(&self) -> std::sync::MutexGuard<'_, Option<TaskHandle>> {
        self.shared
            .reset_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

fn reset(shared: &Shared) -> bool {
    let snapshot = {
        let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.level == shared.default_level {
            return false;
        }
        info!(
            from = %state.level,
            to = %shared.default_level,
            "Resetting assessment to default"
        );
        state.level = shared.default_level;
        state.explanation = None;
        state.clone()
    };

    (shared.signal)(&snapshot);
    true
}

fn check_range(
    metric: &'static str,
    value: f32,
    min: f32,
    max: f32,
) -> Result<(), AssessmentError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(AssessmentError::OutOfRange {
            metric,
            value,
            min,
            max,
        })
    }
}

impl fmt::Debug for AssessmentStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssessmentStateMachine")
            .field("state", &*self.lock_state())
            .field("default_level", &self.shared.default_level)
            .field("reset_delay", &self.shared.reset_delay)
            .finish()
    }
}
