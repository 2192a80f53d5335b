//! Condition composition root.
//!
//! A [`ConditionCore`] owns one assessment state machine, one violator
//! registry and one scorer table for a single rule evaluator, and exposes the
//! lifecycle (`initialize`, `start`, `stop`) plus the inbound operations
//! concrete evaluators call while processing simulation state.
//!
//! ```text
//!                 ┌──────────────────── ConditionCore ───────────────────┐
//!   evaluator ──► │ add_violator ─────► ViolatorRegistry ── sweep ──┐    │
//!                 │ scoring_event_* ──► ScorerTable                 │    │
//!                 │ update_assessment ► AssessmentStateMachine ◄────┘    │
//!                 │                        │ publish / reset             │
//!                 └────────────────────────┼─────────────────────────────┘
//!                                          ▼
//!                           ConditionListener (host)
//! ```

use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assessment::{AssessmentLevel, AssessmentSnapshot, AssessmentStateMachine};
use crate::clock::{MonotonicClock, SharedClock};
use crate::config::GaugeConfig;
use crate::entity::{EntityId, SessionMember, TeamMemberRef, TeamMemberResolver};
use crate::error::{Result, ScoringError};
use crate::report::{ConditionReport, RawScoreRecord, ScoreOverride, ScoreSink};
use crate::scheduler::{TaskHandle, TimerScheduler};
use crate::scoring::{Scorer, ScorerTable};
use crate::violators::{SweepOutcome, ViolatorRegistry};

/// Host callbacks for a condition.
pub trait ConditionListener: Send + Sync {
    /// The condition's assessment changed or was forced to roll up.
    fn condition_assessment_created(&self, report: &ConditionReport);

    /// The condition completed. Called at most once per run.
    fn condition_completed(&self, report: &ConditionReport);
}

/// Resolves entities to the roles this condition assesses.
///
/// With no assessed roles only the learner counts.
struct AssessedMemberResolver {
    roster: Arc<dyn TeamMemberResolver>,
    assessed: Arc<RwLock<Vec<String>>>,
}

impl TeamMemberResolver for AssessedMemberResolver {
    fn resolve(&self, entity: &EntityId) -> Option<TeamMemberRef> {
        let resolved = self.roster.resolve(entity)?;
        let assessed = self.assessed.read().unwrap_or_else(|e| e.into_inner());

        match resolved {
            TeamMemberRef::Member(name) if assessed.is_empty() => {
                (self.roster.learner_role().as_deref() == Some(name.as_str()))
                    .then_some(TeamMemberRef::Member(name))
            }
            TeamMemberRef::Member(name) => assessed
                .contains(&name)
                .then_some(TeamMemberRef::Member(name)),
            TeamMemberRef::Learner if assessed.is_empty() => Some(TeamMemberRef::Learner),
            _ => None,
        }
    }

    fn learner_role(&self) -> Option<String> {
        self.roster.learner_role()
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    initialized_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    started_ms: Option<u64>,
    completed_at: Option<DateTime<Utc>>,
}

struct Shared {
    id: Uuid,
    name: String,
    config: GaugeConfig,
    clock: SharedClock,
    scheduler: TimerScheduler,
    assessment: AssessmentStateMachine,
    violators: ViolatorRegistry,
    scoring: Mutex<ScorerTable>,
    resolver: Arc<AssessedMemberResolver>,
    listener: RwLock<Option<Arc<dyn ConditionListener>>>,
    lifecycle: Mutex<Lifecycle>,
}

impl Shared {
    fn listener(&self) -> Option<Arc<dyn ConditionListener>> {
        self.listener
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn report_with(&self, assessment: AssessmentSnapshot) -> ConditionReport {
        let lifecycle = lock(&self.lifecycle);
        ConditionReport {
            condition_id: self.id,
            assessment,
            violators: self
                .violators
                .team_member_violators()
                .iter()
                .map(|member| member.display_name().to_string())
                .collect(),
            completed: lifecycle.completed_at.is_some(),
            started_at: lifecycle.started_at,
            completed_at: lifecycle.completed_at,
        }
    }

    fn assessment_created(&self, snapshot: &AssessmentSnapshot) {
        let Some(listener) = self.listener() else {
            debug!(condition_id = %self.id, "Assessment changed before initialize, not published");
            return;
        };
        let report = self.report_with(snapshot.clone());
        listener.condition_assessment_created(&report);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared machinery for one rule evaluator instance.
#[derive(Clone)]
pub struct ConditionCore {
    shared: Arc<Shared>,
}

impl ConditionCore {
    /// Create a condition on the current tokio runtime.
    pub fn new(
        name: impl Into<String>,
        config: GaugeConfig,
        roster: Arc<dyn TeamMemberResolver>,
    ) -> Result<Self> {
        Self::with_clock(name, config, roster, Arc::new(MonotonicClock::new()))
    }

    /// Create a condition reading time from `clock`.
    pub fn with_clock(
        name: impl Into<String>,
        config: GaugeConfig,
        roster: Arc<dyn TeamMemberResolver>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let scheduler = TimerScheduler::new(name.clone())?;

        let resolver = Arc::new(AssessedMemberResolver {
            roster,
            assessed: Arc::new(RwLock::new(Vec::new())),
        });

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let signal_target = weak.clone();
            let assessment = AssessmentStateMachine::new(
                config.assessment.default_level,
                config.assessment.reset_delay(),
                scheduler.clone(),
                Arc::new(move |snapshot: &AssessmentSnapshot| {
                    if let Some(shared) = signal_target.upgrade() {
                        shared.assessment_created(snapshot);
                    }
                }),
            );
            let violators = ViolatorRegistry::new(
                config.violators.clone(),
                Arc::clone(&clock),
                resolver.clone(),
                scheduler.clone(),
            );

            Shared {
                id: Uuid::new_v4(),
                name,
                scoring: Mutex::new(ScorerTable::new(Arc::clone(&clock))),
                config,
                clock,
                scheduler,
                assessment,
                violators,
                resolver,
                listener: RwLock::new(None),
                lifecycle: Mutex::new(Lifecycle::default()),
            }
        });

        debug!(condition_id = %shared.id, name = %shared.name, "Created condition");
        Ok(Self { shared })
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &GaugeConfig {
        &self.shared.config
    }

    /// The assessment state machine, for metric and explanation updates.
    pub fn assessment(&self) -> &AssessmentStateMachine {
        &self.shared.assessment
    }

    pub fn violators(&self) -> &ViolatorRegistry {
        &self.shared.violators
    }

    // --- Lifecycle ---

    /// Attach the host callbacks.
    pub fn initialize(&self, listener: Arc<dyn ConditionListener>) {
        *self
            .shared
            .listener
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(listener);
        lock(&self.shared.lifecycle).initialized_at = Some(Utc::now());
        info!(condition_id = %self.shared.id, name = %self.shared.name, "Condition initialized");
    }

    /// Begin a run. Clears any previous completion.
    pub fn start(&self) {
        {
            let mut lifecycle = lock(&self.shared.lifecycle);
            lifecycle.started_at = Some(Utc::now());
            lifecycle.started_ms = Some(self.shared.clock.now_ms());
            lifecycle.completed_at = None;
        }
        info!(condition_id = %self.shared.id, name = %self.shared.name, "Condition started");
    }

    /// End the run, cancelling every scheduled task.
    ///
    /// A task already executing is not interrupted.
    pub fn stop(&self) {
        self.shared.assessment.cancel_reset();
        self.shared.violators.stop();
        self.shared.scheduler.cancel_all();
        info!(condition_id = %self.shared.id, name = %self.shared.name, "Condition stopped");
    }

    pub fn initialized_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.shared.lifecycle).initialized_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.shared.lifecycle).started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.shared.lifecycle).completed_at
    }

    pub fn has_completed(&self) -> bool {
        lock(&self.shared.lifecycle).completed_at.is_some()
    }

    /// Mark the condition complete and notify the host once.
    ///
    /// Returns false, logging a warning, if it had already completed.
    pub fn condition_completed(&self) -> bool {
        let elapsed = {
            let mut lifecycle = lock(&self.shared.lifecycle);
            if lifecycle.completed_at.is_some() {
                warn!(condition_id = %self.shared.id, "Condition completed more than once");
                return false;
            }
            lifecycle.completed_at = Some(Utc::now());
            let now = self.shared.clock.now_ms();
            (lifecycle.started_ms.unwrap_or(now), now)
        };

        lock(&self.shared.scoring).finalize_completion(elapsed.0, elapsed.1);
        debug!(
            condition_id = %self.shared.id,
            elapsed_ms = elapsed.1.saturating_sub(elapsed.0),
            "Condition completed"
        );

        if let Some(listener) = self.shared.listener() {
            listener.condition_completed(&self.report());
        }
        true
    }

    // --- Team members ---

    /// Set the roles this condition assesses and prepare per-member scorers.
    pub fn bind_team_members(&self, members: Vec<String>) {
        lock(&self.shared.scoring).bind_team_members(&members);
        debug!(condition_id = %self.shared.id, members = ?members, "Bound team members");
        *self
            .shared
            .resolver
            .assessed
            .write()
            .unwrap_or_else(|e| e.into_inner()) = members;
    }

    pub fn assessed_members(&self) -> Vec<String> {
        self.shared
            .resolver
            .assessed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The assessed role `entity` plays, if any.
    pub fn is_assessed_member(&self, entity: &EntityId) -> Option<TeamMemberRef> {
        self.shared.resolver.resolve(entity)
    }

    // --- Violators ---

    pub fn add_violator(&self, entity: EntityId, dependencies: &[EntityId]) {
        self.shared.violators.add_violator(entity, dependencies);
    }

    pub fn remove_violator(&self, entity: &EntityId) -> bool {
        self.shared.violators.remove_violator(entity)
    }

    pub fn remove_all_violators(&self) {
        self.shared.violators.remove_all();
    }

    pub fn violator_count(&self) -> usize {
        self.shared.violators.len()
    }

    /// Record that `entity` reported state, keeping it fresh as a dependency.
    pub fn observe_entity(&self, entity: EntityId) {
        self.shared.violators.observe(entity);
    }

    /// Register the handler run after a sweep removed violators.
    pub fn on_violators_removed<F>(&self, handler: F)
    where
        F: Fn(&SweepOutcome) + Send + Sync + 'static,
    {
        self.shared.violators.set_removal_listener(Arc::new(handler));
    }

    // --- Scoring ---

    pub fn add_scorer(&self, scorer: Scorer, member: TeamMemberRef) -> Result<()> {
        lock(&self.shared.scoring).add_scorer(scorer, member)?;
        Ok(())
    }

    pub fn add_real_time_scorer(&self, scorer: Scorer) -> Result<()> {
        lock(&self.shared.scoring).add_real_time_scorer(scorer)?;
        Ok(())
    }

    pub fn scoring_event_started(
        &self,
        events: u32,
        members: &[TeamMemberRef],
    ) -> std::result::Result<(), ScoringError> {
        lock(&self.shared.scoring).start_event(events, members)
    }

    pub fn scoring_event_ended(&self, members: &[TeamMemberRef]) {
        lock(&self.shared.scoring).end_event(members);
    }

    pub fn is_scoring_event_active(&self, members: &[TeamMemberRef]) -> bool {
        lock(&self.shared.scoring).is_active(members)
    }

    pub fn authored_real_time_assessment(&self) -> Option<AssessmentLevel> {
        lock(&self.shared.scoring).authored_real_time_assessment()
    }

    /// Build score records addressed to `session_members`.
    pub fn collect_scores(
        &self,
        session_members: &[SessionMember],
        score_override: Option<&ScoreOverride>,
    ) -> Vec<RawScoreRecord> {
        let assessed = self.assessed_members();
        lock(&self.shared.scoring).collect_scores(session_members, &assessed, score_override)
    }

    /// Collect score records and hand them to `sink`. Returns the count.
    pub async fn report_scores(
        &self,
        sink: &dyn ScoreSink,
        session_members: &[SessionMember],
        score_override: Option<&ScoreOverride>,
    ) -> Result<usize> {
        let records = self.collect_scores(session_members, score_override);
        let count = records.len();
        sink.append(self.shared.id, records).await?;
        debug!(condition_id = %self.shared.id, records = count, "Reported scores");
        Ok(count)
    }

    // --- Assessment ---

    /// Move to `level`. Does not notify the host.
    pub fn update_assessment(&self, level: AssessmentLevel) -> bool {
        self.shared.assessment.update(level)
    }

    /// Move to `level`, notifying the host when `force_rollup` is set.
    pub fn update_assessment_with_rollup(
        &self,
        level: AssessmentLevel,
        force_rollup: bool,
    ) -> bool {
        self.shared.assessment.update_with_rollup(level, force_rollup)
    }

    /// Notify the host of the current assessment.
    pub fn send_assessment_event(&self) {
        self.shared.assessment.publish();
    }

    /// Run `task` after `delay` unless the condition stops first.
    pub fn schedule_reassessment<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.scheduler.schedule_once(delay, task)
    }

    /// Snapshot for the host.
    pub fn report(&self) -> ConditionReport {
        self.shared.report_with(self.shared.assessment.snapshot())
    }
}

impl std::fmt::Debug for ConditionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionCore")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("assessment", &self.shared.assessment.level())
            .field("violators", &self.shared.violators.len())
            .field("completed", &self.has_completed())
            .finish()
    }
}
