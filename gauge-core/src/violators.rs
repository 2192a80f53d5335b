//! Violator tracking with staleness eviction.
//!
//! The [`ViolatorRegistry`] records which entities are currently violating a
//! condition and when they were last seen doing so. Simulations never say
//! that an entity went away, so absence of updates is the removal signal: a
//! periodic sweep evicts violators not refreshed within the staleness window.
//!
//! ## Dependency cascade
//!
//! A violation may depend on other entities (A violates by aiming at B).
//! When a dependency goes stale, every violator depending on it becomes a
//! removal candidate. A candidate that also depends on at least one fresh
//! entity survives.
//!
//! ```text
//! sweep()
//!   ├─ phase 1: evict violators older than the window        → removed
//!   ├─ phase 2: for each dependency
//!   │     stale (old, unknown, or just removed) → dependents become candidates,
//!   │                                             edge dropped
//!   │     fresh                                 → dependents persist
//!   ├─ candidates - persistent                               → removed
//!   ├─ prune removed violators from remaining edges
//!   ├─ forget stale last-seen times of unreferenced entities
//!   └─ notify listener (only if something was removed)
//! ```
//!
//! ## Lock order
//!
//! `violators` → `dependencies` → `metadata`. Any path taking more than one
//! of these locks acquires them in this order.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use tracing::{debug, info, trace, warn};

use crate::clock::SharedClock;
use crate::config::ViolatorConfig;
use crate::entity::{EntityId, TeamMemberRef, TeamMemberResolver};
use crate::scheduler::{TaskHandle, TimerScheduler};

/// Result of a staleness sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Entities evicted from the registry.
    pub removed_entities: BTreeSet<EntityId>,
    /// Evicted entities that resolve to a team member.
    pub removed_members: BTreeSet<TeamMemberRef>,
}

impl SweepOutcome {
    pub fn is_empty(&self) -> bool {
        self.removed_entities.is_empty()
    }
}

/// Called after a sweep that removed at least one violator.
pub type RemovalListener = Arc<dyn Fn(&SweepOutcome) + Send + Sync>;

struct Shared {
    violators: Mutex<HashMap<EntityId, u64>>,
    dependencies: Mutex<HashMap<EntityId, HashSet<EntityId>>>,
    metadata: Mutex<HashMap<EntityId, u64>>,
    clock: SharedClock,
    config: ViolatorConfig,
    resolver: Arc<dyn TeamMemberResolver>,
    scheduler: TimerScheduler,
    sweep_task: Mutex<Option<TaskHandle>>,
    listener: RwLock<Option<RemovalListener>>,
}

/// Tracks active violators, their dependencies and last-seen times.
#[derive(Clone)]
pub struct ViolatorRegistry {
    shared: Arc<Shared>,
}

impl ViolatorRegistry {
    pub fn new(
        config: ViolatorConfig,
        clock: SharedClock,
        resolver: Arc<dyn TeamMemberResolver>,
        scheduler: TimerScheduler,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                violators: Mutex::new(HashMap::new()),
                dependencies: Mutex::new(HashMap::new()),
                metadata: Mutex::new(HashMap::new()),
                clock,
                config,
                resolver,
                scheduler,
                sweep_task: Mutex::new(None),
                listener: RwLock::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ViolatorConfig {
        &self.shared.config
    }

    /// Register the callback notified of sweep removals.
    pub fn set_removal_listener(&self, listener: RemovalListener) {
        *self
            .shared
            .listener
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    /// Mark `entity` as violating now, depending on `dependencies`.
    ///
    /// Refreshes an existing violator. Dependencies are recorded as seen the
    /// first time they are referenced; later references do not refresh them.
    /// Starts the staleness sweep if it is not running.
    pub fn add_violator(&self, entity: EntityId, dependencies: &[EntityId]) {
        let now = self.shared.clock.now_ms();
        {
            let mut violators = lock(&self.shared.violators);
            violators.insert(entity, now);

            let mut edges = lock(&self.shared.dependencies);
            for dependency in dependencies {
                edges.entry(*dependency).or_default().insert(entity);
            }

            let mut metadata = lock(&self.shared.metadata);
            metadata.insert(entity, now);
            for dependency in dependencies {
                metadata.entry(*dependency).or_insert(now);
            }
        }
        trace!(entity = %entity, dependencies = dependencies.len(), "Violator added");

        self.ensure_sweep();
    }

    /// Record that `entity` reported state now without making it a violator.
    pub fn observe(&self, entity: EntityId) {
        let now = self.shared.clock.now_ms();
        lock(&self.shared.metadata).insert(entity, now);
    }

    /// Last time `entity` was seen, if known.
    pub fn last_seen(&self, entity: &EntityId) -> Option<u64> {
        lock(&self.shared.metadata).get(entity).copied()
    }

    /// Returns whether `entity` was a violator.
    pub fn remove_violator(&self, entity: &EntityId) -> bool {
        let removed = lock(&self.shared.violators).remove(entity).is_some();
        if removed {
            trace!(entity = %entity, "Violator removed");
        }
        removed
    }

    pub fn remove_all(&self) {
        lock(&self.shared.violators).clear();
        debug!("Removed all violators");
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.violators).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, entity: &EntityId) -> bool {
        lock(&self.shared.violators).contains_key(entity)
    }

    /// Current violators.
    pub fn violators(&self) -> BTreeSet<EntityId> {
        lock(&self.shared.violators).keys().copied().collect()
    }

    /// Current violators as team members. Unresolved entities map to the
    /// learner.
    pub fn team_member_violators(&self) -> BTreeSet<TeamMemberRef> {
        let violators = lock(&self.shared.violators);
        violators
            .keys()
            .map(|entity| {
                self.shared
                    .resolver
                    .resolve(entity)
                    .unwrap_or(TeamMemberRef::Learner)
            })
            .collect()
    }

    /// Dependents currently recorded for `dependency`.
    pub fn dependents_of(&self, dependency: &EntityId) -> BTreeSet<EntityId> {
        lock(&self.shared.dependencies)
            .get(dependency)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether the periodic sweep is scheduled.
    pub fn is_sweeping(&self) -> bool {
        lock(&self.shared.sweep_task)
            .as_ref()
            .is_some_and(|task| !task.is_cancelled())
    }

    /// Run one staleness pass now and notify the listener of removals.
    pub fn sweep(&self) -> SweepOutcome {
        sweep(&self.shared)
    }

    /// Stop the periodic sweep. A later `add_violator` restarts it.
    pub fn stop(&self) {
        if let Some(task) = lock(&self.shared.sweep_task).take() {
            task.cancel();
            debug!("Stopped violator sweep");
        }
    }

    fn ensure_sweep(&self) {
        let mut slot = lock(&self.shared.sweep_task);
        if slot.as_ref().is_some_and(|task| !task.is_cancelled()) {
            return;
        }

        let interval = self.shared.config.sweep_interval();
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let scheduled = self
            .shared
            .scheduler
            .schedule_fixed_rate(interval, interval, move || {
                if let Some(shared) = weak.upgrade() {
                    sweep(&shared);
                }
            });

        match scheduled {
            Ok(task) => {
                debug!(interval_ms = interval.as_millis() as u64, "Started violator sweep");
                *slot = Some(task);
            }
            Err(e) => warn!(error = %e, "Unable to schedule violator sweep"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn sweep(shared: &Shared) -> SweepOutcome {
    let now = shared.clock.now_ms();
    let window = shared.config.stale_after_ms;
    let is_stale = |last: u64| now.saturating_sub(last) > window;

    let removed: HashSet<EntityId> = {
        let mut violators = lock(&shared.violators);
        let mut edges = lock(&shared.dependencies);
        let mut metadata = lock(&shared.metadata);

        let mut removed = HashSet::new();
        violators.retain(|entity, last| {
            if is_stale(*last) {
                removed.insert(*entity);
                false
            } else {
                true
            }
        });
        for entity in &removed {
            metadata.remove(entity);
        }

        let mut candidates = HashSet::new();
        let mut persistent = HashSet::new();
        edges.retain(|dependency, dependents| {
            let stale = removed.contains(dependency)
                || metadata.get(dependency).is_none_or(|last| is_stale(*last));
            if stale {
                info!(entity = %dependency, "Dependency entity is stale");
                candidates.extend(dependents.iter().copied());
                metadata.remove(dependency);
                false
            } else {
                persistent.extend(dependents.iter().copied());
                true
            }
        });

        for candidate in candidates.difference(&persistent) {
            if violators.remove(candidate).is_some() {
                removed.insert(*candidate);
            }
        }

        if !removed.is_empty() {
            for dependents in edges.values_mut() {
                dependents.retain(|entity| !removed.contains(entity));
            }
        }

        metadata.retain(|entity, last| {
            !is_stale(*last) || violators.contains_key(entity) || edges.contains_key(entity)
        });
        removed
    };

    let outcome = SweepOutcome {
        removed_members: removed
            .iter()
            .filter_map(|entity| shared.resolver.resolve(entity))
            .collect(),
        removed_entities: removed.into_iter().collect(),
    };

    if outcome.is_empty() {
        trace!("Violator sweep removed nothing");
        return outcome;
    }

    info!(
        removed = outcome.removed_entities.len(),
        members = outcome.removed_members.len(),
        "Removed stale violators"
    );
    let listener = shared
        .listener
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    if let Some(listener) = listener {
        listener(&outcome);
    }
    outcome
}

impl std::fmt::Debug for ViolatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViolatorRegistry")
            .field("violators", &self.len())
            .field("config", &self.shared.config)
            .finish()
    }
}
