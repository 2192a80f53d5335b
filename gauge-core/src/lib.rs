//! gauge-core: Shared real-time assessment machinery for training conditions
//!
//! Every rule evaluator ("condition") in a simulation-based training session
//! consumes simulation state and produces an assessment level. This crate
//! provides the generic parts each evaluator reuses:
//!
//! - **Scheduling** - [`TimerScheduler`] for cancellable one-shot and fixed-rate callbacks
//! - **Assessment** - [`AssessmentStateMachine`] with delayed auto-reset to a default level
//! - **Violators** - [`ViolatorRegistry`] with staleness sweeps and dependency cascade
//! - **Scoring** - [`ScorerTable`] of count, duration and completion-time [`Scorer`]s
//! - **Composition** - [`ConditionCore`] wiring the above per evaluator instance
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gauge_core::{
//!     AssessmentLevel, ConditionCore, ConditionListener, ConditionReport, EntityId,
//!     GaugeConfig, StaticTeamRoster,
//! };
//!
//! struct Host;
//!
//! impl ConditionListener for Host {
//!     fn condition_assessment_created(&self, report: &ConditionReport) {
//!         println!("{} -> {}", report.condition_id, report.assessment.level);
//!     }
//!     fn condition_completed(&self, _report: &ConditionReport) {}
//! }
//!
//! # async fn example() -> gauge_core::Result<()> {
//! let roster = StaticTeamRoster::new().with_member(EntityId::new(1, 1, 7), "alpha-1");
//! let condition = ConditionCore::new("stay in sector", GaugeConfig::default(), Arc::new(roster))?;
//! condition.initialize(Arc::new(Host));
//! condition.start();
//!
//! condition.add_violator(EntityId::new(1, 1, 7), &[]);
//! condition.update_assessment_with_rollup(AssessmentLevel::BelowExpectation, true);
//!
//! condition.stop();
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── ConditionCore ────────────────────────┐
//! │  ┌──────────────────┐ ┌──────────────┐ ┌───────────────────┐  │
//! │  │ AssessmentState  │ │  Violator    │ │   ScorerTable     │  │
//! │  │ Machine (reset)  │ │  Registry    │ │                   │  │
//! │  └────────┬─────────┘ └──────┬───────┘ └───────────────────┘  │
//! │           └────────┬─────────┘                                │
//! │              TimerScheduler (tokio)                           │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod assessment;
pub mod clock;
pub mod condition;
pub mod config;
pub mod entity;
pub mod error;
pub mod report;
pub mod scheduler;
pub mod scoring;
pub mod violators;

// Re-export key types for convenience
pub use assessment::{AssessmentLevel, AssessmentSignal, AssessmentSnapshot, AssessmentStateMachine};
pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use condition::{ConditionCore, ConditionListener};
pub use config::{AssessmentConfig, GaugeConfig, ViolatorConfig};
pub use entity::{EntityId, SessionMember, StaticTeamRoster, TeamMemberRef, TeamMemberResolver};
pub use error::{
    AssessmentError, ConfigError, GaugeError, Result, SchedulerError, ScoringError,
};
pub use report::{ConditionReport, InMemoryScoreSink, RawScoreRecord, ScoreOverride, ScoreSink};
pub use scheduler::{TaskHandle, TimerScheduler};
pub use scoring::{Comparison, ScoreRule, Scorer, ScorerKind, ScorerTable, Units};
pub use violators::{RemovalListener, SweepOutcome, ViolatorRegistry};
