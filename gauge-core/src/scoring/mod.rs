//! Scoring accumulators.
//!
//! A [`Scorer`] accumulates a count, a violation duration or a completion
//! time and maps it to an assessment through ordered [`ScoreRule`]s. A
//! [`ScorerTable`] holds every scorer of a condition, keyed by kind and team
//! member.

mod scorer;
mod table;

pub use scorer::{ACTIVELY_VIOLATING, Comparison, ScoreRule, Scorer, ScorerKind, Units};
pub use table::ScorerTable;
