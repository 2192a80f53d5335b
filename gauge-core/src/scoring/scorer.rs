//! Individual scorers and their evaluation rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::assessment::AssessmentLevel;
use crate::error::ScoringError;

/// Name of the synthetic duration scorer used to track active violations.
pub const ACTIVELY_VIOLATING: &str = "Actively Violating";

/// What a scorer accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    /// Number of violation events.
    Count,
    /// Total time spent violating (start/stop intervals).
    ViolationTime,
    /// Time from condition start to completion.
    CompletionTime,
}

impl ScorerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::ViolationTime => "violation_time",
            Self::CompletionTime => "completion_time",
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Units a raw score is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    Count,
    HhMmSs,
    Milliseconds,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::HhMmSs => "hh:mm:ss",
            Self::Milliseconds => "ms",
        }
    }

    /// Render a raw value in these units.
    pub fn format(&self, value: u64) -> String {
        match self {
            Self::Count | Self::Milliseconds => value.to_string(),
            Self::HhMmSs => {
                let secs = value / 1000;
                format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
            }
        }
    }
}

/// Comparison applied between a raw value and a rule threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    LessThan,
    LessThanOrEqual,
    Equal,
    GreaterThanOrEqual,
    GreaterThan,
}

impl Comparison {
    fn symbol(&self) -> &'static str {
        match self {
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::Equal => "==",
            Self::GreaterThanOrEqual => ">=",
            Self::GreaterThan => ">",
        }
    }
}

/// Maps a range of raw values to an assessment level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRule {
    pub comparison: Comparison,
    pub threshold: u64,
    pub assessment: AssessmentLevel,
}

impl ScoreRule {
    pub fn new(comparison: Comparison, threshold: u64, assessment: AssessmentLevel) -> Self {
        Self {
            comparison,
            threshold,
            assessment,
        }
    }

    pub fn matches(&self, value: u64) -> bool {
        match self.comparison {
            Comparison::LessThan => value < self.threshold,
            Comparison::LessThanOrEqual => value <= self.threshold,
            Comparison::Equal => value == self.threshold,
            Comparison::GreaterThanOrEqual => value >= self.threshold,
            Comparison::GreaterThan => value > self.threshold,
        }
    }
}

impl fmt::Display for ScoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {}",
            self.comparison.symbol(),
            self.threshold,
            self.assessment
        )
    }
}

/// Accumulated scorer state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Accumulation {
    Count {
        count: u64,
    },
    ViolationTime {
        total_ms: u64,
        started_at_ms: Option<u64>,
    },
    CompletionTime {
        elapsed_ms: Option<u64>,
    },
}

impl Accumulation {
    fn empty(kind: ScorerKind) -> Self {
        match kind {
            ScorerKind::Count => Self::Count { count: 0 },
            ScorerKind::ViolationTime => Self::ViolationTime {
                total_ms: 0,
                started_at_ms: None,
            },
            ScorerKind::CompletionTime => Self::CompletionTime { elapsed_ms: None },
        }
    }
}

/// A single count, duration or completion-time accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scorer {
    name: String,
    units: Units,
    rules: Vec<ScoreRule>,
    state: Accumulation,
    internal_only: bool,
}

impl Scorer {
    /// Create a scorer, rejecting duplicate rules.
    pub fn new(
        kind: ScorerKind,
        name: impl Into<String>,
        units: Units,
        rules: Vec<ScoreRule>,
    ) -> Result<Self, ScoringError> {
        let name = name.into();
        for (i, rule) in rules.iter().enumerate() {
            if rules[i + 1..].contains(rule) {
                return Err(ScoringError::DuplicateRule {
                    scorer: name,
                    rule: rule.to_string(),
                });
            }
        }

        Ok(Self {
            name,
            units,
            rules,
            state: Accumulation::empty(kind),
            internal_only: false,
        })
    }

    pub fn count(name: impl Into<String>, rules: Vec<ScoreRule>) -> Result<Self, ScoringError> {
        Self::new(ScorerKind::Count, name, Units::Count, rules)
    }

    pub fn violation_time(
        name: impl Into<String>,
        units: Units,
        rules: Vec<ScoreRule>,
    ) -> Result<Self, ScoringError> {
        Self::new(ScorerKind::ViolationTime, name, units, rules)
    }

    pub fn completion_time(
        name: impl Into<String>,
        units: Units,
        rules: Vec<ScoreRule>,
    ) -> Result<Self, ScoringError> {
        Self::new(ScorerKind::CompletionTime, name, units, rules)
    }

    /// Synthetic duration scorer excluded from reported scores.
    pub(crate) fn actively_violating() -> Self {
        Self {
            name: ACTIVELY_VIOLATING.to_string(),
            units: Units::HhMmSs,
            rules: Vec::new(),
            state: Accumulation::empty(ScorerKind::ViolationTime),
            internal_only: true,
        }
    }

    pub fn kind(&self) -> ScorerKind {
        match self.state {
            Accumulation::Count { .. } => ScorerKind::Count,
            Accumulation::ViolationTime { .. } => ScorerKind::ViolationTime,
            Accumulation::CompletionTime { .. } => ScorerKind::CompletionTime,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> Units {
        self.units
    }

    pub fn rules(&self) -> &[ScoreRule] {
        &self.rules
    }

    pub fn is_internal_only(&self) -> bool {
        self.internal_only
    }

    pub fn set_internal_only(&mut self, internal_only: bool) {
        self.internal_only = internal_only;
    }

    /// Fresh copy with the same configuration and no accumulated state.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            units: self.units,
            rules: self.rules.clone(),
            state: Accumulation::empty(self.kind()),
            internal_only: self.internal_only,
        }
    }

    /// Add `events` to a count scorer. Other kinds ignore this.
    pub fn add(&mut self, events: u64) {
        if let Accumulation::Count { count } = &mut self.state {
            *count += events;
        }
    }

    /// Open a violation interval. Returns false if one was already open.
    pub fn start(&mut self, now_ms: u64) -> bool {
        match &mut self.state {
            Accumulation::ViolationTime { started_at_ms, .. } if started_at_ms.is_none() => {
                *started_at_ms = Some(now_ms);
                true
            }
            _ => false,
        }
    }

    /// Close the open violation interval, if any.
    pub fn stop(&mut self, now_ms: u64) {
        if let Accumulation::ViolationTime {
            total_ms,
            started_at_ms,
        } = &mut self.state
        {
            if let Some(started) = started_at_ms.take() {
                *total_ms += now_ms.saturating_sub(started);
            }
        }
    }

    /// Whether a violation interval is open.
    pub fn has_started(&self) -> bool {
        matches!(
            self.state,
            Accumulation::ViolationTime {
                started_at_ms: Some(_),
                ..
            }
        )
    }

    /// Record elapsed start-to-completion time.
    pub fn set_time_to_complete(&mut self, elapsed_ms: u64) {
        if let Accumulation::CompletionTime { elapsed_ms: slot } = &mut self.state {
            *slot = Some(elapsed_ms);
        }
    }

    /// Close any open interval so the raw value is final.
    pub fn close_out(&mut self, now_ms: u64) {
        self.stop(now_ms);
    }

    /// Current raw value, including a still-open interval.
    pub fn raw_value(&self, now_ms: u64) -> u64 {
        match self.state {
            Accumulation::Count { count } => count,
            Accumulation::ViolationTime {
                total_ms,
                started_at_ms,
            } => total_ms + started_at_ms.map_or(0, |s| now_ms.saturating_sub(s)),
            Accumulation::CompletionTime { elapsed_ms } => elapsed_ms.unwrap_or(0),
        }
    }

    /// Raw value rendered in this scorer's units.
    pub fn raw_score(&self, now_ms: u64) -> String {
        self.units.format(self.raw_value(now_ms))
    }

    /// First matching rule's assessment, or `Unknown`.
    ///
    /// A completion-time scorer that never completed is always `Unknown`.
    pub fn assessment(&self, now_ms: u64) -> AssessmentLevel {
        if let Accumulation::CompletionTime { elapsed_ms: None } = self.state {
            return AssessmentLevel::Unknown;
        }
        let value = self.raw_value(now_ms);
        self.rules
            .iter()
            .find(|rule| rule.matches(value))
            .map_or(AssessmentLevel::Unknown, |rule| rule.assessment)
    }
}

impl fmt::Display for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.name)?;
        if self.internal_only {
            f.write_str(" (internal)")?;
        }
        Ok(())
    }
}
