//! Reportable score records and the sink they are handed to.
//!
//! The core produces [`RawScoreRecord`]s and [`ConditionReport`]s but never
//! persists or transmits them; hosts implement [`ScoreSink`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::{AssessmentLevel, AssessmentSnapshot};
use crate::error::Result;

/// Label of records synthesized from an observer-supplied assessment.
pub const OVERRIDE_LABEL: &str = "OC Assessment";
/// Units of records synthesized from an observer-supplied assessment.
pub const OVERRIDE_UNITS: &str = "manual assessment";

/// One `(label, raw value, units, assessment, audience)` score tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawScoreRecord {
    pub label: String,
    pub raw_value: String,
    pub units: String,
    pub assessment: AssessmentLevel,
    /// Usernames the score is attributed to.
    pub audience: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observer_comment: Option<String>,
}

impl RawScoreRecord {
    pub fn new(
        label: impl Into<String>,
        raw_value: impl Into<String>,
        units: impl Into<String>,
        assessment: AssessmentLevel,
        audience: BTreeSet<String>,
    ) -> Self {
        Self {
            label: label.into(),
            raw_value: raw_value.into(),
            units: units.into(),
            assessment,
            audience,
            evaluator: None,
            observer_comment: None,
        }
    }

    /// Copy evaluator and comment from an observer override.
    #[must_use]
    pub fn with_override(mut self, score_override: &ScoreOverride) -> Self {
        self.evaluator = score_override.evaluator.clone();
        self.observer_comment = score_override.comment.clone();
        self
    }
}

/// An assessment entered by a human observer for this condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreOverride {
    pub assessment: AssessmentLevel,
    pub evaluator: Option<String>,
    pub comment: Option<String>,
}

impl ScoreOverride {
    pub fn new(assessment: AssessmentLevel) -> Self {
        Self {
            assessment,
            evaluator: None,
            comment: None,
        }
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: impl Into<String>) -> Self {
        self.evaluator = Some(evaluator.into());
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Snapshot of a condition handed to the host callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionReport {
    pub condition_id: Uuid,
    pub assessment: AssessmentSnapshot,
    /// Role names of the current violators.
    pub violators: BTreeSet<String>,
    pub completed: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConditionReport {
    /// Comma separated violator names for explanations.
    pub fn violator_list(&self) -> String {
        self.violators
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Destination for finalized score records.
#[async_trait]
pub trait ScoreSink: Send + Sync {
    /// Store records produced for one condition.
    async fn append(&self, condition_id: Uuid, records: Vec<RawScoreRecord>) -> Result<()>;
}

/// In-memory sink for hosts without persistence and for tests.
#[derive(Debug, Default)]
pub struct InMemoryScoreSink {
    records: std::sync::RwLock<Vec<(Uuid, RawScoreRecord)>>,
}

impl InMemoryScoreSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records stored for `condition_id`, in append order.
    pub fn records_for(&self, condition_id: Uuid) -> Vec<RawScoreRecord> {
        self.records
            .read()
            .map(|records| {
                records
                    .iter()
                    .filter(|(id, _)| *id == condition_id)
                    .map(|(_, record)| record.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All records as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let records: Vec<RawScoreRecord> = self
            .records
            .read()
            .map(|r| r.iter().map(|(_, record)| record.clone()).collect())
            .unwrap_or_default();
        serde_json::to_string(&records)
    }
}

#[async_trait]
impl ScoreSink for InMemoryScoreSink {
    async fn append(&self, condition_id: Uuid, records: Vec<RawScoreRecord>) -> Result<()> {
        let mut stored = self.records.write().unwrap_or_else(|e| e.into_inner());
        stored.extend(records.into_iter().map(|record| (condition_id, record)));
        Ok(())
    }
}
