//! Error types for gauge-core

use thiserror::Error;

/// Top-level error type for gauge-core
#[derive(Error, Debug)]
pub enum GaugeError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Assessment error: {0}")]
    Assessment(#[from] AssessmentError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from the timer scheduler
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("No tokio runtime available for scheduler '{0}'")]
    NoRuntime(String),

    #[error("Fixed-rate period must be greater than zero")]
    ZeroPeriod,
}

/// Errors from the scoring accumulator
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScoringError {
    #[error("A {kind} scorer is already registered for {member}")]
    DuplicateScorer { kind: String, member: String },

    #[error("A real-time {0} scorer is already registered")]
    DuplicateRealTimeScorer(String),

    #[error("Duplicate scoring rule '{rule}' in scorer '{scorer}'")]
    DuplicateRule { scorer: String, rule: String },

    #[error("Number of scoring events must be greater than zero, got {0}")]
    InvalidEventCount(u32),
}

/// Errors from the assessment state machine
#[derive(Error, Debug, PartialEq)]
pub enum AssessmentError {
    #[error("The {metric} value of {value} is not between {min} and {max} (inclusive)")]
    OutOfRange {
        metric: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("The priority must be greater than zero, got {0}")]
    InvalidPriority(u32),
}

/// Errors from loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type alias for gauge-core operations
pub type Result<T> = std::result::Result<T, GaugeError>;
