//! Attempt and Decision models for execution history.
//!
//! Together they answer "why did this sync end up failed / slow": every failed
//! step execution leaves an `AttemptRecord`, and every choice the decider made
//! about it leaves a `DecisionRecord`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ErrorKind;
use super::ids::AttemptId;
use super::steps::StepName;

/// One failed execution of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_id: AttemptId,
    pub step: StepName,
    pub kind: ErrorKind,
    pub message: String,
    pub failed_at: DateTime<Utc>,
}

/// A decision made after a failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub step: StepName,

    /// The attempt that triggered this decision.
    pub trigger: AttemptId,

    /// Examples: "retry_policy", "rate_limit", "fatal_error"
    pub policy: String,

    /// Examples: "schedule_retry", "mark_failed"
    pub decision: String,

    pub context: Option<serde_json::Value>,
    pub decided_at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(
        step: StepName,
        trigger: AttemptId,
        policy: impl Into<String>,
        decision: impl Into<String>,
        context: Option<serde_json::Value>,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            step,
            trigger,
            policy: policy.into(),
            decision: decision.into(),
            context,
            decided_at,
        }
    }
}
