//! Sync job record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of one logical sync.
///
/// State transitions:
/// - Pending -> Running                  (workflow start)
/// - Running -> Retry -> Running         (transient failure, retried after backoff)
/// - Running -> Done                     (all steps completed)
/// - Running | Retry -> Failed           (fatal error, budget exhausted, cancellation)
///
/// `Retry` is advisory: the workflow resumes the same step afterwards.
/// Writing the current state again is allowed so replays stay idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncJobState {
    Pending,
    Running,
    Retry,
    Done,
    Failed,
}

impl SyncJobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncJobState::Done | SyncJobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncJobState::Pending => "pending",
            SyncJobState::Running => "running",
            SyncJobState::Retry => "retry",
            SyncJobState::Done => "done",
            SyncJobState::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: SyncJobState) -> bool {
        use SyncJobState::*;

        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Retry)
                | (Running, Done)
                | (Running, Failed)
                | (Retry, Running)
                | (Retry, Failed)
        )
    }
}

impl std::fmt::Display for SyncJobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sync job '{lock_key}' cannot move from {from} to {to}")]
pub struct TransitionError {
    pub lock_key: String,
    pub from: SyncJobState,
    pub to: SyncJobState,
}

/// One row per logical sync, keyed by `lock_key`.
///
/// Rows are created by callers before a workflow starts. The orchestrator only
/// ever mutates an existing row through `apply_mark`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub lock_key: String,
    pub state: SyncJobState,

    /// Incremented on every state write.
    pub attempt_count: u32,

    pub last_error: Option<String>,
    pub job_type: String,
    pub trigger_reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncJob {
    pub fn new(
        lock_key: impl Into<String>,
        job_type: impl Into<String>,
        trigger_reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            lock_key: lock_key.into(),
            state: SyncJobState::Pending,
            attempt_count: 0,
            last_error: None,
            job_type: job_type.into(),
            trigger_reason: trigger_reason.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Convenience constructor for the bootstrap job type.
    pub fn bootstrap(lock_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(lock_key, "bootstrap", "bootstrap", now)
    }

    /// Apply one state write. The row is left untouched on error.
    pub fn apply_mark(
        &mut self,
        state: SyncJobState,
        last_error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(state) {
            return Err(TransitionError {
                lock_key: self.lock_key.clone(),
                from: self.state,
                to: state,
            });
        }
        self.state = state;
        self.last_error = last_error;
        self.attempt_count += 1;
        self.updated_at = now;
        Ok(())
    }
}

/// Serializable view for the status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJobStatusView {
    pub lock_key: String,
    pub state: SyncJobState,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub job_type: String,
    pub trigger_reason: String,
}

impl From<&SyncJob> for SyncJobStatusView {
    fn from(job: &SyncJob) -> Self {
        Self {
            lock_key: job.lock_key.clone(),
            state: job.state,
            attempt_count: job.attempt_count,
            last_error: job.last_error.clone(),
            job_type: job.job_type.clone(),
            trigger_reason: job.trigger_reason.clone(),
        }
    }
}
