//! WorkflowInstance - 永続化されるステップログ
//!
//! A bootstrap run is an explicit, persisted list of step entries plus a
//! cursor. Resuming means skipping every entry already marked completed and
//! continuing from the first incomplete one; outputs of completed entries are
//! read back from the log instead of being recomputed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use super::attempt::{AttemptRecord, DecisionRecord};
use super::ids::WorkflowId;
use super::outcome::{CompletionContext, WorkflowResult};
use super::steps::{BootstrapArgs, PullRequestsOutput, StepName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Canceled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkflowStatus::Running)
    }
}

/// One step of the pipeline as recorded in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub step: StepName,
    pub completed: bool,

    /// Completed without running because its input was empty.
    pub skipped: bool,

    pub output: Option<serde_json::Value>,

    /// Failed attempts counted against the transient budget.
    pub attempts: u32,

    /// Rate-limit waits; tracked apart from `attempts`.
    #[serde(default)]
    pub rate_limit_waits: u32,

    pub last_error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepLogEntry {
    pub fn new(step: StepName) -> Self {
        Self {
            step,
            completed: false,
            skipped: false,
            output: None,
            attempts: 0,
            rate_limit_waits: 0,
            last_error: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StepLogError {
    #[error("step {0} is not part of the pipeline")]
    UnknownStep(StepName),

    #[error("step {0} has no recorded output")]
    MissingOutput(StepName),

    #[error("recorded output of step {step} is unreadable: {source}")]
    Decode {
        step: StepName,
        #[source]
        source: serde_json::Error,
    },
}

/// A durable bootstrap run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub workflow_id: WorkflowId,
    pub args: BootstrapArgs,
    pub context: CompletionContext,
    pub status: WorkflowStatus,
    pub steps: Vec<StepLogEntry>,

    /// Index of the first incomplete step; `steps.len()` once all are done.
    pub cursor: usize,

    /// The `running` job transition has been written.
    #[serde(default)]
    pub running_marked: bool,

    pub cancel_requested: bool,
    pub completion_delivered: bool,
    pub result: Option<WorkflowResult>,

    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
    #[serde(default)]
    pub decisions: Vec<DecisionRecord>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn new(workflow_id: WorkflowId, args: BootstrapArgs, now: DateTime<Utc>) -> Self {
        let context = CompletionContext {
            lock_key: args.lock_key.clone(),
        };
        Self {
            workflow_id,
            args,
            context,
            status: WorkflowStatus::Running,
            steps: StepName::PIPELINE.iter().copied().map(StepLogEntry::new).collect(),
            cursor: 0,
            running_marked: false,
            cancel_requested: false,
            completion_delivered: false,
            result: None,
            attempts: Vec::new(),
            decisions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The first incomplete step, or `None` when the pipeline is finished.
    pub fn next_step(&self) -> Option<StepName> {
        self.steps.iter().find(|e| !e.completed).map(|e| e.step)
    }

    pub fn entry(&self, step: StepName) -> Option<&StepLogEntry> {
        self.steps.iter().find(|e| e.step == step)
    }

    fn entry_mut(&mut self, step: StepName) -> Result<&mut StepLogEntry, StepLogError> {
        self.steps
            .iter_mut()
            .find(|e| e.step == step)
            .ok_or(StepLogError::UnknownStep(step))
    }

    fn advance_cursor(&mut self) {
        self.cursor = self
            .steps
            .iter()
            .position(|e| !e.completed)
            .unwrap_or(self.steps.len());
    }

    pub fn complete_step(
        &mut self,
        step: StepName,
        output: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), StepLogError> {
        let entry = self.entry_mut(step)?;
        entry.completed = true;
        entry.skipped = false;
        entry.output = Some(output);
        entry.completed_at = Some(now);
        self.advance_cursor();
        self.updated_at = now;
        Ok(())
    }

    pub fn skip_step(&mut self, step: StepName, now: DateTime<Utc>) -> Result<(), StepLogError> {
        let entry = self.entry_mut(step)?;
        entry.completed = true;
        entry.skipped = true;
        entry.output = None;
        entry.completed_at = Some(now);
        self.advance_cursor();
        self.updated_at = now;
        Ok(())
    }

    /// Record a failed attempt and bump the matching counter on the entry.
    pub fn record_failure(&mut self, record: AttemptRecord) -> Result<&StepLogEntry, StepLogError> {
        let now = record.failed_at;
        let step = record.step;
        {
            let entry = self.entry_mut(step)?;
            if record.kind == super::errors::ErrorKind::RateLimited {
                entry.rate_limit_waits += 1;
            } else {
                entry.attempts += 1;
            }
            entry.last_error = Some(record.message.clone());
        }
        self.attempts.push(record);
        self.updated_at = now;
        self.entry(step).ok_or(StepLogError::UnknownStep(step))
    }

    pub fn record_decision(&mut self, record: DecisionRecord) {
        self.updated_at = record.decided_at;
        self.decisions.push(record);
    }

    /// Decode the recorded output of a completed step.
    pub fn output_of<T: DeserializeOwned>(&self, step: StepName) -> Result<T, StepLogError> {
        let entry = self.entry(step).ok_or(StepLogError::UnknownStep(step))?;
        let value = entry
            .output
            .clone()
            .ok_or(StepLogError::MissingOutput(step))?;
        serde_json::from_value(value).map_err(|source| StepLogError::Decode { step, source })
    }

    pub fn pull_requests_output(&self) -> Result<PullRequestsOutput, StepLogError> {
        self.output_of(StepName::FetchPullRequests)
    }

    /// Move to a terminal status. The first result wins.
    pub fn finish(&mut self, result: WorkflowResult, now: DateTime<Utc>) {
        if self.result.is_some() {
            return;
        }
        self.status = match &result {
            WorkflowResult::Success => WorkflowStatus::Completed,
            WorkflowResult::Error { .. } => WorkflowStatus::Failed,
            WorkflowResult::Canceled => WorkflowStatus::Canceled,
        };
        self.result = Some(result);
        self.updated_at = now;
    }

    /// Terminal and already delivered; nothing left to do on resume.
    pub fn is_settled(&self) -> bool {
        self.status.is_terminal() && self.completion_delivered
    }
}
