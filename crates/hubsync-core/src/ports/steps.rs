//! Step executors - パイプラインの各ステップ
//!
//! Each method runs one pipeline step against upstream and returns the typed
//! output the orchestrator records in the step log. Executors may fail; the
//! orchestrator decides what happens next from `StepError::observe`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::errors::{ErrorKind, FailureObservation};
use crate::domain::steps::{
    BootstrapArgs, BranchesOutput, CheckRunsOutput, CommitsOutput, FileSyncFanOut, IssuesOutput,
    OpenPrSyncTarget, PullRequestsOutput, WorkflowRunsOutput,
};
use crate::github::ApiError;
use crate::ports::projection::ProjectionError;

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("file sync scheduling failed: {0}")]
    Schedule(String),

    #[error("{message}")]
    Other { kind: ErrorKind, message: String },
}

impl StepError {
    pub fn transient(message: impl Into<String>) -> Self {
        StepError::Other {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        StepError::Other {
            kind: ErrorKind::Auth,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        StepError::Other {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Api(e) => e.kind(),
            StepError::Projection(_) | StepError::Schedule(_) => ErrorKind::Transient,
            StepError::Other { kind, .. } => *kind,
        }
    }

    /// Reduce to what the decider looks at.
    pub fn observe(&self) -> FailureObservation {
        match self {
            StepError::Api(ApiError::RateLimited { retry_after_ms, .. }) => {
                FailureObservation::rate_limited(
                    self.to_string(),
                    Duration::from_millis(*retry_after_ms),
                )
            }
            other => FailureObservation::new(other.kind(), other.to_string()),
        }
    }
}

/// The bootstrap pipeline, one method per step.
#[async_trait]
pub trait BootstrapSteps: Send + Sync {
    async fn fetch_branches(&self, args: &BootstrapArgs) -> Result<BranchesOutput, StepError>;

    async fn fetch_pull_requests(
        &self,
        args: &BootstrapArgs,
    ) -> Result<PullRequestsOutput, StepError>;

    async fn fetch_issues(&self, args: &BootstrapArgs) -> Result<IssuesOutput, StepError>;

    async fn fetch_commits(&self, args: &BootstrapArgs) -> Result<CommitsOutput, StepError>;

    /// `head_shas` is already deduplicated and never empty.
    async fn fetch_check_runs(
        &self,
        args: &BootstrapArgs,
        head_shas: &[String],
    ) -> Result<CheckRunsOutput, StepError>;

    async fn fetch_workflow_runs(
        &self,
        args: &BootstrapArgs,
    ) -> Result<WorkflowRunsOutput, StepError>;

    /// `targets` is never empty.
    async fn schedule_pr_file_syncs(
        &self,
        args: &BootstrapArgs,
        targets: &[OpenPrSyncTarget],
    ) -> Result<FileSyncFanOut, StepError>;
}

/// Receives one file-sync request per open pull request.
#[async_trait]
pub trait FileSyncScheduler: Send + Sync {
    async fn schedule(
        &self,
        repository_id: i64,
        full_name: &str,
        target: &OpenPrSyncTarget,
    ) -> Result<(), StepError>;
}
