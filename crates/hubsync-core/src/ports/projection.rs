//! ProjectionStore port - ローカルミラーへの書き込み
//!
//! Per-entity upserts keyed by repository id plus the entity's upstream
//! identity. Re-running a step with the same rows must not duplicate them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::entities::{
    BranchRecord, CheckRunRecord, CommitRecord, IssueRecord, PullRequestRecord,
    WorkflowJobRecord, WorkflowRunRecord,
};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("projection store unavailable: {0}")]
    Unavailable(String),
}

/// Row counts per projected table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionCounts {
    pub repositories: usize,
    pub branches: usize,
    pub commits: usize,
    pub pull_requests: usize,
    pub issues: usize,
    pub check_runs: usize,
    pub workflow_runs: usize,
    pub workflow_jobs: usize,
}

#[async_trait]
pub trait ProjectionStore: Send + Sync {
    async fn upsert_repository(
        &self,
        repository_id: i64,
        full_name: &str,
    ) -> Result<(), ProjectionError>;

    async fn upsert_branches(
        &self,
        repository_id: i64,
        rows: &[BranchRecord],
    ) -> Result<(), ProjectionError>;

    async fn upsert_pull_requests(
        &self,
        repository_id: i64,
        rows: &[PullRequestRecord],
    ) -> Result<(), ProjectionError>;

    async fn upsert_issues(
        &self,
        repository_id: i64,
        rows: &[IssueRecord],
    ) -> Result<(), ProjectionError>;

    async fn upsert_commits(
        &self,
        repository_id: i64,
        rows: &[CommitRecord],
    ) -> Result<(), ProjectionError>;

    async fn upsert_check_runs(
        &self,
        repository_id: i64,
        rows: &[CheckRunRecord],
    ) -> Result<(), ProjectionError>;

    async fn upsert_workflow_runs(
        &self,
        repository_id: i64,
        rows: &[WorkflowRunRecord],
    ) -> Result<(), ProjectionError>;

    async fn upsert_workflow_jobs(
        &self,
        repository_id: i64,
        rows: &[WorkflowJobRecord],
    ) -> Result<(), ProjectionError>;

    async fn counts(&self) -> Result<ProjectionCounts, ProjectionError>;
}
