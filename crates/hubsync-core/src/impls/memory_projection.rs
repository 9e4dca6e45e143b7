//! InMemoryProjection - プロセス内のミラー
//!
//! Rows are keyed by `(repository_id, upstream identity)`, so replaying a
//! step overwrites instead of duplicating.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::entities::{
    BranchRecord, CheckRunRecord, CommitRecord, IssueRecord, PullRequestRecord,
    WorkflowJobRecord, WorkflowRunRecord,
};
use crate::ports::projection::{ProjectionCounts, ProjectionError, ProjectionStore};

#[derive(Default)]
struct Tables {
    repositories: HashMap<i64, String>,
    branches: HashMap<(i64, String), BranchRecord>,
    pull_requests: HashMap<(i64, u64), PullRequestRecord>,
    issues: HashMap<(i64, u64), IssueRecord>,
    commits: HashMap<(i64, String), CommitRecord>,
    check_runs: HashMap<(i64, i64), CheckRunRecord>,
    workflow_runs: HashMap<(i64, i64), WorkflowRunRecord>,
    workflow_jobs: HashMap<(i64, i64), WorkflowJobRecord>,
}

#[derive(Default)]
pub struct InMemoryProjection {
    tables: Mutex<Tables>,
}

impl InMemoryProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pull_request(&self, repository_id: i64, number: u64) -> Option<PullRequestRecord> {
        self.tables
            .lock()
            .await
            .pull_requests
            .get(&(repository_id, number))
            .cloned()
    }
}

#[async_trait]
impl ProjectionStore for InMemoryProjection {
    async fn upsert_repository(
        &self,
        repository_id: i64,
        full_name: &str,
    ) -> Result<(), ProjectionError> {
        self.tables
            .lock()
            .await
            .repositories
            .insert(repository_id, full_name.to_string());
        Ok(())
    }

    async fn upsert_branches(
        &self,
        repository_id: i64,
        rows: &[BranchRecord],
    ) -> Result<(), ProjectionError> {
        let mut t = self.tables.lock().await;
        for row in rows {
            t.branches
                .insert((repository_id, row.name.clone()), row.clone());
        }
        Ok(())
    }

    async fn upsert_pull_requests(
        &self,
        repository_id: i64,
        rows: &[PullRequestRecord],
    ) -> Result<(), ProjectionError> {
        let mut t = self.tables.lock().await;
        for row in rows {
            t.pull_requests
                .insert((repository_id, row.number), row.clone());
        }
        Ok(())
    }

    async fn upsert_issues(
        &self,
        repository_id: i64,
        rows: &[IssueRecord],
    ) -> Result<(), ProjectionError> {
        let mut t = self.tables.lock().await;
        for row in rows {
            t.issues.insert((repository_id, row.number), row.clone());
        }
        Ok(())
    }

    async fn upsert_commits(
        &self,
        repository_id: i64,
        rows: &[CommitRecord],
    ) -> Result<(), ProjectionError> {
        let mut t = self.tables.lock().await;
        for row in rows {
            t.commits.insert((repository_id, row.sha.clone()), row.clone());
        }
        Ok(())
    }

    async fn upsert_check_runs(
        &self,
        repository_id: i64,
        rows: &[CheckRunRecord],
    ) -> Result<(), ProjectionError> {
        let mut t = self.tables.lock().await;
        for row in rows {
            t.check_runs
                .insert((repository_id, row.github_id), row.clone());
        }
        Ok(())
    }

    async fn upsert_workflow_runs(
        &self,
        repository_id: i64,
        rows: &[WorkflowRunRecord],
    ) -> Result<(), ProjectionError> {
        let mut t = self.tables.lock().await;
        for row in rows {
            t.workflow_runs
                .insert((repository_id, row.github_id), row.clone());
        }
        Ok(())
    }

    async fn upsert_workflow_jobs(
        &self,
        repository_id: i64,
        rows: &[WorkflowJobRecord],
    ) -> Result<(), ProjectionError> {
        let mut t = self.tables.lock().await;
        for row in rows {
            t.workflow_jobs
                .insert((repository_id, row.github_id), row.clone());
        }
        Ok(())
    }

    async fn counts(&self) -> Result<ProjectionCounts, ProjectionError> {
        let t = self.tables.lock().await;
        Ok(ProjectionCounts {
            repositories: t.repositories.len(),
            branches: t.branches.len(),
            commits: t.commits.len(),
            pull_requests: t.pull_requests.len(),
            issues: t.issues.len(),
            check_runs: t.check_runs.len(),
            workflow_runs: t.workflow_runs.len(),
            workflow_jobs: t.workflow_jobs.len(),
        })
    }
}
