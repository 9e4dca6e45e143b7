//! GitHubBootstrapSteps - GitHub に対するステップ実装
//!
//! Thin: fetch, convert, upsert, count. Anything clever (retry, rate-limit
//! waits, resume) lives in the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::entities::{
    BranchRecord, CheckRunRecord, CommitRecord, IssueRecord, PullRequestRecord,
    WorkflowJobRecord, WorkflowRunRecord,
};
use crate::domain::steps::{
    BootstrapArgs, BranchesOutput, CheckRunsOutput, CommitsOutput, FileSyncFanOut, IssuesOutput,
    OpenPrSyncTarget, PullRequestsOutput, WorkflowRunsOutput,
};
use crate::github::ApiError;
use crate::github::client::{ApiClient, DEFAULT_MAX_PAGES};
use crate::github::types::{
    Branch, CheckRunList, Commit, Issue, PullRequest, WorkflowJobList, WorkflowRunList,
};
use crate::ports::projection::ProjectionStore;
use crate::ports::steps::{BootstrapSteps, FileSyncScheduler, StepError};

pub struct GitHubBootstrapSteps {
    client: ApiClient,
    projection: Arc<dyn ProjectionStore>,
    scheduler: Arc<dyn FileSyncScheduler>,
    max_pages: usize,
}

impl GitHubBootstrapSteps {
    pub fn new(
        client: ApiClient,
        projection: Arc<dyn ProjectionStore>,
        scheduler: Arc<dyn FileSyncScheduler>,
    ) -> Self {
        Self {
            client,
            projection,
            scheduler,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }
}

#[async_trait]
impl BootstrapSteps for GitHubBootstrapSteps {
    async fn fetch_branches(&self, args: &BootstrapArgs) -> Result<BranchesOutput, StepError> {
        let path = format!("/repos/{}/branches?per_page=100", args.full_name);
        let max_pages = self.max_pages;
        let branches: Vec<Branch> = self
            .client
            .run(|fetch| async move { fetch.get_paginated(&path, max_pages).await })
            .await?;

        let rows: Vec<BranchRecord> = branches.into_iter().map(Into::into).collect();
        self.projection
            .upsert_repository(args.repository_id, &args.full_name)
            .await?;
        self.projection
            .upsert_branches(args.repository_id, &rows)
            .await?;
        Ok(BranchesOutput { count: rows.len() })
    }

    async fn fetch_pull_requests(
        &self,
        args: &BootstrapArgs,
    ) -> Result<PullRequestsOutput, StepError> {
        let path = format!("/repos/{}/pulls?state=all&per_page=100", args.full_name);
        let max_pages = self.max_pages;
        let pulls: Vec<PullRequest> = self
            .client
            .run(|fetch| async move { fetch.get_paginated(&path, max_pages).await })
            .await?;

        let open_pr_sync_targets: Vec<OpenPrSyncTarget> =
            pulls.iter().filter_map(PullRequest::sync_target).collect();
        let rows: Vec<PullRequestRecord> = pulls.into_iter().map(Into::into).collect();
        self.projection
            .upsert_pull_requests(args.repository_id, &rows)
            .await?;

        debug!(count = rows.len(), open = open_pr_sync_targets.len(), "pull requests fetched");
        Ok(PullRequestsOutput {
            count: rows.len(),
            open_pr_sync_targets,
        })
    }

    async fn fetch_issues(&self, args: &BootstrapArgs) -> Result<IssuesOutput, StepError> {
        let path = format!("/repos/{}/issues?state=all&per_page=100", args.full_name);
        let max_pages = self.max_pages;
        let issues: Vec<Issue> = self
            .client
            .run(|fetch| async move { fetch.get_paginated(&path, max_pages).await })
            .await?;

        let rows: Vec<IssueRecord> = issues
            .into_iter()
            .filter(|i| !i.is_pull_request())
            .map(Into::into)
            .collect();
        self.projection
            .upsert_issues(args.repository_id, &rows)
            .await?;
        Ok(IssuesOutput { count: rows.len() })
    }

    async fn fetch_commits(&self, args: &BootstrapArgs) -> Result<CommitsOutput, StepError> {
        // One page: the recent window only.
        let path = format!("/repos/{}/commits?per_page=100", args.full_name);
        let commits: Vec<Commit> = self
            .client
            .run(|fetch| async move { fetch.get_json(&path).await })
            .await?;

        let rows: Vec<CommitRecord> = commits.into_iter().map(Into::into).collect();
        self.projection
            .upsert_commits(args.repository_id, &rows)
            .await?;
        Ok(CommitsOutput { count: rows.len() })
    }

    async fn fetch_check_runs(
        &self,
        args: &BootstrapArgs,
        head_shas: &[String],
    ) -> Result<CheckRunsOutput, StepError> {
        let full_name = args.full_name.clone();
        let shas = head_shas.to_vec();
        let runs: Vec<CheckRunRecord> = self
            .client
            .run(|fetch| async move {
                let mut rows = Vec::new();
                for sha in &shas {
                    let list: CheckRunList = fetch
                        .get_json(&format!(
                            "/repos/{full_name}/commits/{sha}/check-runs?per_page=100"
                        ))
                        .await?;
                    rows.extend(list.check_runs.into_iter().map(CheckRunRecord::from));
                }
                Ok::<_, ApiError>(rows)
            })
            .await?;

        self.projection
            .upsert_check_runs(args.repository_id, &runs)
            .await?;
        Ok(CheckRunsOutput { count: runs.len() })
    }

    async fn fetch_workflow_runs(
        &self,
        args: &BootstrapArgs,
    ) -> Result<WorkflowRunsOutput, StepError> {
        let full_name = args.full_name.clone();
        let (runs, jobs) = self
            .client
            .run(|fetch| async move {
                let list: WorkflowRunList = fetch
                    .get_json(&format!("/repos/{full_name}/actions/runs?per_page=50"))
                    .await?;
                let mut jobs = Vec::new();
                for run in &list.workflow_runs {
                    let page: WorkflowJobList = fetch
                        .get_json(&format!(
                            "/repos/{full_name}/actions/runs/{}/jobs?per_page=100",
                            run.id
                        ))
                        .await?;
                    jobs.extend(page.jobs.into_iter().map(WorkflowJobRecord::from));
                }
                let runs: Vec<WorkflowRunRecord> =
                    list.workflow_runs.into_iter().map(Into::into).collect();
                Ok::<_, ApiError>((runs, jobs))
            })
            .await?;

        self.projection
            .upsert_workflow_runs(args.repository_id, &runs)
            .await?;
        self.projection
            .upsert_workflow_jobs(args.repository_id, &jobs)
            .await?;
        Ok(WorkflowRunsOutput {
            runs: runs.len(),
            jobs: jobs.len(),
        })
    }

    async fn schedule_pr_file_syncs(
        &self,
        args: &BootstrapArgs,
        targets: &[OpenPrSyncTarget],
    ) -> Result<FileSyncFanOut, StepError> {
        for target in targets {
            self.scheduler
                .schedule(args.repository_id, &args.full_name, target)
                .await?;
        }
        Ok(FileSyncFanOut {
            scheduled: targets.len(),
        })
    }
}
