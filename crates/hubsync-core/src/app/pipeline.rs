//! One step of the bootstrap pipeline.
//!
//! Picks the executor method for `step`, feeds it what earlier steps recorded
//! in the log, and decides whether the step runs at all.

use serde::Serialize;

use crate::domain::steps::StepName;
use crate::domain::workflow::WorkflowInstance;
use crate::ports::steps::{BootstrapSteps, StepError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StepRun {
    Completed(serde_json::Value),

    /// Input was empty; the executor was never called.
    Skipped,
}

fn completed<T: Serialize>(output: T) -> Result<StepRun, StepError> {
    serde_json::to_value(output)
        .map(StepRun::Completed)
        .map_err(|e| StepError::permanent(format!("step output is not serializable: {e}")))
}

pub(crate) async fn run_step(
    steps: &dyn BootstrapSteps,
    wf: &WorkflowInstance,
    step: StepName,
) -> Result<StepRun, StepError> {
    let args = &wf.args;
    match step {
        StepName::FetchBranches => completed(steps.fetch_branches(args).await?),
        StepName::FetchPullRequests => completed(steps.fetch_pull_requests(args).await?),
        StepName::FetchIssues => completed(steps.fetch_issues(args).await?),
        StepName::FetchCommits => completed(steps.fetch_commits(args).await?),
        StepName::FetchCheckRuns => {
            let shas = recorded_pull_requests(wf)?.unique_head_shas();
            if shas.is_empty() {
                return Ok(StepRun::Skipped);
            }
            completed(steps.fetch_check_runs(args, &shas).await?)
        }
        StepName::FetchWorkflowRuns => completed(steps.fetch_workflow_runs(args).await?),
        StepName::SchedulePrFileSyncs => {
            let targets = recorded_pull_requests(wf)?.open_pr_sync_targets;
            if targets.is_empty() {
                return Ok(StepRun::Skipped);
            }
            completed(steps.schedule_pr_file_syncs(args, &targets).await?)
        }
    }
}

fn recorded_pull_requests(
    wf: &WorkflowInstance,
) -> Result<crate::domain::steps::PullRequestsOutput, StepError> {
    wf.pull_requests_output()
        .map_err(|e| StepError::permanent(e.to_string()))
}
