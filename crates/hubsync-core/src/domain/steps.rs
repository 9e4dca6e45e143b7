//! Bootstrap pipeline vocabulary: step names, arguments and step outputs.
//!
//! Outputs are persisted as JSON in the step log, so every type here is
//! `Serialize + Deserialize` and must stay backwards compatible with logs
//! written by older builds.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// The fixed bootstrap pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    FetchBranches,
    FetchPullRequests,
    FetchIssues,
    FetchCommits,
    FetchCheckRuns,
    FetchWorkflowRuns,
    SchedulePrFileSyncs,
}

impl StepName {
    pub const PIPELINE: [StepName; 7] = [
        StepName::FetchBranches,
        StepName::FetchPullRequests,
        StepName::FetchIssues,
        StepName::FetchCommits,
        StepName::FetchCheckRuns,
        StepName::FetchWorkflowRuns,
        StepName::SchedulePrFileSyncs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepName::FetchBranches => "fetch-branches",
            StepName::FetchPullRequests => "fetch-pull-requests",
            StepName::FetchIssues => "fetch-issues",
            StepName::FetchCommits => "fetch-commits",
            StepName::FetchCheckRuns => "fetch-check-runs",
            StepName::FetchWorkflowRuns => "fetch-workflow-runs",
            StepName::SchedulePrFileSyncs => "schedule-pr-file-syncs",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of one bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapArgs {
    pub repository_id: i64,

    /// `owner/name`.
    pub full_name: String,

    pub lock_key: String,
}

/// An open pull request whose files must be synced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpenPrSyncTarget {
    pub number: u64,
    pub head_sha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchesOutput {
    pub count: usize,
}

/// Step 2 output; its targets gate steps 5 and 7.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestsOutput {
    pub count: usize,
    #[serde(default)]
    pub open_pr_sync_targets: Vec<OpenPrSyncTarget>,
}

impl PullRequestsOutput {
    /// Head SHAs of the open targets, deduplicated, first-seen order kept.
    pub fn unique_head_shas(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.open_pr_sync_targets
            .iter()
            .filter(|t| seen.insert(t.head_sha.as_str()))
            .map(|t| t.head_sha.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuesOutput {
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitsOutput {
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRunsOutput {
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRunsOutput {
    pub runs: usize,
    pub jobs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSyncFanOut {
    pub scheduled: usize,
}
