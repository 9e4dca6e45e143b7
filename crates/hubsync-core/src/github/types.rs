//! GitHub REST wire types and their projection rows.
//!
//! Only the fields the projection keeps are declared; serde ignores the rest.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::entities::{
    BranchRecord, CheckRunRecord, CommitRecord, IssueRecord, PullRequestRecord,
    WorkflowJobRecord, WorkflowRunRecord,
};
use crate::domain::steps::OpenPrSyncTarget;

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: CommitRef,
    #[serde(default)]
    pub protected: bool,
}

impl From<Branch> for BranchRecord {
    fn from(b: Branch) -> Self {
        Self {
            name: b.name,
            head_sha: b.commit.sha,
            protected: b.protected,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub draft: bool,
    pub user: Option<User>,
    pub head: GitRef,
    pub base: GitRef,
    pub merged_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PullRequest {
    pub fn sync_target(&self) -> Option<OpenPrSyncTarget> {
        (self.state == "open").then(|| OpenPrSyncTarget {
            number: self.number,
            head_sha: self.head.sha.clone(),
        })
    }
}

impl From<PullRequest> for PullRequestRecord {
    fn from(p: PullRequest) -> Self {
        Self {
            github_id: p.id,
            number: p.number,
            title: p.title,
            state: p.state,
            draft: p.draft,
            author_login: p.user.map(|u| u.login),
            head_ref: p.head.ref_name,
            head_sha: p.head.sha,
            base_ref: p.base.ref_name,
            merged_at: p.merged_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub number: u64,
    pub title: String,
    pub state: String,
    pub user: Option<User>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub comments: u64,

    /// Present when the "issue" is really a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,

    pub updated_at: DateTime<Utc>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

impl From<Issue> for IssueRecord {
    fn from(i: Issue) -> Self {
        Self {
            github_id: i.id,
            number: i.number,
            title: i.title,
            state: i.state,
            author_login: i.user.map(|u| u.login),
            labels: i.labels.into_iter().map(|l| l.name).collect(),
            comments: i.comments,
            updated_at: i.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitAuthor {
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: Option<GitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub commit: CommitDetail,
    pub author: Option<User>,
}

impl From<Commit> for CommitRecord {
    fn from(c: Commit) -> Self {
        Self {
            sha: c.sha,
            message: c.commit.message,
            author_login: c.author.map(|u| u.login),
            authored_at: c.commit.author.and_then(|a| a.date),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRun {
    pub id: i64,
    pub head_sha: String,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunList {
    pub check_runs: Vec<CheckRun>,
}

impl From<CheckRun> for CheckRunRecord {
    fn from(c: CheckRun) -> Self {
        Self {
            github_id: c.id,
            head_sha: c.head_sha,
            name: c.name,
            status: c.status,
            conclusion: c.conclusion,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    pub id: i64,
    pub run_number: u64,
    pub name: Option<String>,
    pub head_sha: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub event: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRunList {
    pub workflow_runs: Vec<WorkflowRun>,
}

impl From<WorkflowRun> for WorkflowRunRecord {
    fn from(r: WorkflowRun) -> Self {
        Self {
            github_id: r.id,
            run_number: r.run_number,
            name: r.name,
            head_sha: r.head_sha,
            status: r.status,
            conclusion: r.conclusion,
            event: r.event,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowJob {
    pub id: i64,
    pub run_id: i64,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowJobList {
    pub jobs: Vec<WorkflowJob>,
}

impl From<WorkflowJob> for WorkflowJobRecord {
    fn from(j: WorkflowJob) -> Self {
        Self {
            github_id: j.id,
            run_id: j.run_id,
            name: j.name,
            status: j.status,
            conclusion: j.conclusion,
        }
    }
}

/// Response of `POST /app/installations/{id}/access_tokens`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
