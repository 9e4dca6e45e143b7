//! Status - 診断用クエリ
//!
//! ジョブ一覧、テーブル件数、ヘルスチェック、ワークフロー履歴。
//! Read-only; nothing here mutates a store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::attempt::{AttemptRecord, DecisionRecord};
use crate::domain::ids::WorkflowId;
use crate::domain::outcome::WorkflowResult;
use crate::domain::sync_job::SyncJobStatusView;
use crate::domain::workflow::{StepLogEntry, WorkflowStatus};
use crate::ports::job_registry::{RegistryError, SyncJobRegistry};
use crate::ports::projection::{ProjectionError, ProjectionStore};
use crate::ports::workflow_store::{StoreError, WorkflowStore};

#[derive(Debug, Error)]
pub enum StatusError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub repositories: usize,
    pub branches: usize,
    pub commits: usize,
    pub pull_requests: usize,
    pub issues: usize,
    pub check_runs: usize,
    pub workflow_runs: usize,
    pub workflow_jobs: usize,
    pub sync_jobs: usize,
    pub workflows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub ok: bool,

    /// 1 when at least one repository row is readable, else 0.
    pub table_count: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything recorded about one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowHistory {
    pub workflow_id: WorkflowId,
    pub lock_key: String,
    pub status: WorkflowStatus,
    pub result: Option<WorkflowResult>,
    pub steps: Vec<StepLogEntry>,
    pub attempts: Vec<AttemptRecord>,
    pub decisions: Vec<DecisionRecord>,
}

pub struct StatusService {
    registry: Arc<dyn SyncJobRegistry>,
    store: Arc<dyn WorkflowStore>,
    projection: Arc<dyn ProjectionStore>,
}

impl StatusService {
    pub fn new(
        registry: Arc<dyn SyncJobRegistry>,
        store: Arc<dyn WorkflowStore>,
        projection: Arc<dyn ProjectionStore>,
    ) -> Self {
        Self {
            registry,
            store,
            projection,
        }
    }

    pub async fn sync_job_status(&self) -> Result<Vec<SyncJobStatusView>, StatusError> {
        let jobs = self.registry.list().await?;
        Ok(jobs.iter().map(SyncJobStatusView::from).collect())
    }

    pub async fn table_counts(&self) -> Result<TableCounts, StatusError> {
        let p = self.projection.counts().await?;
        let sync_jobs = self.registry.list().await?.len();
        let workflows = self.store.list().await?.len();
        Ok(TableCounts {
            repositories: p.repositories,
            branches: p.branches,
            commits: p.commits,
            pull_requests: p.pull_requests,
            issues: p.issues,
            check_runs: p.check_runs,
            workflow_runs: p.workflow_runs,
            workflow_jobs: p.workflow_jobs,
            sync_jobs,
            workflows,
        })
    }

    /// Never fails; a backend error is reported as `ok: false`.
    pub async fn health_check(&self) -> HealthReport {
        match self.projection.counts().await {
            Ok(counts) => HealthReport {
                ok: true,
                table_count: counts.repositories.min(1),
                error: None,
            },
            Err(e) => HealthReport {
                ok: false,
                table_count: 0,
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn workflow_history(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Option<WorkflowHistory>, StatusError> {
        let Some(wf) = self.store.load(workflow_id).await? else {
            return Ok(None);
        };
        Ok(Some(WorkflowHistory {
            workflow_id: wf.workflow_id,
            lock_key: wf.args.lock_key,
            status: wf.status,
            result: wf.result,
            steps: wf.steps,
            attempts: wf.attempts,
            decisions: wf.decisions,
        }))
    }
}
