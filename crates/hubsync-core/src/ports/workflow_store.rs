//! WorkflowStore port - ステップログの永続化
//!
//! `save` must be durable before it returns: the orchestrator relies on a
//! saved step completion being visible after a crash.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ids::WorkflowId;
use crate::domain::workflow::WorkflowInstance;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workflow {0} already exists")]
    Duplicate(WorkflowId),

    #[error("workflow {0} not found")]
    NotFound(WorkflowId),

    #[error("workflow store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workflow store is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn insert(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    async fn load(&self, workflow_id: WorkflowId) -> Result<Option<WorkflowInstance>, StoreError>;

    /// Overwrite an existing instance. `NotFound` if it was never inserted.
    async fn save(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    /// All instances, oldest first.
    async fn list(&self) -> Result<Vec<WorkflowInstance>, StoreError>;
}
