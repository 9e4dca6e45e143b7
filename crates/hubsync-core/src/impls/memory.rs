//! In-memory job registry and workflow store - 開発用・テスト用
//!
//! `tokio::sync::Mutex` で排他制御。プロセスが終われば消える。

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::ids::WorkflowId;
use crate::domain::sync_job::{SyncJob, SyncJobState};
use crate::domain::workflow::WorkflowInstance;
use crate::ports::job_registry::{RegistryError, SyncJobRegistry};
use crate::ports::workflow_store::{StoreError, WorkflowStore};

#[derive(Default)]
pub struct InMemorySyncJobRegistry {
    jobs: Mutex<BTreeMap<String, SyncJob>>,
}

impl InMemorySyncJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared by every registry implementation: look the row up, apply the
/// write, leave everything alone on an unknown key.
pub(crate) fn mark_in_map(
    jobs: &mut BTreeMap<String, SyncJob>,
    lock_key: &str,
    state: SyncJobState,
    last_error: Option<String>,
    now: DateTime<Utc>,
) -> Result<Option<SyncJob>, RegistryError> {
    let Some(job) = jobs.get_mut(lock_key) else {
        return Ok(None);
    };
    job.apply_mark(state, last_error, now)?;
    Ok(Some(job.clone()))
}

#[async_trait]
impl SyncJobRegistry for InMemorySyncJobRegistry {
    async fn create(&self, job: SyncJob) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.lock_key) {
            return Err(RegistryError::Duplicate(job.lock_key));
        }
        jobs.insert(job.lock_key.clone(), job);
        Ok(())
    }

    async fn get(&self, lock_key: &str) -> Result<Option<SyncJob>, RegistryError> {
        Ok(self.jobs.lock().await.get(lock_key).cloned())
    }

    async fn mark(
        &self,
        lock_key: &str,
        state: SyncJobState,
        last_error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncJob>, RegistryError> {
        let mut jobs = self.jobs.lock().await;
        mark_in_map(&mut jobs, lock_key, state, last_error, now)
    }

    async fn list(&self) -> Result<Vec<SyncJob>, RegistryError> {
        Ok(self.jobs.lock().await.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    instances: Mutex<BTreeMap<WorkflowId, WorkflowInstance>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn insert(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let mut instances = self.instances.lock().await;
        if instances.contains_key(&instance.workflow_id) {
            return Err(StoreError::Duplicate(instance.workflow_id));
        }
        instances.insert(instance.workflow_id, instance.clone());
        Ok(())
    }

    async fn load(&self, workflow_id: WorkflowId) -> Result<Option<WorkflowInstance>, StoreError> {
        Ok(self.instances.lock().await.get(&workflow_id).cloned())
    }

    async fn save(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let mut instances = self.instances.lock().await;
        match instances.get_mut(&instance.workflow_id) {
            Some(slot) => {
                *slot = instance.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(instance.workflow_id)),
        }
    }

    async fn list(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        Ok(self.instances.lock().await.values().cloned().collect())
    }
}
