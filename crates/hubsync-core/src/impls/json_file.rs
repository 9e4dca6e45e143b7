//! JsonFileStore - ファイルベースの永続化
//!
//! Layout under `state_dir`:
//! - `jobs.json`: map lock_key -> SyncJob
//! - `workflows/<workflow_id>.json`: one WorkflowInstance per file
//!
//! Every write goes to a sibling temp file first and is renamed into place,
//! so a crash leaves either the old or the new content, never a torn file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use super::memory::mark_in_map;
use crate::domain::ids::WorkflowId;
use crate::domain::sync_job::{SyncJob, SyncJobState};
use crate::domain::workflow::WorkflowInstance;
use crate::ports::job_registry::{RegistryError, SyncJobRegistry};
use crate::ports::workflow_store::{StoreError, WorkflowStore};

const JOBS_FILE: &str = "jobs.json";
const WORKFLOWS_DIR: &str = "workflows";

pub struct JsonFileStore {
    root: PathBuf,

    /// Serializes read-modify-write cycles on `jobs.json`.
    jobs_lock: Mutex<()>,

    /// Serializes writes under `workflows/`.
    workflows_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(WORKFLOWS_DIR)).await?;
        Ok(Self {
            root,
            jobs_lock: Mutex::new(()),
            workflows_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn jobs_path(&self) -> PathBuf {
        self.root.join(JOBS_FILE)
    }

    fn workflow_path(&self, workflow_id: WorkflowId) -> PathBuf {
        self.root
            .join(WORKFLOWS_DIR)
            .join(format!("{workflow_id}.json"))
    }

    async fn read_jobs(&self) -> Result<BTreeMap<String, SyncJob>, RegistryError> {
        Ok(read_json(&self.jobs_path()).await?.unwrap_or_default())
    }

    async fn write_jobs(&self, jobs: &BTreeMap<String, SyncJob>) -> Result<(), RegistryError> {
        write_json_atomic(&self.jobs_path(), jobs).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum FileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl From<FileError> for RegistryError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::Io(e) => RegistryError::Io(e),
            FileError::Serde(e) => RegistryError::Serde(e),
        }
    }
}

impl From<FileError> for StoreError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::Io(e) => StoreError::Io(e),
            FileError::Serde(e) => StoreError::Serde(e),
        }
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, FileError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), FileError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl SyncJobRegistry for JsonFileStore {
    async fn create(&self, job: SyncJob) -> Result<(), RegistryError> {
        let _guard = self.jobs_lock.lock().await;
        let mut jobs = self.read_jobs().await?;
        if jobs.contains_key(&job.lock_key) {
            return Err(RegistryError::Duplicate(job.lock_key));
        }
        jobs.insert(job.lock_key.clone(), job);
        self.write_jobs(&jobs).await
    }

    async fn get(&self, lock_key: &str) -> Result<Option<SyncJob>, RegistryError> {
        let _guard = self.jobs_lock.lock().await;
        Ok(self.read_jobs().await?.remove(lock_key))
    }

    async fn mark(
        &self,
        lock_key: &str,
        state: SyncJobState,
        last_error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncJob>, RegistryError> {
        let _guard = self.jobs_lock.lock().await;
        let mut jobs = self.read_jobs().await?;
        let updated = mark_in_map(&mut jobs, lock_key, state, last_error, now)?;
        if updated.is_some() {
            self.write_jobs(&jobs).await?;
        }
        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<SyncJob>, RegistryError> {
        let _guard = self.jobs_lock.lock().await;
        Ok(self.read_jobs().await?.into_values().collect())
    }
}

#[async_trait]
impl WorkflowStore for JsonFileStore {
    async fn insert(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let _guard = self.workflows_lock.lock().await;
        let path = self.workflow_path(instance.workflow_id);
        if tokio::fs::try_exists(&path).await? {
            return Err(StoreError::Duplicate(instance.workflow_id));
        }
        write_json_atomic(&path, instance).await?;
        Ok(())
    }

    async fn load(&self, workflow_id: WorkflowId) -> Result<Option<WorkflowInstance>, StoreError> {
        Ok(read_json(&self.workflow_path(workflow_id)).await?)
    }

    async fn save(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let _guard = self.workflows_lock.lock().await;
        let path = self.workflow_path(instance.workflow_id);
        if !tokio::fs::try_exists(&path).await? {
            return Err(StoreError::NotFound(instance.workflow_id));
        }
        write_json_atomic(&path, instance).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        let mut paths = Vec::new();
        let mut dir = tokio::fs::read_dir(self.root.join(WORKFLOWS_DIR)).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        // ULID file names sort by creation time.
        paths.sort();

        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(instance) = read_json::<WorkflowInstance>(&path).await? {
                out.push(instance);
            }
        }
        Ok(out)
    }
}
