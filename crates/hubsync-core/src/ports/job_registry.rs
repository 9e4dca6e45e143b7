//! SyncJobRegistry port - ジョブ台帳
//!
//! One row per `lock_key`. Rows are single-row upserts; nothing here needs a
//! multi-row transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::sync_job::{SyncJob, SyncJobState, TransitionError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("sync job '{0}' already exists")]
    Duplicate(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("job registry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job registry is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait SyncJobRegistry: Send + Sync {
    /// Insert a new row. Fails with `Duplicate` if the key is taken.
    async fn create(&self, job: SyncJob) -> Result<(), RegistryError>;

    async fn get(&self, lock_key: &str) -> Result<Option<SyncJob>, RegistryError>;

    /// Write a state to an existing row.
    ///
    /// - unknown `lock_key`: no-op, `Ok(None)`, no row created
    /// - otherwise: `attempt_count + 1`, `state` / `last_error` replaced,
    ///   `updated_at = now`; returns the updated row
    /// - a transition the state machine forbids leaves the row untouched
    async fn mark(
        &self,
        lock_key: &str,
        state: SyncJobState,
        last_error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncJob>, RegistryError>;

    /// All rows, ordered by `lock_key`.
    async fn list(&self) -> Result<Vec<SyncJob>, RegistryError>;
}
