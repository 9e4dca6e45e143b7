//! In-memory file-sync queue.
//!
//! Collects one request per open pull request. The per-PR file sync itself
//! runs elsewhere; this is the hand-off point.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::steps::OpenPrSyncTarget;
use crate::ports::steps::{FileSyncScheduler, StepError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSyncRequest {
    pub repository_id: i64,
    pub full_name: String,
    pub pr_number: u64,
    pub head_sha: String,
}

#[derive(Default)]
pub struct InMemoryFileSyncQueue {
    requests: Mutex<Vec<FileSyncRequest>>,
}

impl InMemoryFileSyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pending(&self) -> Vec<FileSyncRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl FileSyncScheduler for InMemoryFileSyncQueue {
    async fn schedule(
        &self,
        repository_id: i64,
        full_name: &str,
        target: &OpenPrSyncTarget,
    ) -> Result<(), StepError> {
        let request = FileSyncRequest {
            repository_id,
            full_name: full_name.to_string(),
            pr_number: target.number,
            head_sha: target.head_sha.clone(),
        };
        let mut requests = self.requests.lock().await;
        // Re-scheduling the same PR at the same head is a no-op.
        if !requests.contains(&request) {
            debug!(pr = target.number, head_sha = %target.head_sha, "file sync scheduled");
            requests.push(request);
        }
        Ok(())
    }
}
