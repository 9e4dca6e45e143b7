//! Completion callback - 終了結果をジョブ台帳に反映する
//!
//! | result     | job write                                   |
//! |------------|---------------------------------------------|
//! | `success`  | none (`done` was written inline)            |
//! | `error`    | `failed`, message or "Unknown workflow error" |
//! | `canceled` | `failed`, "Workflow canceled"               |

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::outcome::{CompletionEvent, WorkflowResult};
use crate::domain::sync_job::SyncJobState;
use crate::ports::job_registry::{RegistryError, SyncJobRegistry};

pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown workflow error";
pub const CANCELED_MESSAGE: &str = "Workflow canceled";

pub(crate) async fn on_bootstrap_complete(
    registry: &dyn SyncJobRegistry,
    event: &CompletionEvent,
    now: DateTime<Utc>,
) -> Result<(), RegistryError> {
    let message = match &event.result {
        WorkflowResult::Success => return Ok(()),
        WorkflowResult::Error { message } if message.trim().is_empty() => {
            UNKNOWN_ERROR_MESSAGE.to_string()
        }
        WorkflowResult::Error { message } => message.clone(),
        WorkflowResult::Canceled => CANCELED_MESSAGE.to_string(),
    };

    let updated = registry
        .mark(
            &event.context.lock_key,
            SyncJobState::Failed,
            Some(message),
            now,
        )
        .await?;
    info!(
        workflow_id = %event.workflow_id,
        lock_key = %event.context.lock_key,
        result = event.result.kind(),
        job_found = updated.is_some(),
        "completion delivered"
    );
    Ok(())
}
