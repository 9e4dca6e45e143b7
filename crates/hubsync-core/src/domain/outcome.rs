//! Terminal results of a workflow and the completion event built from them.

use serde::{Deserialize, Serialize};

use super::ids::WorkflowId;

/// How a workflow ended.
///
/// Serialized with a `kind` tag (`success` / `error` / `canceled`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkflowResult {
    Success,
    Error { message: String },
    Canceled,
}

impl WorkflowResult {
    pub fn error(message: impl Into<String>) -> Self {
        WorkflowResult::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowResult::Success => "success",
            WorkflowResult::Error { .. } => "error",
            WorkflowResult::Canceled => "canceled",
        }
    }
}

/// Opaque payload carried through the workflow only to route the completion
/// callback back to the right sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionContext {
    pub lock_key: String,
}

/// Delivered exactly once per workflow when it reaches a terminal result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub workflow_id: WorkflowId,
    pub result: WorkflowResult,
    pub context: CompletionContext,
}
