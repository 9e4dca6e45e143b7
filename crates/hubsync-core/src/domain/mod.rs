//! Domain model (IDs, sync jobs, step log, outcomes, records, ...).
//!
//! ストレージや HTTP に依存しない純粋な型だけを置く。
//! - sync_job: ジョブの状態機械
//! - workflow: 永続化されるステップログ
//! - decision / retry: 失敗後の判断
//! - attempt: 監査ログ（AttemptRecord / DecisionRecord）

pub mod attempt;
pub mod decision;
pub mod entities;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod retry;
pub mod steps;
pub mod sync_job;
pub mod workflow;

pub use attempt::{AttemptRecord, DecisionRecord};
pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{ErrorKind, FailureObservation};
pub use ids::{AttemptId, WorkflowId};
pub use outcome::{CompletionContext, CompletionEvent, WorkflowResult};
pub use retry::RetryPolicy;
pub use steps::{BootstrapArgs, OpenPrSyncTarget, PullRequestsOutput, StepName};
pub use sync_job::{SyncJob, SyncJobState, SyncJobStatusView, TransitionError};
pub use workflow::{StepLogEntry, StepLogError, WorkflowInstance, WorkflowStatus};
