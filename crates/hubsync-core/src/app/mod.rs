//! App - アプリケーション層
//!
//! ports を組み合わせてブートストラップを実行する。
//!
//! # 主要コンポーネント
//! - **OrchestratorBuilder**: ワイヤリングと起動時検証
//! - **Orchestrator**: ステップログを進める耐久ワークフロー
//! - **StatusService**: ジョブ一覧・件数・ヘルス・履歴

pub mod builder;
mod completion;
pub mod orchestrator;
mod pipeline;
pub mod status;

pub use self::builder::{BuildError, OrchestratorBuilder};
pub use self::completion::{CANCELED_MESSAGE, UNKNOWN_ERROR_MESSAGE};
pub use self::orchestrator::{Orchestrator, OrchestratorError};
pub use self::status::{HealthReport, StatusError, StatusService, TableCounts, WorkflowHistory};
