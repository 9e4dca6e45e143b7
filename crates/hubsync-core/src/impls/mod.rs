//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemorySyncJobRegistry / InMemoryWorkflowStore**: テスト用
//! - **JsonFileStore**: `state_dir` 以下の JSON ファイル（CLI のデフォルト）
//! - **InMemoryProjection / InMemoryFileSyncQueue**: ローカルミラーと file-sync の受け口
//! - **ReqwestTransport**: 本番用 HTTP
//! - **StaticTokenProvider / InstallationTokenProvider**: 認証トークン
//! - **GitHubBootstrapSteps**: GitHub に対するステップ実装

pub mod file_sync;
pub mod github_steps;
pub mod json_file;
pub mod memory;
pub mod memory_projection;
pub mod reqwest_transport;
pub mod token;

pub use self::file_sync::{FileSyncRequest, InMemoryFileSyncQueue};
pub use self::github_steps::GitHubBootstrapSteps;
pub use self::json_file::JsonFileStore;
pub use self::memory::{InMemorySyncJobRegistry, InMemoryWorkflowStore};
pub use self::memory_projection::InMemoryProjection;
pub use self::reqwest_transport::ReqwestTransport;
pub use self::token::{InstallationTokenProvider, Rs256Signer, StaticTokenProvider};
