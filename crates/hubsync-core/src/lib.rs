//! hubsync-core
//!
//! GitHub リポジトリの状態をローカルにミラーするブートストラップ同期の中核。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, sync_job, workflow, decision, retry, outcome, errors）
//! - **ports**: 抽象化レイヤー（SyncJobRegistry, WorkflowStore, ProjectionStore, TokenProvider, HttpTransport, ...）
//! - **github**: レート制限を考慮した REST クライアント
//! - **impls**: 実装（in-memory, JSON ファイル, reqwest, GitHub ステップ）
//! - **app**: オーケストレーターと診断

pub mod app;
pub mod domain;
pub mod github;
pub mod impls;
pub mod ports;
