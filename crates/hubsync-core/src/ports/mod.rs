//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。
//! 各 trait は外部システム（GitHub API, ストレージ, トークン発行）への
//! インターフェースを提供し、実装の詳細を隠蔽する。
//! 実装は `impls` にある。

pub mod clock;
pub mod id_generator;
pub mod job_registry;
pub mod projection;
pub mod steps;
pub mod token_provider;
pub mod transport;
pub mod workflow_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_registry::{RegistryError, SyncJobRegistry};
pub use self::projection::{ProjectionCounts, ProjectionError, ProjectionStore};
pub use self::steps::{BootstrapSteps, FileSyncScheduler, StepError};
pub use self::token_provider::{TokenError, TokenProvider};
pub use self::transport::{HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
pub use self::workflow_store::{StoreError, WorkflowStore};
