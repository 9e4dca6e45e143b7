//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use ulid::Ulid;

use crate::domain::ids::{AttemptId, WorkflowId};
use crate::ports::Clock;

/// IdGenerator は時刻でソート可能な ID を生成
pub trait IdGenerator: Send + Sync {
    fn generate_workflow_id(&self) -> WorkflowId;

    fn generate_attempt_id(&self) -> AttemptId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って timestamp 部分を決めるので、FixedClock を渡せば
/// timestamp が決定的になる（ランダム部分は毎回異なる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_workflow_id(&self) -> WorkflowId {
        WorkflowId::from(self.next_ulid())
    }

    fn generate_attempt_id(&self) -> AttemptId {
        AttemptId::from(self.next_ulid())
    }
}
