//! OrchestratorBuilder - ワイヤリング
//!
//! 必須コンポーネント（registry / workflow store / steps）が欠けていれば
//! build() 時にまとめて BuildError を返す（Fail-fast）。
//! 任意コンポーネントはデフォルト実装で埋める。

use std::sync::Arc;

use crate::app::orchestrator::{Components, Orchestrator};
use crate::domain::decision::{Decider, DefaultDecider};
use crate::ports::clock::{Clock, SystemClock};
use crate::ports::id_generator::{IdGenerator, UlidGenerator};
use crate::ports::job_registry::SyncJobRegistry;
use crate::ports::steps::BootstrapSteps;
use crate::ports::workflow_store::WorkflowStore;

/// # 使用例
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .registry(store.clone())
///     .workflow_store(store)
///     .steps(Arc::new(steps))
///     .build()?;
/// ```
#[derive(Default)]
pub struct OrchestratorBuilder {
    registry: Option<Arc<dyn SyncJobRegistry>>,
    store: Option<Arc<dyn WorkflowStore>>,
    steps: Option<Arc<dyn BootstrapSteps>>,
    decider: Option<Arc<dyn Decider>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be set before build().")]
    MissingComponent(Vec<&'static str>),
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Arc<dyn SyncJobRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn workflow_store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn steps(mut self, steps: Arc<dyn BootstrapSteps>) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Default: `DefaultDecider::default()` (5 attempts, 2s base backoff).
    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<Orchestrator, BuildError> {
        let mut missing = Vec::new();
        if self.registry.is_none() {
            missing.push("registry");
        }
        if self.store.is_none() {
            missing.push("workflow_store");
        }
        if self.steps.is_none() {
            missing.push("steps");
        }

        let (Some(registry), Some(store), Some(steps)) = (self.registry, self.store, self.steps)
        else {
            return Err(BuildError::MissingComponent(missing));
        };

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::default()));

        Ok(Orchestrator::new(Components {
            registry,
            store,
            steps,
            decider,
            clock,
            ids,
        }))
    }
}
