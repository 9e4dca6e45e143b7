//! Orchestrator - 耐久ワークフローの実行
//!
//! # フロー
//! 1. `running` をジョブ台帳に書く（一度だけ）
//! 2. ステップログの先頭の未完了ステップを実行
//! 3. 出力をログに保存してから次へ
//! 4. 失敗したら Decider に聞く（retry なら `retry` → 待機 → `running`）
//! 5. 全ステップ完了で `done` を書き、結果を確定
//! 6. completion callback を一度だけ配送
//!
//! Every state change is saved before the next await that could crash the
//! process, so `resume_incomplete` can pick up any instance where it stopped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::completion::on_bootstrap_complete;
use super::pipeline::{StepRun, run_step};
use crate::domain::attempt::{AttemptRecord, DecisionRecord};
use crate::domain::decision::{Decider, Decision};
use crate::domain::errors::ErrorKind;
use crate::domain::ids::WorkflowId;
use crate::domain::outcome::{CompletionEvent, WorkflowResult};
use crate::domain::steps::BootstrapArgs;
use crate::domain::sync_job::{SyncJob, SyncJobState};
use crate::domain::workflow::{StepLogError, WorkflowInstance};
use crate::ports::clock::Clock;
use crate::ports::id_generator::IdGenerator;
use crate::ports::job_registry::{RegistryError, SyncJobRegistry};
use crate::ports::steps::BootstrapSteps;
use crate::ports::workflow_store::{StoreError, WorkflowStore};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("a bootstrap for '{lock_key}' is already running ({workflow_id})")]
    AlreadyRunning {
        lock_key: String,
        workflow_id: WorkflowId,
    },

    #[error("sync job '{lock_key}' already finished ({state}); use a new lock key")]
    JobFinished {
        lock_key: String,
        state: SyncJobState,
    },

    #[error("workflow {0} not found")]
    NotFound(WorkflowId),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    StepLog(#[from] StepLogError),

    #[error("workflow task panicked or was aborted: {0}")]
    Join(String),
}

type WorkflowTask = JoinHandle<Result<WorkflowResult, OrchestratorError>>;

/// A workflow this process is currently driving.
struct Live {
    lock_key: String,
    cancel_tx: watch::Sender<bool>,

    /// `None` while driven inline by `run_to_completion`.
    handle: Option<WorkflowTask>,
}

impl Live {
    fn is_active(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| !h.is_finished())
    }
}

pub(crate) struct Components {
    pub registry: Arc<dyn SyncJobRegistry>,
    pub store: Arc<dyn WorkflowStore>,
    pub steps: Arc<dyn BootstrapSteps>,
    pub decider: Arc<dyn Decider>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

struct Inner {
    c: Components,
    live: Mutex<HashMap<WorkflowId, Live>>,
}

/// Cheap to clone; clones share the same running set.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub(crate) fn new(components: Components) -> Self {
        Self {
            inner: Arc::new(Inner {
                c: components,
                live: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn live(&self) -> std::sync::MutexGuard<'_, HashMap<WorkflowId, Live>> {
        self.inner.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn registry(&self) -> Arc<dyn SyncJobRegistry> {
        Arc::clone(&self.inner.c.registry)
    }

    pub fn workflow_store(&self) -> Arc<dyn WorkflowStore> {
        Arc::clone(&self.inner.c.store)
    }

    /// Persist a new workflow instance and start driving it in the
    /// background. Returns as soon as the instance is saved.
    pub async fn start_bootstrap(
        &self,
        repository_id: i64,
        full_name: impl Into<String>,
        lock_key: impl Into<String>,
    ) -> Result<WorkflowId, OrchestratorError> {
        let args = BootstrapArgs {
            repository_id,
            full_name: full_name.into(),
            lock_key: lock_key.into(),
        };
        let workflow_id = self.inner.c.ids.generate_workflow_id();
        let lock_key = args.lock_key.clone();

        // Reserve the lock key before the first await.
        let cancel_rx = self.register(workflow_id, &lock_key)?;

        if let Err(e) = self.insert_instance(workflow_id, args).await {
            self.live().remove(&workflow_id);
            return Err(e);
        }

        info!(%workflow_id, lock_key = %lock_key, repository_id, "bootstrap started");
        self.spawn(workflow_id, cancel_rx);
        Ok(workflow_id)
    }

    /// Drive one instance on the current task until it settles.
    ///
    /// If the instance is already being driven in the background, this waits
    /// for that run instead of starting a second one.
    pub async fn run_to_completion(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<WorkflowResult, OrchestratorError> {
        let spawned = self
            .live()
            .get(&workflow_id)
            .is_some_and(|l| l.handle.is_some());
        if spawned {
            return self.wait(workflow_id).await;
        }

        let instance = self
            .inner
            .c
            .store
            .load(workflow_id)
            .await?
            .ok_or(OrchestratorError::NotFound(workflow_id))?;
        let cancel_rx = self.register(workflow_id, &instance.args.lock_key)?;

        let result = self.drive(workflow_id, cancel_rx).await;
        self.live().remove(&workflow_id);
        result
    }

    /// Respawn every instance that is not terminal or whose completion was
    /// never delivered. Call once at process start.
    pub async fn resume_incomplete(&self) -> Result<Vec<WorkflowId>, OrchestratorError> {
        let mut resumed = Vec::new();
        for instance in self.inner.c.store.list().await? {
            if instance.is_settled() {
                continue;
            }
            let workflow_id = instance.workflow_id;
            let already = self
                .live()
                .get(&workflow_id)
                .is_some_and(Live::is_active);
            if already {
                continue;
            }
            match self.register(workflow_id, &instance.args.lock_key) {
                Ok(cancel_rx) => {
                    info!(%workflow_id, cursor = instance.cursor, "resuming workflow");
                    self.spawn(workflow_id, cancel_rx);
                    resumed.push(workflow_id);
                }
                Err(OrchestratorError::AlreadyRunning { .. }) => {
                    warn!(%workflow_id, lock_key = %instance.args.lock_key, "another workflow holds the lock key, not resuming");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(resumed)
    }

    /// Request cancellation. Honored at the next step boundary or during a
    /// backoff wait; an in-flight upstream call finishes first.
    ///
    /// Returns `false` if the workflow already has a result.
    pub async fn cancel(&self, workflow_id: WorkflowId) -> Result<bool, OrchestratorError> {
        let mut instance = self
            .inner
            .c
            .store
            .load(workflow_id)
            .await?
            .ok_or(OrchestratorError::NotFound(workflow_id))?;
        if instance.result.is_some() {
            return Ok(false);
        }

        // A live run persists the flag itself; writing here would race its saves.
        let signaled = match self.live().get(&workflow_id) {
            Some(live) if live.is_active() => {
                let _ = live.cancel_tx.send(true);
                true
            }
            _ => false,
        };
        if !signaled {
            instance.cancel_requested = true;
            instance.updated_at = self.inner.c.clock.now();
            self.inner.c.store.save(&instance).await?;
        }
        info!(%workflow_id, signaled, "cancel requested");
        Ok(true)
    }

    /// Await a background run started by `start_bootstrap` or
    /// `resume_incomplete`. A settled instance returns its stored result.
    pub async fn wait(&self, workflow_id: WorkflowId) -> Result<WorkflowResult, OrchestratorError> {
        let handle = self
            .live()
            .get_mut(&workflow_id)
            .and_then(|l| l.handle.take());

        if let Some(handle) = handle {
            let joined = handle.await;
            self.live().remove(&workflow_id);
            return joined.map_err(|e| OrchestratorError::Join(e.to_string()))?;
        }

        let instance = self
            .inner
            .c
            .store
            .load(workflow_id)
            .await?
            .ok_or(OrchestratorError::NotFound(workflow_id))?;
        match instance.result {
            Some(result) if instance.completion_delivered => Ok(result),
            _ => Err(OrchestratorError::NotFound(workflow_id)),
        }
    }

    /// Write a job state. Unknown lock keys are a no-op (`Ok(None)`).
    pub(crate) async fn mark_sync_job(
        &self,
        lock_key: &str,
        state: SyncJobState,
        last_error: Option<String>,
    ) -> Result<Option<SyncJob>, RegistryError> {
        let now = self.inner.c.clock.now();
        let updated = self
            .inner
            .c
            .registry
            .mark(lock_key, state, last_error, now)
            .await?;
        match &updated {
            Some(job) => debug!(
                lock_key,
                state = %job.state,
                attempt_count = job.attempt_count,
                "sync job marked"
            ),
            None => debug!(lock_key, state = %state, "no sync job row, mark skipped"),
        }
        Ok(updated)
    }

    // ----------------------------------------------------------------
    // internals
    // ----------------------------------------------------------------

    fn register(
        &self,
        workflow_id: WorkflowId,
        lock_key: &str,
    ) -> Result<watch::Receiver<bool>, OrchestratorError> {
        let mut live = self.live();
        // Background runs nobody waited for.
        live.retain(|_, l| l.is_active());
        if let Some(existing) = live.get(&workflow_id) {
            if existing.is_active() {
                return Err(OrchestratorError::AlreadyRunning {
                    lock_key: lock_key.to_string(),
                    workflow_id,
                });
            }
        }
        if let Some((other_id, _)) = live
            .iter()
            .find(|(id, l)| **id != workflow_id && l.lock_key == lock_key && l.is_active())
        {
            return Err(OrchestratorError::AlreadyRunning {
                lock_key: lock_key.to_string(),
                workflow_id: *other_id,
            });
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        live.insert(
            workflow_id,
            Live {
                lock_key: lock_key.to_string(),
                cancel_tx,
                handle: None,
            },
        );
        Ok(cancel_rx)
    }

    fn spawn(&self, workflow_id: WorkflowId, cancel_rx: watch::Receiver<bool>) {
        let this = self.clone();
        let handle = tokio::spawn(async move { this.drive(workflow_id, cancel_rx).await });
        if let Some(live) = self.live().get_mut(&workflow_id) {
            live.handle = Some(handle);
        }
    }

    /// A finished job row cannot go back to `running`, so refuse it before
    /// anything is persisted.
    async fn insert_instance(
        &self,
        workflow_id: WorkflowId,
        args: BootstrapArgs,
    ) -> Result<(), OrchestratorError> {
        if let Some(job) = self.inner.c.registry.get(&args.lock_key).await? {
            if job.state.is_terminal() {
                return Err(OrchestratorError::JobFinished {
                    lock_key: args.lock_key,
                    state: job.state,
                });
            }
        }
        let instance = WorkflowInstance::new(workflow_id, args, self.inner.c.clock.now());
        self.inner.c.store.insert(&instance).await?;
        Ok(())
    }

    async fn save(&self, wf: &WorkflowInstance) -> Result<(), OrchestratorError> {
        self.inner.c.store.save(wf).await?;
        Ok(())
    }

    async fn drive(
        &self,
        workflow_id: WorkflowId,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> Result<WorkflowResult, OrchestratorError> {
        let mut wf = self
            .inner
            .c
            .store
            .load(workflow_id)
            .await?
            .ok_or(OrchestratorError::NotFound(workflow_id))?;
        let span = info_span!("workflow", %workflow_id, lock_key = %wf.args.lock_key);

        async move {
            let result = match wf.result.clone() {
                Some(result) => result,
                None => {
                    // A failed job write ends the run like a failed step.
                    let result = match self.execute(&mut wf, &mut cancel_rx).await {
                        Ok(result) => result,
                        Err(OrchestratorError::Registry(e)) => {
                            error!(error = %e, "sync job write failed");
                            WorkflowResult::error(e.to_string())
                        }
                        Err(e) => return Err(e),
                    };
                    wf.finish(result.clone(), self.inner.c.clock.now());
                    self.save(&wf).await?;
                    match &result {
                        WorkflowResult::Success => info!("workflow completed"),
                        WorkflowResult::Error { message } => error!(%message, "workflow failed"),
                        WorkflowResult::Canceled => info!("workflow canceled"),
                    }
                    result
                }
            };

            if !wf.completion_delivered {
                let event = CompletionEvent {
                    workflow_id,
                    result: result.clone(),
                    context: wf.context.clone(),
                };
                let delivered = on_bootstrap_complete(
                    self.inner.c.registry.as_ref(),
                    &event,
                    self.inner.c.clock.now(),
                )
                .await;
                match delivered {
                    Ok(()) => {}
                    // The row is in a state that can never take this write.
                    Err(RegistryError::InvalidTransition(e)) => {
                        warn!(error = %e, "completion write rejected, job left as is");
                    }
                    Err(e) => return Err(e.into()),
                }
                wf.completion_delivered = true;
                self.save(&wf).await?;
            }
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Run the remaining steps and produce the terminal result.
    async fn execute(
        &self,
        wf: &mut WorkflowInstance,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Result<WorkflowResult, OrchestratorError> {
        let lock_key = wf.args.lock_key.clone();

        if !wf.running_marked {
            self.mark_sync_job(&lock_key, SyncJobState::Running, None)
                .await?;
            wf.running_marked = true;
            self.save(wf).await?;
        } else if let Some(job) = self.inner.c.registry.get(&lock_key).await? {
            // Interrupted during a backoff wait.
            if job.state == SyncJobState::Retry {
                self.mark_sync_job(&lock_key, SyncJobState::Running, None)
                    .await?;
            }
        }

        loop {
            if wf.cancel_requested || *cancel_rx.borrow() {
                wf.cancel_requested = true;
                return Ok(WorkflowResult::Canceled);
            }
            let Some(step) = wf.next_step() else {
                break;
            };

            let outcome = run_step(self.inner.c.steps.as_ref(), wf, step)
                .instrument(info_span!("step", step = %step))
                .await;
            let now = self.inner.c.clock.now();

            let err = match outcome {
                Ok(StepRun::Completed(output)) => {
                    wf.complete_step(step, output, now)?;
                    self.save(wf).await?;
                    info!(%step, "step completed");
                    continue;
                }
                Ok(StepRun::Skipped) => {
                    wf.skip_step(step, now)?;
                    self.save(wf).await?;
                    info!(%step, "step skipped, nothing to do");
                    continue;
                }
                Err(err) => err,
            };

            let failure = err.observe();
            let attempt = AttemptRecord {
                attempt_id: self.inner.c.ids.generate_attempt_id(),
                step,
                kind: failure.kind,
                message: failure.message.clone(),
                failed_at: now,
            };
            let trigger = attempt.attempt_id;
            let entry = wf.record_failure(attempt)?.clone();
            let decision = self.inner.c.decider.decide(&entry, &failure);

            let (delay_ms, reason) = match &decision {
                Decision::Retry { delay, reason } => (Some(delay.as_millis() as u64), reason),
                Decision::MarkFailed { reason } => (None, reason),
            };
            wf.record_decision(DecisionRecord::new(
                step,
                trigger,
                policy_name(failure.kind),
                decision.as_str(),
                Some(json!({
                    "kind": failure.kind,
                    "attempts": entry.attempts,
                    "rate_limit_waits": entry.rate_limit_waits,
                    "delay_ms": delay_ms,
                    "reason": reason,
                })),
                now,
            ));
            self.save(wf).await?;

            match decision {
                Decision::Retry { delay, reason } => {
                    warn!(
                        %step,
                        kind = ?failure.kind,
                        attempt = entry.attempts,
                        rate_limit_waits = entry.rate_limit_waits,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        error = %failure.message,
                        "step failed, retry scheduled"
                    );
                    self.mark_sync_job(&lock_key, SyncJobState::Retry, Some(failure.message))
                        .await?;
                    if wait_or_cancel(delay, cancel_rx).await {
                        wf.cancel_requested = true;
                        return Ok(WorkflowResult::Canceled);
                    }
                    self.mark_sync_job(&lock_key, SyncJobState::Running, None)
                        .await?;
                }
                Decision::MarkFailed { reason } => {
                    error!(
                        %step,
                        kind = ?failure.kind,
                        %reason,
                        error = %failure.message,
                        "step failed permanently"
                    );
                    return Ok(WorkflowResult::error(failure.message));
                }
            }
        }

        // Already written if the process died before the result was saved.
        let done = self
            .inner
            .c
            .registry
            .get(&lock_key)
            .await?
            .is_some_and(|job| job.state == SyncJobState::Done);
        if !done {
            self.mark_sync_job(&lock_key, SyncJobState::Done, None)
                .await?;
        }
        Ok(WorkflowResult::Success)
    }
}

fn policy_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::RateLimited => "rate_limit",
        ErrorKind::Auth | ErrorKind::Permanent => "fatal_error",
        ErrorKind::Transient | ErrorKind::Malformed => "retry_policy",
    }
}

/// Sleep for `delay` unless cancellation arrives first. Returns `true` if
/// canceled.
async fn wait_or_cancel(delay: Duration, cancel_rx: &mut watch::Receiver<bool>) -> bool {
    if *cancel_rx.borrow() {
        return true;
    }
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = cancel_rx.changed() => {
                if changed.is_err() {
                    // Sender gone: nobody can cancel any more.
                    (&mut sleep).await;
                    return false;
                }
                if *cancel_rx.borrow() {
                    return true;
                }
            }
        }
    }
}
