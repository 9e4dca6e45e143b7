//! Bootstrap workflow scenarios against fake step executors.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ulid::Ulid;

use hubsync_core::app::{Orchestrator, OrchestratorBuilder, OrchestratorError};
use hubsync_core::domain::steps::{
    BootstrapArgs, BranchesOutput, CheckRunsOutput, CommitsOutput, FileSyncFanOut, IssuesOutput,
    OpenPrSyncTarget, PullRequestsOutput, StepName, WorkflowRunsOutput,
};
use hubsync_core::domain::{
    DefaultDecider, RetryPolicy, SyncJob, SyncJobState, WorkflowId, WorkflowInstance,
    WorkflowResult, WorkflowStatus,
};
use hubsync_core::github::ApiError;
use hubsync_core::impls::{InMemorySyncJobRegistry, InMemoryWorkflowStore, JsonFileStore};
use hubsync_core::ports::{
    BootstrapSteps, RegistryError, StepError, SyncJobRegistry, WorkflowStore,
};

// ----------------------------------------------------------------------------
// fakes
// ----------------------------------------------------------------------------

fn target(number: u64, sha: &str) -> OpenPrSyncTarget {
    OpenPrSyncTarget {
        number,
        head_sha: sha.to_string(),
    }
}

/// Upstream with fixed data. Failures are scripted per step and consumed in
/// order; once a step's script is empty it succeeds.
#[derive(Default)]
struct FakeSteps {
    open_prs: Vec<OpenPrSyncTarget>,
    calls: Mutex<Vec<StepName>>,
    check_run_shas: Mutex<Vec<Vec<String>>>,
    fan_out_targets: Mutex<Vec<Vec<OpenPrSyncTarget>>>,
    failures: Mutex<HashMap<StepName, VecDeque<StepError>>>,

    /// Fail this step with a transient error on every call.
    always_fail: Option<StepName>,
}

impl FakeSteps {
    fn acme() -> Self {
        Self {
            open_prs: vec![target(1, "sha-a"), target(2, "sha-b"), target(3, "sha-a")],
            ..Self::default()
        }
    }

    fn fail_once(self, step: StepName, err: StepError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(step)
            .or_default()
            .push_back(err);
        self
    }

    fn always_failing(mut self, step: StepName) -> Self {
        self.always_fail = Some(step);
        self
    }

    fn enter(&self, step: StepName) -> Result<(), StepError> {
        self.calls.lock().unwrap().push(step);
        if self.always_fail == Some(step) {
            return Err(StepError::transient("upstream unavailable"));
        }
        match self.failures.lock().unwrap().get_mut(&step).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn calls(&self) -> Vec<StepName> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BootstrapSteps for FakeSteps {
    async fn fetch_branches(&self, _: &BootstrapArgs) -> Result<BranchesOutput, StepError> {
        self.enter(StepName::FetchBranches)?;
        Ok(BranchesOutput { count: 2 })
    }

    async fn fetch_pull_requests(
        &self,
        _: &BootstrapArgs,
    ) -> Result<PullRequestsOutput, StepError> {
        self.enter(StepName::FetchPullRequests)?;
        Ok(PullRequestsOutput {
            count: self.open_prs.len(),
            open_pr_sync_targets: self.open_prs.clone(),
        })
    }

    async fn fetch_issues(&self, _: &BootstrapArgs) -> Result<IssuesOutput, StepError> {
        self.enter(StepName::FetchIssues)?;
        Ok(IssuesOutput { count: 5 })
    }

    async fn fetch_commits(&self, _: &BootstrapArgs) -> Result<CommitsOutput, StepError> {
        self.enter(StepName::FetchCommits)?;
        Ok(CommitsOutput { count: 10 })
    }

    async fn fetch_check_runs(
        &self,
        _: &BootstrapArgs,
        head_shas: &[String],
    ) -> Result<CheckRunsOutput, StepError> {
        self.enter(StepName::FetchCheckRuns)?;
        self.check_run_shas.lock().unwrap().push(head_shas.to_vec());
        Ok(CheckRunsOutput {
            count: head_shas.len(),
        })
    }

    async fn fetch_workflow_runs(
        &self,
        _: &BootstrapArgs,
    ) -> Result<WorkflowRunsOutput, StepError> {
        self.enter(StepName::FetchWorkflowRuns)?;
        Ok(WorkflowRunsOutput { runs: 1, jobs: 2 })
    }

    async fn schedule_pr_file_syncs(
        &self,
        _: &BootstrapArgs,
        targets: &[OpenPrSyncTarget],
    ) -> Result<FileSyncFanOut, StepError> {
        self.enter(StepName::SchedulePrFileSyncs)?;
        self.fan_out_targets.lock().unwrap().push(targets.to_vec());
        Ok(FileSyncFanOut {
            scheduled: targets.len(),
        })
    }
}

/// Registry that remembers every state it successfully wrote.
#[derive(Default)]
struct RecordingRegistry {
    inner: InMemorySyncJobRegistry,
    history: Mutex<Vec<SyncJobState>>,

    /// Writes of this state fail with an I/O error.
    broken_state: Mutex<Option<SyncJobState>>,
}

impl RecordingRegistry {
    fn history(&self) -> Vec<SyncJobState> {
        self.history.lock().unwrap().clone()
    }

    fn break_writes_of(&self, state: SyncJobState) {
        *self.broken_state.lock().unwrap() = Some(state);
    }
}

#[async_trait]
impl SyncJobRegistry for RecordingRegistry {
    async fn create(&self, job: SyncJob) -> Result<(), RegistryError> {
        self.inner.create(job).await
    }

    async fn get(&self, lock_key: &str) -> Result<Option<SyncJob>, RegistryError> {
        self.inner.get(lock_key).await
    }

    async fn mark(
        &self,
        lock_key: &str,
        state: SyncJobState,
        last_error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncJob>, RegistryError> {
        if *self.broken_state.lock().unwrap() == Some(state) {
            return Err(RegistryError::Io(std::io::Error::other("disk full")));
        }
        let updated = self.inner.mark(lock_key, state, last_error, now).await?;
        if updated.is_some() {
            self.history.lock().unwrap().push(state);
        }
        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<SyncJob>, RegistryError> {
        self.inner.list().await
    }
}

struct Harness {
    orchestrator: Orchestrator,
    registry: Arc<RecordingRegistry>,
    store: Arc<InMemoryWorkflowStore>,
    steps: Arc<FakeSteps>,
}

fn decider(base: Duration, max_attempts: u32) -> DefaultDecider {
    DefaultDecider::new(
        RetryPolicy::new(base, 2.0, Duration::from_secs(300)),
        max_attempts,
        50,
    )
}

async fn harness(steps: FakeSteps, decider: DefaultDecider) -> Harness {
    let registry = Arc::new(RecordingRegistry::default());
    registry
        .create(SyncJob::bootstrap("k1", Utc::now()))
        .await
        .unwrap();
    let store = Arc::new(InMemoryWorkflowStore::new());
    let steps = Arc::new(steps);
    let orchestrator = OrchestratorBuilder::new()
        .registry(registry.clone())
        .workflow_store(store.clone())
        .steps(steps.clone())
        .decider(Arc::new(decider))
        .build()
        .unwrap();
    Harness {
        orchestrator,
        registry,
        store,
        steps,
    }
}

async fn job(h: &Harness) -> SyncJob {
    h.registry.get("k1").await.unwrap().unwrap()
}

async fn wait_for_state(h: &Harness, state: SyncJobState) {
    for _ in 0..1_000 {
        if job(h).await.state == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("job never reached {state}");
}

fn acme_args() -> BootstrapArgs {
    BootstrapArgs {
        repository_id: 42,
        full_name: "acme/widgets".into(),
        lock_key: "k1".into(),
    }
}

// ----------------------------------------------------------------------------
// scenarios
// ----------------------------------------------------------------------------

#[tokio::test]
async fn bootstrap_runs_every_step_and_marks_done() {
    let h = harness(FakeSteps::acme(), DefaultDecider::default()).await;

    let id = h
        .orchestrator
        .start_bootstrap(42, "acme/widgets", "k1")
        .await
        .unwrap();
    let result = h.orchestrator.wait(id).await.unwrap();
    assert_eq!(result, WorkflowResult::Success);

    assert_eq!(h.steps.calls(), StepName::PIPELINE.to_vec());
    assert_eq!(
        *h.steps.check_run_shas.lock().unwrap(),
        vec![vec!["sha-a".to_string(), "sha-b".to_string()]]
    );
    let fan_out = h.steps.fan_out_targets.lock().unwrap().clone();
    assert_eq!(fan_out.len(), 1);
    assert_eq!(fan_out[0].len(), 3);

    let job = job(&h).await;
    assert_eq!(job.state, SyncJobState::Done);
    assert_eq!(job.attempt_count, 2);
    assert_eq!(job.last_error, None);
    assert_eq!(
        h.registry.history(),
        vec![SyncJobState::Running, SyncJobState::Done]
    );

    let wf = h.store.load(id).await.unwrap().unwrap();
    assert_eq!(wf.status, WorkflowStatus::Completed);
    assert!(wf.completion_delivered);
    assert_eq!(wf.cursor, wf.steps.len());
    assert!(wf.attempts.is_empty());
}

#[tokio::test]
async fn resumed_workflow_skips_recorded_steps() {
    let h = harness(FakeSteps::acme(), DefaultDecider::default()).await;

    // Steps 1-3 finished in an earlier process, which then died.
    let id = WorkflowId::from(Ulid::new());
    let mut wf = WorkflowInstance::new(id, acme_args(), Utc::now());
    let recorded = PullRequestsOutput {
        count: 1,
        open_pr_sync_targets: vec![target(9, "sha-recorded")],
    };
    wf.complete_step(StepName::FetchBranches, serde_json::json!({"count": 2}), Utc::now())
        .unwrap();
    wf.complete_step(
        StepName::FetchPullRequests,
        serde_json::to_value(&recorded).unwrap(),
        Utc::now(),
    )
    .unwrap();
    wf.complete_step(StepName::FetchIssues, serde_json::json!({"count": 5}), Utc::now())
        .unwrap();
    wf.running_marked = true;
    h.store.insert(&wf).await.unwrap();
    h.registry
        .mark("k1", SyncJobState::Running, None, Utc::now())
        .await
        .unwrap();

    let result = h.orchestrator.run_to_completion(id).await.unwrap();
    assert_eq!(result, WorkflowResult::Success);

    assert_eq!(
        h.steps.calls(),
        vec![
            StepName::FetchCommits,
            StepName::FetchCheckRuns,
            StepName::FetchWorkflowRuns,
            StepName::SchedulePrFileSyncs,
        ]
    );
    assert_eq!(
        *h.steps.check_run_shas.lock().unwrap(),
        vec![vec!["sha-recorded".to_string()]]
    );
    assert_eq!(
        *h.steps.fan_out_targets.lock().unwrap(),
        vec![vec![target(9, "sha-recorded")]]
    );
    assert_eq!(job(&h).await.state, SyncJobState::Done);
    assert_eq!(job(&h).await.attempt_count, 2);
}

#[tokio::test]
async fn no_open_pull_requests_skips_check_runs_and_fan_out() {
    let h = harness(FakeSteps::default(), DefaultDecider::default()).await;

    let id = h
        .orchestrator
        .start_bootstrap(42, "acme/widgets", "k1")
        .await
        .unwrap();
    assert_eq!(h.orchestrator.wait(id).await.unwrap(), WorkflowResult::Success);

    let calls = h.steps.calls();
    assert!(!calls.contains(&StepName::FetchCheckRuns));
    assert!(!calls.contains(&StepName::SchedulePrFileSyncs));
    assert!(calls.contains(&StepName::FetchWorkflowRuns));

    let wf = h.store.load(id).await.unwrap().unwrap();
    for step in [StepName::FetchCheckRuns, StepName::SchedulePrFileSyncs] {
        let entry = wf.entry(step).unwrap();
        assert!(entry.completed && entry.skipped, "{step} should be skipped");
    }
    assert_eq!(job(&h).await.state, SyncJobState::Done);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_then_success_records_retry() {
    let steps = FakeSteps::acme().fail_once(
        StepName::FetchIssues,
        StepError::transient("connection reset"),
    );
    let h = harness(steps, decider(Duration::from_secs(2), 5)).await;

    let id = h
        .orchestrator
        .start_bootstrap(42, "acme/widgets", "k1")
        .await
        .unwrap();
    assert_eq!(h.orchestrator.wait(id).await.unwrap(), WorkflowResult::Success);

    assert_eq!(
        h.registry.history(),
        vec![
            SyncJobState::Running,
            SyncJobState::Retry,
            SyncJobState::Running,
            SyncJobState::Done,
        ]
    );
    let job = job(&h).await;
    assert_eq!(job.attempt_count, 4);
    assert_eq!(job.last_error, None);

    let wf = h.store.load(id).await.unwrap().unwrap();
    assert_eq!(wf.attempts.len(), 1);
    assert_eq!(wf.attempts[0].step, StepName::FetchIssues);
    assert_eq!(wf.decisions.len(), 1);
    assert_eq!(wf.decisions[0].policy, "retry_policy");
    assert_eq!(wf.decisions[0].decision, "schedule_retry");
    assert_eq!(wf.decisions[0].trigger, wf.attempts[0].attempt_id);
    let issues = wf.entry(StepName::FetchIssues).unwrap();
    assert_eq!(issues.attempts, 1);
    assert_eq!(issues.last_error.as_deref(), Some("connection reset"));
}

#[tokio::test]
async fn auth_error_fails_without_retry() {
    let steps = FakeSteps::acme().fail_once(StepName::FetchBranches, StepError::auth("Bad credentials"));
    let h = harness(steps, DefaultDecider::default()).await;

    let id = h
        .orchestrator
        .start_bootstrap(42, "acme/widgets", "k1")
        .await
        .unwrap();
    let result = h.orchestrator.wait(id).await.unwrap();
    assert_eq!(result, WorkflowResult::error("Bad credentials"));

    assert_eq!(h.steps.calls(), vec![StepName::FetchBranches]);
    assert_eq!(
        h.registry.history(),
        vec![SyncJobState::Running, SyncJobState::Failed]
    );
    let job = job(&h).await;
    assert_eq!(job.state, SyncJobState::Failed);
    assert_eq!(job.last_error.as_deref(), Some("Bad credentials"));

    let wf = h.store.load(id).await.unwrap().unwrap();
    assert_eq!(wf.status, WorkflowStatus::Failed);
    assert_eq!(wf.decisions[0].policy, "fatal_error");
    assert_eq!(wf.decisions[0].decision, "mark_failed");
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_with_last_error() {
    let steps = FakeSteps::acme().always_failing(StepName::FetchCommits);
    let h = harness(steps, decider(Duration::from_secs(1), 3)).await;

    let id = h
        .orchestrator
        .start_bootstrap(42, "acme/widgets", "k1")
        .await
        .unwrap();
    let result = h.orchestrator.wait(id).await.unwrap();
    assert_eq!(result, WorkflowResult::error("upstream unavailable"));

    let commits = h
        .steps
        .calls()
        .into_iter()
        .filter(|s| *s == StepName::FetchCommits)
        .count();
    assert_eq!(commits, 3);

    let job = job(&h).await;
    assert_eq!(job.state, SyncJobState::Failed);
    assert_eq!(job.last_error.as_deref(), Some("upstream unavailable"));
    // running, (retry, running) x2, failed
    assert_eq!(job.attempt_count, 6);

    let wf = h.store.load(id).await.unwrap().unwrap();
    assert_eq!(wf.entry(StepName::FetchCommits).unwrap().attempts, 3);
    assert_eq!(wf.decisions.last().unwrap().decision, "mark_failed");
}

#[tokio::test(start_paused = true)]
async fn rate_limit_waits_do_not_use_attempt_budget() {
    let limited = || {
        StepError::from(ApiError::RateLimited {
            status: 429,
            message: "GitHub rate limit hit (429). Retry after 30s.".into(),
            url: "https://api.github.com/repos/acme/widgets/commits".into(),
            retry_after_ms: 30_000,
        })
    };
    let steps = FakeSteps::acme()
        .fail_once(StepName::FetchCommits, limited())
        .fail_once(StepName::FetchCommits, limited());
    // One transient attempt allowed; the two rate-limit waits must not count.
    let h = harness(steps, decider(Duration::from_secs(1), 1)).await;

    let start = tokio::time::Instant::now();
    let id = h
        .orchestrator
        .start_bootstrap(42, "acme/widgets", "k1")
        .await
        .unwrap();
    assert_eq!(h.orchestrator.wait(id).await.unwrap(), WorkflowResult::Success);
    assert!(start.elapsed() >= Duration::from_secs(60));

    let wf = h.store.load(id).await.unwrap().unwrap();
    let commits = wf.entry(StepName::FetchCommits).unwrap();
    assert_eq!(commits.attempts, 0);
    assert_eq!(commits.rate_limit_waits, 2);
    assert_eq!(wf.decisions[0].policy, "rate_limit");
    let context = wf.decisions[0].context.clone().unwrap();
    assert_eq!(context["delay_ms"], 30_000);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_marks_job_failed() {
    let steps = FakeSteps::acme().always_failing(StepName::FetchBranches);
    let h = harness(steps, decider(Duration::from_secs(60), 5)).await;

    let id = h
        .orchestrator
        .start_bootstrap(42, "acme/widgets", "k1")
        .await
        .unwrap();
    wait_for_state(&h, SyncJobState::Retry).await;

    assert!(h.orchestrator.cancel(id).await.unwrap());
    let result = h.orchestrator.wait(id).await.unwrap();
    assert_eq!(result, WorkflowResult::Canceled);

    let job = job(&h).await;
    assert_eq!(job.state, SyncJobState::Failed);
    assert_eq!(job.last_error.as_deref(), Some("Workflow canceled"));
    assert_eq!(
        h.registry.history(),
        vec![
            SyncJobState::Running,
            SyncJobState::Retry,
            SyncJobState::Failed,
        ]
    );
    assert_eq!(h.steps.calls(), vec![StepName::FetchBranches]);

    let wf = h.store.load(id).await.unwrap().unwrap();
    assert_eq!(wf.status, WorkflowStatus::Canceled);
    assert!(wf.cancel_requested);

    // Already finished: a second cancel is refused.
    assert!(!h.orchestrator.cancel(id).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn second_bootstrap_for_same_lock_key_is_rejected() {
    let steps = FakeSteps::acme().always_failing(StepName::FetchBranches);
    let h = harness(steps, decider(Duration::from_secs(60), 5)).await;

    let first = h
        .orchestrator
        .start_bootstrap(42, "acme/widgets", "k1")
        .await
        .unwrap();
    let second = h.orchestrator.start_bootstrap(42, "acme/widgets", "k1").await;
    assert!(matches!(
        second,
        Err(OrchestratorError::AlreadyRunning { workflow_id, .. }) if workflow_id == first
    ));

    h.orchestrator.cancel(first).await.unwrap();
    assert_eq!(
        h.orchestrator.wait(first).await.unwrap(),
        WorkflowResult::Canceled
    );
}

#[tokio::test]
async fn unknown_lock_key_leaves_registry_empty() {
    let registry = Arc::new(InMemorySyncJobRegistry::new());
    let orchestrator = OrchestratorBuilder::new()
        .registry(registry.clone())
        .workflow_store(Arc::new(InMemoryWorkflowStore::new()))
        .steps(Arc::new(FakeSteps::acme()))
        .build()
        .unwrap();

    let id = orchestrator
        .start_bootstrap(42, "acme/widgets", "nobody")
        .await
        .unwrap();
    assert_eq!(orchestrator.wait(id).await.unwrap(), WorkflowResult::Success);
    assert!(registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn resume_delivers_pending_completion_only() {
    let h = harness(FakeSteps::acme(), DefaultDecider::default()).await;
    h.registry
        .mark("k1", SyncJobState::Running, None, Utc::now())
        .await
        .unwrap();

    // Finished but crashed before the completion reached the registry.
    let id = WorkflowId::from(Ulid::new());
    let mut wf = WorkflowInstance::new(id, acme_args(), Utc::now());
    wf.running_marked = true;
    wf.finish(WorkflowResult::error("boom"), Utc::now());
    h.store.insert(&wf).await.unwrap();

    let resumed = h.orchestrator.resume_incomplete().await.unwrap();
    assert_eq!(resumed, vec![id]);
    assert_eq!(
        h.orchestrator.wait(id).await.unwrap(),
        WorkflowResult::error("boom")
    );

    assert!(h.steps.calls().is_empty());
    let job = job(&h).await;
    assert_eq!(job.state, SyncJobState::Failed);
    assert_eq!(job.last_error.as_deref(), Some("boom"));
    assert!(h.store.load(id).await.unwrap().unwrap().is_settled());

    // Nothing left to do the second time round.
    assert!(h.orchestrator.resume_incomplete().await.unwrap().is_empty());
}

#[tokio::test]
async fn json_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        store
            .create(SyncJob::bootstrap("k1", Utc::now()))
            .await
            .unwrap();
        let orchestrator = OrchestratorBuilder::new()
            .registry(store.clone())
            .workflow_store(store.clone())
            .steps(Arc::new(FakeSteps::acme()))
            .build()
            .unwrap();
        let id = orchestrator
            .start_bootstrap(42, "acme/widgets", "k1")
            .await
            .unwrap();
        assert_eq!(orchestrator.wait(id).await.unwrap(), WorkflowResult::Success);
        id
    };

    let reopened = JsonFileStore::open(dir.path()).await.unwrap();
    let job = reopened.get("k1").await.unwrap().unwrap();
    assert_eq!(job.state, SyncJobState::Done);
    assert_eq!(job.attempt_count, 2);

    let wf = reopened.load(id).await.unwrap().unwrap();
    assert!(wf.is_settled());
    assert_eq!(wf.result, Some(WorkflowResult::Success));
    assert_eq!(WorkflowStore::list(&reopened).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_lock_key_cannot_be_restarted() {
    let h = harness(FakeSteps::acme(), DefaultDecider::default()).await;
    h.registry
        .mark("k1", SyncJobState::Running, None, Utc::now())
        .await
        .unwrap();
    h.registry
        .mark("k1", SyncJobState::Failed, Some("boom".into()), Utc::now())
        .await
        .unwrap();

    let err = h
        .orchestrator
        .start_bootstrap(42, "acme/widgets", "k1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::JobFinished { ref lock_key, state: SyncJobState::Failed } if lock_key == "k1"
    ));

    // Nothing persisted, so nothing to resume.
    assert!(WorkflowStore::list(h.store.as_ref()).await.unwrap().is_empty());
    assert!(h.orchestrator.resume_incomplete().await.unwrap().is_empty());
    assert!(h.steps.calls().is_empty());

    let job = job(&h).await;
    assert_eq!(job.state, SyncJobState::Failed);
    assert_eq!(job.last_error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn job_write_failure_settles_workflow_with_error() {
    let h = harness(FakeSteps::acme(), DefaultDecider::default()).await;
    h.registry.break_writes_of(SyncJobState::Running);

    let id = h
        .orchestrator
        .start_bootstrap(42, "acme/widgets", "k1")
        .await
        .unwrap();
    let result = h.orchestrator.wait(id).await.unwrap();
    assert!(matches!(
        &result,
        WorkflowResult::Error { message } if message.contains("disk full")
    ));
    assert!(h.steps.calls().is_empty());

    let wf = h.store.load(id).await.unwrap().unwrap();
    assert_eq!(wf.status, WorkflowStatus::Failed);
    assert_eq!(wf.result.as_ref(), Some(&result));
    assert!(wf.completion_delivered);
    assert!(wf.is_settled());
    assert!(h.orchestrator.resume_incomplete().await.unwrap().is_empty());

    // pending -> failed is not a legal write, so the row stays untouched.
    assert_eq!(job(&h).await.state, SyncJobState::Pending);
    assert!(h.registry.history().is_empty());
}

#[tokio::test]
async fn resumed_run_does_not_rewrite_done() {
    let h = harness(FakeSteps::acme(), DefaultDecider::default()).await;

    // Every step and the `done` write happened, then the process died
    // before the result was saved.
    let id = WorkflowId::from(Ulid::new());
    let mut wf = WorkflowInstance::new(id, acme_args(), Utc::now());
    for step in StepName::PIPELINE {
        wf.complete_step(step, serde_json::json!({}), Utc::now())
            .unwrap();
    }
    wf.running_marked = true;
    h.store.insert(&wf).await.unwrap();
    h.registry
        .mark("k1", SyncJobState::Running, None, Utc::now())
        .await
        .unwrap();
    h.registry
        .mark("k1", SyncJobState::Done, None, Utc::now())
        .await
        .unwrap();

    let result = h.orchestrator.run_to_completion(id).await.unwrap();
    assert_eq!(result, WorkflowResult::Success);
    assert!(h.steps.calls().is_empty());

    let job = job(&h).await;
    assert_eq!(job.state, SyncJobState::Done);
    assert_eq!(job.attempt_count, 2);
    assert_eq!(
        h.registry.history(),
        vec![SyncJobState::Running, SyncJobState::Done]
    );
    assert!(h.store.load(id).await.unwrap().unwrap().is_settled());
}
