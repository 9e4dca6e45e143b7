mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use serde::Serialize;
use tracing::{info, warn};

use hubsync_core::app::{Orchestrator, OrchestratorBuilder, StatusService};
use hubsync_core::domain::{SyncJob, WorkflowId, WorkflowResult};
use hubsync_core::github::ApiClient;
use hubsync_core::impls::{
    GitHubBootstrapSteps, InMemoryFileSyncQueue, InMemoryProjection, InstallationTokenProvider,
    JsonFileStore, ReqwestTransport, Rs256Signer, StaticTokenProvider,
};
use hubsync_core::ports::{
    Clock, HttpTransport, ProjectionStore, SyncJobRegistry, SystemClock, TokenProvider,
    WorkflowStore,
};

use crate::config::{Config, Credential};

/// hubsync - mirror a GitHub repository into local state
#[derive(Parser, Debug)]
#[command(name = "hubsync", version, about)]
struct Cli {
    /// Config file (default: ./hubsync.toml if present)
    #[arg(long, global = true, env = "HUBSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a bootstrap sync for one repository
    Bootstrap {
        #[arg(long)]
        repository_id: i64,

        /// owner/name
        #[arg(long)]
        full_name: String,

        /// Sync job key; one live bootstrap per key
        #[arg(long)]
        lock_key: String,

        #[arg(long, default_value = "manual")]
        trigger_reason: String,

        /// Stay attached until the workflow finishes (Ctrl+C cancels)
        #[arg(long)]
        wait: bool,
    },
    /// Continue every workflow that has not finished
    Resume,
    /// List sync jobs
    Status,
    /// Row counts per table
    Counts,
    /// Check that the stores are readable
    Health,
    /// Step log, attempts and decisions of one workflow
    History { workflow_id: WorkflowId },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init(&config.logging);

    let store = Arc::new(
        JsonFileStore::open(&config.storage.state_dir)
            .await
            .with_context(|| format!("opening state dir {}", config.storage.state_dir.display()))?,
    );
    let projection = Arc::new(InMemoryProjection::new());
    let status = StatusService::new(store.clone(), store.clone(), projection.clone());

    match cli.command {
        Command::Bootstrap {
            repository_id,
            full_name,
            lock_key,
            trigger_reason,
            wait,
        } => {
            let orchestrator = build_orchestrator(&config, store.clone(), projection).await?;

            if store.get(&lock_key).await?.is_none() {
                let job = SyncJob::new(&lock_key, "bootstrap", trigger_reason, SystemClock.now());
                store.create(job).await?;
                info!(lock_key = %lock_key, "sync job created");
            }

            let workflow_id = orchestrator
                .start_bootstrap(repository_id, full_name, lock_key)
                .await?;
            println!("{workflow_id}");

            if wait {
                let result = wait_or_interrupt(&orchestrator, workflow_id).await?;
                print_json(&result)?;
                print_json(&status.table_counts().await?)?;
                if !matches!(result, WorkflowResult::Success) {
                    std::process::exit(1);
                }
            } else {
                eprintln!("started; run `hubsync resume` to drive it to completion");
            }
        }
        Command::Resume => {
            let orchestrator = build_orchestrator(&config, store.clone(), projection).await?;
            let resumed = orchestrator.resume_incomplete().await?;
            if resumed.is_empty() {
                eprintln!("nothing to resume");
            }
            let mut failed = 0usize;
            for workflow_id in resumed {
                let result = wait_or_interrupt(&orchestrator, workflow_id).await?;
                println!("{workflow_id} {}", result.kind());
                if !matches!(result, WorkflowResult::Success) {
                    failed += 1;
                }
            }
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Command::Status => print_json(&status.sync_job_status().await?)?,
        Command::Counts => print_json(&status.table_counts().await?)?,
        Command::Health => {
            let report = status.health_check().await;
            print_json(&report)?;
            if !report.ok {
                std::process::exit(1);
            }
        }
        Command::History { workflow_id } => match status.workflow_history(workflow_id).await? {
            Some(history) => print_json(&history)?,
            None => bail!("workflow {workflow_id} not found"),
        },
    }
    Ok(())
}

async fn build_orchestrator(
    config: &Config,
    store: Arc<JsonFileStore>,
    projection: Arc<InMemoryProjection>,
) -> Result<Orchestrator> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::with_timeout(
        Duration::from_secs(config.github.timeout_secs),
    )?);

    let tokens: Arc<dyn TokenProvider> = match config.credential()? {
        Credential::Token(token) => Arc::new(StaticTokenProvider::new(Some(SecretString::from(
            token,
        )))),
        Credential::App {
            app_id,
            installation_id,
            private_key_path,
        } => {
            let pem = tokio::fs::read_to_string(&private_key_path)
                .await
                .with_context(|| format!("reading {}", private_key_path.display()))?;
            let signer = Rs256Signer::from_pem(app_id.to_string(), &SecretString::from(pem))?;
            Arc::new(InstallationTokenProvider::new(
                transport.clone(),
                clock.clone(),
                Arc::new(signer),
                &config.github.api_base_url,
                installation_id,
            ))
        }
    };

    let client = ApiClient::new(transport, tokens, clock.clone())
        .with_base_url(&config.github.api_base_url);
    let projection: Arc<dyn ProjectionStore> = projection;
    let steps = GitHubBootstrapSteps::new(client, projection, Arc::new(InMemoryFileSyncQueue::new()));

    let registry: Arc<dyn SyncJobRegistry> = store.clone();
    let workflows: Arc<dyn WorkflowStore> = store;
    Ok(OrchestratorBuilder::new()
        .registry(registry)
        .workflow_store(workflows)
        .steps(Arc::new(steps))
        .decider(Arc::new(config.decider()))
        .clock(clock)
        .build()?)
}

/// Wait for the workflow; the first Ctrl+C requests cancellation and keeps
/// waiting for the canceled result.
async fn wait_or_interrupt(
    orchestrator: &Orchestrator,
    workflow_id: WorkflowId,
) -> Result<WorkflowResult> {
    let wait = orchestrator.wait(workflow_id);
    tokio::pin!(wait);

    tokio::select! {
        result = &mut wait => return Ok(result?),
        signal = tokio::signal::ctrl_c() => {
            signal.context("installing Ctrl+C handler")?;
            warn!(%workflow_id, "interrupt received, canceling workflow");
            orchestrator.cancel(workflow_id).await?;
        }
    }
    Ok(wait.await?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
