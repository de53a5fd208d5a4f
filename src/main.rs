use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use edu_sandbox::config::{CliArgs, Config};
use edu_sandbox::queue::{JobMessage, JobOutcome, JobQueue};
use edu_sandbox::sandbox::{ExecutionResult, Sandbox};
use edu_sandbox::worker::worker;

/// One line of output per submission
#[derive(Serialize)]
struct Report<'a> {
    job_id: u32,
    source: &'a str,
    finished_time: &'a str,
    #[serde(flatten)]
    result: Option<&'a ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let n_threads = cli.threads;

    if n_threads == 0 {
        bail!("The number of worker threads must not be 0");
    }

    let Config {
        sandbox: sandbox_config,
        toolchain: toolchain_config,
    } = cli.to_config().context("Failed to load configuration")?;
    let problem = Arc::new(cli.load_problem()?);

    let stale_age = sandbox_config.stale_workspace_age;
    let sandbox = Arc::new(
        Sandbox::build(sandbox_config, toolchain_config).context("Failed to build sandbox")?,
    );
    if let Some(age) = stale_age {
        sandbox
            .sweep_stale_workspaces(Duration::from(age))
            .context("Failed to sweep stale workspaces")?;
    }

    let job_queue = Arc::new(JobQueue::new());
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let mut workers = JoinSet::new();
    for i in 1..=n_threads {
        workers.spawn(worker(
            i,
            sandbox.clone(),
            job_queue.clone(),
            shutdown_token.clone(),
        ));
    }

    let mut pending = Vec::with_capacity(cli.sources.len());
    for (idx, path) in cli.sources.iter().enumerate() {
        let code = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read submission {}", path.display()))?;
        let job_id = idx as u32 + 1;
        let (responder, receiver) = oneshot::channel();
        job_queue
            .push(JobMessage {
                job_id,
                code,
                problem: problem.clone(),
                responder,
            })
            .await;
        pending.push((job_id, path.display().to_string(), receiver));
    }

    // ===== EXECUTION END, COLLECTING RESULTS ======

    let mut interrupted = false;
    for (job_id, source, receiver) in pending {
        if interrupted {
            job_queue.cancel_job(job_id).await;
            continue;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Ctrl-c received, shutting down...");
                interrupted = true;
                job_queue.cancel_job(job_id).await;
            }
            outcome = receiver => match outcome {
                Ok(outcome) => print_report(&source, &outcome)?,
                Err(_) => log::error!("Job {job_id} was dropped without a result"),
            },
            Some(res_worker) = workers.join_next() => {
                bail!("A worker terminated unexpectedly: {res_worker:?}");
            }
        }
    }

    // Broadcast shutdown signal to workers and wait until every worker terminates
    shutdown_token.cancel();
    while let Some(res) = workers.join_next().await {
        match res {
            Ok(Err(e)) => log::error!("Worker finished with error: {e:?}"),
            Err(e) if e.is_panic() => log::error!("Worker handle panicked: {e:?}"),
            Err(e) => log::error!("Worker handle finished with error: {e:?}"),
            Ok(Ok(())) => {}
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}

fn print_report(source: &str, outcome: &JobOutcome) -> anyhow::Result<()> {
    let report = Report {
        job_id: outcome.job_id,
        source,
        finished_time: &outcome.finished_time,
        result: outcome.result.as_ref().ok(),
        error: outcome.result.as_ref().err().map(String::as_str),
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
