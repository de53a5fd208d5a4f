use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::create_timestamp;
use crate::queue::{JobOutcome, JobQueue};
use crate::sandbox::Sandbox;

pub async fn worker(
    id: u8,
    sandbox: Arc<Sandbox>,
    queue: Arc<JobQueue>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }

            job_message = queue.pop() => {
                let job_id = job_message.job_id;
                log::info!("Worker {id} got job {job_id} from queue");

                // 1. Evaluate in a fresh workspace
                let result = sandbox
                    .evaluate(&job_message.code, &job_message.problem)
                    .await
                    .map_err(|e| {
                        log::error!("Job {job_id} failed on worker {id}: {e}");
                        e.to_string()
                    });
                if let Ok(result) = &result {
                    log::info!(
                        "Job {job_id} finished on worker {id}: {:?}, {}/{} tests",
                        result.status,
                        result.tests_passed,
                        result.tests_total
                    );
                }

                // 2. Hand the outcome back to whoever queued the job
                let outcome = JobOutcome {
                    job_id,
                    finished_time: create_timestamp(),
                    result,
                };
                if job_message.responder.send(outcome).is_err() {
                    log::warn!("Receiver of job {job_id} is gone, result dropped");
                }
            }
        };
    }

    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}
