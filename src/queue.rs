use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, oneshot};

use crate::config::ProblemConfig;
use crate::sandbox::ExecutionResult;

/// A submission waiting for a worker
pub struct JobMessage {
    pub job_id: u32,
    pub code: String,
    pub problem: Arc<ProblemConfig>,
    pub responder: oneshot::Sender<JobOutcome>,
}

/// What a worker sends back for every job it took
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: u32,
    pub finished_time: String,
    /// `Err` carries an infrastructure failure, never a verdict
    pub result: Result<ExecutionResult, String>,
}

pub struct JobQueue {
    queue: Mutex<VecDeque<JobMessage>>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, job: JobMessage) {
        self.queue.lock().await.push_back(job);
        self.notify.notify_one();
    }

    pub async fn pop(&self) -> JobMessage {
        loop {
            if let Some(job) = self.queue.lock().await.pop_front() {
                return job;
            }
            self.notify.notified().await;
        }
    }

    /// Drops a job that no worker has taken yet
    pub async fn cancel_job(&self, job_id: u32) -> bool {
        let mut queue = self.queue.lock().await;
        let before_len = queue.len();
        queue.retain(|j| j.job_id != job_id);
        before_len != queue.len()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job(job_id: u32) -> (JobMessage, oneshot::Receiver<JobOutcome>) {
        let (responder, receiver) = oneshot::channel();
        let problem = Arc::new(ProblemConfig {
            name: None,
            test_cases: "[]".to_string(),
            time_limit: 1,
        });
        let message = JobMessage {
            job_id,
            code: String::new(),
            problem,
            responder,
        };
        (message, receiver)
    }

    #[tokio::test]
    async fn jobs_come_out_in_order() {
        let queue = JobQueue::new();
        for id in 1..=3 {
            queue.push(job(id).0).await;
        }
        assert_eq!(queue.pop().await.job_id, 1);
        assert_eq!(queue.pop().await.job_id, 2);
        assert_eq!(queue.pop().await.job_id, 3);
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let queue = Arc::new(JobQueue::new());
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop().await.job_id }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        queue.push(job(7).0).await;
        let popped = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped, 7);
    }

    #[tokio::test]
    async fn cancelled_job_is_skipped() {
        let queue = JobQueue::new();
        queue.push(job(1).0).await;
        queue.push(job(2).0).await;

        assert!(queue.cancel_job(1).await);
        assert!(!queue.cancel_job(1).await);
        assert_eq!(queue.pop().await.job_id, 2);
    }
}
