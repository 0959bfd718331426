//! Worker pool
//!
//! Runs generation jobs off the owner thread. Jobs execute on tokio's blocking pool,
//! bounded by a semaphore; every completion is posted back to the owner's queue.

use crate::error::GenerationError;
use crate::generation::job::GenerationJob;
use crate::generation::key::CacheKey;
use crate::store::{EntryData, StoreEvent};
use crate::types::{JobId, Timestamp};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Message consumed on the owner thread
pub(crate) enum OwnerMessage {
    JobFinished(JobCompletion),
    StoreChanged(StoreEvent),
    GenerateRequested,
}

/// Result of running a job
#[derive(Debug)]
pub enum JobOutcome {
    Succeeded(Vec<EntryData>),
    Failed(String),
}

#[derive(Debug)]
pub struct JobCompletion {
    pub job: JobId,
    pub key: CacheKey,
    /// Clock reading taken when the job was dispatched
    pub stamp: Timestamp,
    pub outcome: JobOutcome,
    pub duration: Duration,
}

/// A job ready to be handed to the pool
pub(crate) struct JobTicket {
    pub job_id: JobId,
    pub key: CacheKey,
    pub stamp: Timestamp,
    pub job: Box<dyn GenerationJob>,
}

pub(crate) struct JobPool {
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl JobPool {
    pub fn new(workers: usize) -> Result<Self, GenerationError> {
        if workers == 0 {
            return Err(GenerationError::WorkerPool(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("statgen-worker")
            .enable_all()
            .build()
            .map_err(|e| GenerationError::WorkerPool(e.to_string()))?;

        debug!(workers, "Started generation worker pool");
        Ok(Self {
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fire-and-forget: the completion arrives later on `reply`
    pub fn submit(&self, ticket: JobTicket, reply: Sender<OwnerMessage>) {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        let permits = Arc::clone(&self.permits);

        runtime.spawn(async move {
            let JobTicket {
                job_id,
                key,
                stamp,
                mut job,
            } = ticket;

            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => {
                    let started = Instant::now();
                    let handle = tokio::task::spawn_blocking(move || {
                        let outcome = if job.run() {
                            JobOutcome::Succeeded(job.take_results())
                        } else {
                            JobOutcome::Failed(
                                job.last_error_message()
                                    .unwrap_or_else(|| "job failed without a message".to_string()),
                            )
                        };
                        (outcome, started.elapsed())
                    });
                    match handle.await {
                        Ok(done) => done,
                        Err(join_error) => {
                            warn!(job = %job_id, error = %join_error, "Generation job aborted");
                            (
                                JobOutcome::Failed(format!("job aborted: {}", join_error)),
                                started.elapsed(),
                            )
                        }
                    }
                }
                Err(_) => (
                    JobOutcome::Failed("worker pool closed".to_string()),
                    Duration::ZERO,
                ),
            };

            let (outcome, duration) = outcome;
            // The owner may be gone already; nothing left to notify then.
            let _ = reply.send(OwnerMessage::JobFinished(JobCompletion {
                job: job_id,
                key,
                stamp,
                outcome,
                duration,
            }));
        });
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
