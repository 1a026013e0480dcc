#![allow(clippy::missing_docs_in_private_items)]

pub mod pipeline;
pub mod queue;
pub mod retry;

pub use pipeline::{DocumentIngestor, FileIngestor, IngestionPipeline};
pub use queue::{JobQueue, SubmitOptions};
pub use retry::{RetryDecision, RetryPolicy};

use std::sync::Arc;

use chrono::Utc;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::ingestion_job::{IngestionJob, DEFAULT_LEASE_SECS},
    },
    utils::config::AppConfig,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{sleep, Duration},
};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// How long a claim stays valid before other workers may recover the job.
    pub lease: Duration,
    /// How long a worker sleeps when the queue is empty.
    pub idle_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(DEFAULT_LEASE_SECS as u64),
            idle_backoff: Duration::from_millis(500),
        }
    }
}

impl WorkerConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            lease: Duration::from_secs(config.lease_secs.max(0) as u64),
            idle_backoff: Duration::from_millis(config.idle_poll_ms),
        }
    }
}

/// One pull-based consumer. Claims ready jobs, hands them to the pipeline,
/// and absorbs task failures; claim errors (store unreachable) are logged
/// and backed off rather than crashing the loop. Runs until the shutdown
/// signal flips, finishing the job in hand first.
pub async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    pipeline: Arc<IngestionPipeline>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let worker_id = format!("ingestion-worker-{}", Uuid::new_v4());

    loop {
        if *shutdown.borrow() {
            break;
        }

        match IngestionJob::claim_next_ready(&db, &worker_id, Utc::now(), config.lease).await {
            Ok(Some(job)) => {
                let job_id = job.id.clone();
                info!(
                    %worker_id,
                    %job_id,
                    attempt = job.attempts,
                    "claimed ingestion job"
                );
                if let Err(err) = pipeline.process_job(job).await {
                    error!(%worker_id, %job_id, error = %err, "ingestion job failed");
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    () = sleep(config.idle_backoff) => {}
                }
            }
            Err(err) => {
                error!(%worker_id, error = %err, "failed to claim ingestion job; backing off");
                tokio::select! {
                    _ = shutdown.changed() => {}
                    () = sleep(Duration::from_secs(1)) => {}
                }
            }
        }
    }

    info!(%worker_id, "worker stopped");
}

/// A fixed-size pool of workers over one shared job store. No dispatcher:
/// each worker pulls independently, which load-balances naturally.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        db: Arc<SurrealDbClient>,
        pipeline: Arc<IngestionPipeline>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = (0..count)
            .map(|_| {
                tokio::spawn(run_worker_loop(
                    Arc::clone(&db),
                    Arc::clone(&pipeline),
                    config,
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        Self {
            shutdown_tx,
            handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Signals all workers and waits for them to drain. In-flight jobs run
    /// to completion; queued jobs stay in the store for the next start.
    pub async fn shutdown(self) -> Result<(), AppError> {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            handle.await?;
        }
        Ok(())
    }
}
