mod ingestor;

pub use ingestor::{DocumentIngestor, FileIngestor};

use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            document::{Document, IngestionStatus},
            ingestion_job::IngestionJob,
        },
    },
};
use tracing::{info, warn};

use crate::retry::{RetryDecision, RetryPolicy};

/// Executes one claimed job end to end: runs the ingestor and reports the
/// outcome to the job store and the document's status field. Transient
/// failures are absorbed here; submitters only ever observe them through
/// the status query.
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    ingestor: Arc<dyn DocumentIngestor>,
}

impl IngestionPipeline {
    pub fn new(db: Arc<SurrealDbClient>, ingestor: Arc<dyn DocumentIngestor>) -> Self {
        Self { db, ingestor }
    }

    #[tracing::instrument(
        skip_all,
        fields(
            job_id = %job.id,
            document_id = %job.document_id,
            attempt = job.attempts,
            worker_id = job.worker_id.as_deref().unwrap_or("unknown-worker")
        )
    )]
    pub async fn process_job(&self, job: IngestionJob) -> Result<(), AppError> {
        Document::set_ingestion_status(&self.db, &job.document_id, IngestionStatus::Processing)
            .await?;

        match self.ingestor.ingest(&job.document_id, &job.payload).await {
            Ok(()) => {
                job.mark_completed(&self.db).await?;
                Document::set_ingestion_status(
                    &self.db,
                    &job.document_id,
                    IngestionStatus::Completed,
                )
                .await?;
                info!(attempt = job.attempts, "ingestion job succeeded");
                Ok(())
            }
            Err(err) => {
                let reason = err.to_string();

                match RetryPolicy::for_job(&job).decide(job.attempts) {
                    RetryDecision::Requeue(delay) => {
                        job.mark_requeued(reason.clone(), delay, &self.db).await?;
                        warn!(
                            attempt = job.attempts,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %reason,
                            "ingestion job failed; scheduled retry"
                        );
                    }
                    RetryDecision::GiveUp => {
                        let failed = job.mark_failed(reason.clone(), &self.db).await?;
                        Document::set_ingestion_status(
                            &self.db,
                            &failed.document_id,
                            IngestionStatus::Failed,
                        )
                        .await?;
                        if failed.remove_on_fail {
                            self.db.delete_item::<IngestionJob>(&failed.id).await?;
                        }
                        warn!(
                            attempt = failed.attempts,
                            error = %reason,
                            "ingestion job failed terminally"
                        );
                    }
                }

                Err(AppError::Processing(reason))
            }
        }
    }
}
