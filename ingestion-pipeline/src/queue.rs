//! Submission interface: the handle the upload/update flow uses to enqueue
//! ingestion work and query a document's status. Constructed explicitly at
//! startup and passed around; there is no ambient queue singleton.

use std::{sync::Arc, time::Duration};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            document::{Document, IngestionStatus},
            ingestion_job::{IngestionJob, DEFAULT_BACKOFF_DELAY_MS, DEFAULT_MAX_ATTEMPTS},
            job_payload::JobPayload,
        },
    },
    utils::config::AppConfig,
};
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct SubmitOptions {
    pub max_attempts: u32,
    pub backoff_delay: Duration,
    pub remove_on_fail: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_delay: Duration::from_millis(DEFAULT_BACKOFF_DELAY_MS),
            remove_on_fail: false,
        }
    }
}

impl SubmitOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_delay: Duration::from_millis(config.backoff_delay_ms),
            remove_on_fail: config.remove_on_fail,
        }
    }
}

#[derive(Clone)]
pub struct JobQueue {
    db: Arc<SurrealDbClient>,
}

impl JobQueue {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    /// Enqueues an ingestion job for a document and returns the job id
    /// without waiting for ingestion to run.
    ///
    /// The document record must already be durably persisted; a job must
    /// never reference a document that does not exist yet, or the worker
    /// races ahead of storage. Submission of a missing document fails with
    /// `NotFound` instead of enqueuing.
    pub async fn submit(
        &self,
        document_id: &str,
        payload: JobPayload,
        options: SubmitOptions,
    ) -> Result<String, AppError> {
        let document = Document::find(&self.db, document_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Document not persisted: {document_id}"))
            })?;

        let job = IngestionJob::new(
            document.id,
            payload,
            options.max_attempts,
            options.backoff_delay,
            options.remove_on_fail,
        )
        .enqueue(&self.db)
        .await?;

        info!(
            job_id = %job.id,
            document_id = %job.document_id,
            max_attempts = job.max_attempts,
            "enqueued ingestion job"
        );

        Ok(job.id)
    }

    /// The outward status query. Decoupled from job state on purpose: it
    /// reads only the document record the workers write to.
    pub async fn document_status(&self, document_id: &str) -> Result<IngestionStatus, AppError> {
        Document::ingestion_status(&self.db, document_id).await
    }
}
