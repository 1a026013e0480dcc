use async_trait::async_trait;
use common::{error::AppError, storage::types::job_payload::JobPayload};
use tracing::debug;

/// The actual ingestion work: slow, I/O-bound, allowed to fail. The pipeline
/// only cares about the success/failure outcome; swap implementations here
/// for richer processing (embedding, OCR, ...).
#[async_trait]
pub trait DocumentIngestor: Send + Sync {
    async fn ingest(&self, document_id: &str, payload: &JobPayload) -> Result<(), AppError>;
}

/// Baseline ingestor: reads the artifact from disk and extracts text from
/// text-like files. Failures surface as `Processing` errors so the retry
/// policy treats them as transient.
pub struct FileIngestor;

#[async_trait]
impl DocumentIngestor for FileIngestor {
    async fn ingest(&self, document_id: &str, payload: &JobPayload) -> Result<(), AppError> {
        match payload {
            JobPayload::File { path } => {
                let bytes = tokio::fs::read(path).await.map_err(|err| {
                    AppError::Processing(format!("failed to read artifact {path}: {err}"))
                })?;
                if bytes.is_empty() {
                    return Err(AppError::Processing(format!("empty artifact: {path}")));
                }

                let mime_type = mime_guess::from_path(path).first_or_octet_stream();
                let extracted_chars = if mime_type.type_() == mime::TEXT {
                    String::from_utf8_lossy(&bytes).chars().count()
                } else {
                    bytes.len()
                };

                debug!(
                    document_id,
                    mime_type = %mime_type,
                    extracted_chars,
                    "extracted document content"
                );
                Ok(())
            }
        }
    }
}
