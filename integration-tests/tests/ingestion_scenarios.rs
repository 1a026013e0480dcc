//! End-to-end scenarios: submission through worker pool to queryable status,
//! against an in-memory SurrealDB.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            document::{Document, IngestionStatus},
            ingestion_job::{IngestionJob, JobState},
            job_payload::JobPayload,
        },
    },
};
use ingestion_pipeline::{
    DocumentIngestor, FileIngestor, IngestionPipeline, JobQueue, SubmitOptions, WorkerConfig,
    WorkerPool,
};
use tokio::sync::Mutex;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const WAIT_LIMIT: Duration = Duration::from_secs(10);

struct AlwaysFails;

#[async_trait]
impl DocumentIngestor for AlwaysFails {
    async fn ingest(&self, _document_id: &str, _payload: &JobPayload) -> Result<(), AppError> {
        Err(AppError::Processing("extraction blew up".into()))
    }
}

struct AlwaysSucceeds;

#[async_trait]
impl DocumentIngestor for AlwaysSucceeds {
    async fn ingest(&self, _document_id: &str, _payload: &JobPayload) -> Result<(), AppError> {
        Ok(())
    }
}

struct SucceedsAfter {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl DocumentIngestor for SucceedsAfter {
    async fn ingest(&self, _document_id: &str, _payload: &JobPayload) -> Result<(), AppError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(AppError::Processing("transient outage".into()))
        } else {
            Ok(())
        }
    }
}

/// Counts how often each document passes through an ingest call.
#[derive(Default)]
struct RecordingIngestor {
    seen: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl DocumentIngestor for RecordingIngestor {
    async fn ingest(&self, document_id: &str, _payload: &JobPayload) -> Result<(), AppError> {
        *self
            .seen
            .lock()
            .await
            .entry(document_id.to_string())
            .or_insert(0) += 1;
        Ok(())
    }
}

async fn memory_db() -> Arc<SurrealDbClient> {
    let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
        .await
        .expect("in-memory surrealdb");
    db.ensure_initialized().await.expect("indexes");
    Arc::new(db)
}

async fn stored_document(db: &SurrealDbClient, file_path: &str) -> Document {
    Document::create_and_add_to_db(
        "Uploaded document".into(),
        None,
        file_path.into(),
        "user123".into(),
        db,
    )
    .await
    .expect("store document")
}

fn spawn_pool(
    workers: usize,
    db: Arc<SurrealDbClient>,
    ingestor: Arc<dyn DocumentIngestor>,
) -> WorkerPool {
    let pipeline = Arc::new(IngestionPipeline::new(Arc::clone(&db), ingestor));
    let config = WorkerConfig {
        lease: Duration::from_secs(60),
        idle_backoff: Duration::from_millis(10),
    };
    WorkerPool::spawn(workers, db, pipeline, config)
}

fn fast_options(max_attempts: u32) -> SubmitOptions {
    SubmitOptions {
        max_attempts,
        backoff_delay: Duration::from_millis(50),
        remove_on_fail: false,
    }
}

async fn wait_for_status(
    queue: &JobQueue,
    document_id: &str,
    want: IngestionStatus,
) -> IngestionStatus {
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            let status = queue
                .document_status(document_id)
                .await
                .expect("status query");
            if status == want {
                return status;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("document {document_id} never reached {want:?}"))
}

async fn wait_for_job_terminal(db: &SurrealDbClient, job_id: &str) -> IngestionJob {
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            let job = IngestionJob::find(db, job_id)
                .await
                .expect("find job")
                .expect("job retained");
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {job_id} never reached a terminal state"))
}

// Scenario 1: a task that always throws exhausts its three attempts and the
// document ends up queryable as failed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_always_failing_task_fails_after_three_attempts() {
    let db = memory_db().await;
    let queue = JobQueue::new(Arc::clone(&db));
    let document = stored_document(&db, "/files/a.pdf").await;

    let pool = spawn_pool(2, Arc::clone(&db), Arc::new(AlwaysFails));
    let job_id = queue
        .submit(&document.id, JobPayload::file("/files/a.pdf"), fast_options(3))
        .await
        .expect("submit");

    wait_for_status(&queue, &document.id, IngestionStatus::Failed).await;
    let job = wait_for_job_terminal(&db, &job_id).await;
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 3);

    pool.shutdown().await.expect("shutdown");
}

// Scenario 2: one transient failure, then success; final attempt count is 2.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_transient_failure_then_success() {
    let db = memory_db().await;
    let queue = JobQueue::new(Arc::clone(&db));
    let document = stored_document(&db, "/files/b.pdf").await;

    let pool = spawn_pool(
        2,
        Arc::clone(&db),
        Arc::new(SucceedsAfter {
            failures: 1,
            calls: AtomicU32::new(0),
        }),
    );
    let job_id = queue
        .submit(&document.id, JobPayload::file("/files/b.pdf"), fast_options(3))
        .await
        .expect("submit");

    wait_for_status(&queue, &document.id, IngestionStatus::Completed).await;
    let job = wait_for_job_terminal(&db, &job_id).await;
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 2);

    pool.shutdown().await.expect("shutdown");
}

// Scenario 3: querying an unknown document is NotFound, not a crash.
#[tokio::test]
async fn scenario_unknown_document_status_is_not_found() {
    let db = memory_db().await;
    let queue = JobQueue::new(Arc::clone(&db));

    assert!(matches!(
        queue.document_status("doc-unknown").await,
        Err(AppError::NotFound(_))
    ));
}

// Scenario 4: two submissions for the same document race; both jobs reach a
// terminal state and the document ends in whichever terminal status was
// written last. Documented race, not a crash.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_reprocessing_race_settles_on_terminal_status() {
    let db = memory_db().await;
    let queue = JobQueue::new(Arc::clone(&db));
    let document = stored_document(&db, "/files/c.pdf").await;

    let pool = spawn_pool(3, Arc::clone(&db), Arc::new(AlwaysSucceeds));
    let first = queue
        .submit(&document.id, JobPayload::file("/files/c.pdf"), fast_options(3))
        .await
        .expect("submit");
    let second = queue
        .submit(&document.id, JobPayload::file("/files/c.pdf"), fast_options(3))
        .await
        .expect("submit");
    assert_ne!(first, second);

    let first_job = wait_for_job_terminal(&db, &first).await;
    let second_job = wait_for_job_terminal(&db, &second).await;
    assert_eq!(first_job.state, JobState::Completed);
    assert_eq!(second_job.state, JobState::Completed);

    let status = queue
        .document_status(&document.id)
        .await
        .expect("status query");
    assert!(status.is_terminal());

    pool.shutdown().await.expect("shutdown");
}

// N workers, M > N jobs: every job is claimed exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_pool_claims_every_job_exactly_once() {
    let db = memory_db().await;
    let queue = JobQueue::new(Arc::clone(&db));

    let ingestor = Arc::new(RecordingIngestor::default());
    let pool = spawn_pool(3, Arc::clone(&db), Arc::clone(&ingestor) as Arc<dyn DocumentIngestor>);

    let mut jobs = Vec::new();
    for i in 0..12 {
        let document = stored_document(&db, &format!("/files/doc-{i}.pdf")).await;
        let job_id = queue
            .submit(
                &document.id,
                JobPayload::file(document.file_path.as_str()),
                fast_options(3),
            )
            .await
            .expect("submit");
        jobs.push((document.id.clone(), job_id));
    }

    for (document_id, job_id) in &jobs {
        let job = wait_for_job_terminal(&db, job_id).await;
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(&job.document_id, document_id);
    }

    let seen = ingestor.seen.lock().await;
    assert_eq!(seen.len(), 12);
    for (document_id, _) in &jobs {
        assert_eq!(seen.get(document_id), Some(&1), "document {document_id} not ingested exactly once");
    }

    pool.shutdown().await.expect("shutdown");
}

// The default file ingestor against a real artifact on disk.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_file_ingestor_end_to_end() {
    let db = memory_db().await;
    let queue = JobQueue::new(Arc::clone(&db));

    let mut file = tempfile::NamedTempFile::with_suffix(".txt").expect("temp file");
    writeln!(file, "searchable document text").expect("write");
    let path = file.path().to_string_lossy().into_owned();

    let document = stored_document(&db, &path).await;
    let pool = spawn_pool(1, Arc::clone(&db), Arc::new(FileIngestor));

    queue
        .submit(&document.id, JobPayload::file(path.as_str()), SubmitOptions::default())
        .await
        .expect("submit");

    wait_for_status(&queue, &document.id, IngestionStatus::Completed).await;

    pool.shutdown().await.expect("shutdown");
}
