use std::time::Duration;

use chrono::Duration as ChronoDuration;
use state_machines::state_machine;
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::{job_payload::JobPayload, StoredObject};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_DELAY_MS: u64 = 5000;
pub const DEFAULT_LEASE_SECS: i64 = 300;

#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Queued,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

#[derive(Debug, Clone, Copy)]
enum JobTransition {
    Claim,
    Complete,
    Requeue,
    Fail,
}

impl JobTransition {
    fn as_str(&self) -> &'static str {
        match self {
            JobTransition::Claim => "claim",
            JobTransition::Complete => "complete",
            JobTransition::Requeue => "requeue",
            JobTransition::Fail => "fail",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: JobLifecycleMachine,
        initial: Queued,
        states: [Queued, Active, Completed, Failed],
        events {
            claim {
                transition: { from: Queued, to: Active }
            }
            complete {
                transition: { from: Active, to: Completed }
            }
            requeue {
                transition: { from: Active, to: Queued }
            }
            fail {
                transition: { from: Active, to: Failed }
            }
        }
    }

    pub(super) fn queued() -> JobLifecycleMachine<(), Queued> {
        JobLifecycleMachine::new(())
    }

    pub(super) fn active() -> JobLifecycleMachine<(), Active> {
        queued()
            .claim()
            .expect("claim transition from Queued should exist")
    }
}

fn invalid_transition(state: JobState, event: JobTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid job transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

fn compute_next_state(state: JobState, event: JobTransition) -> Result<JobState, AppError> {
    use lifecycle::*;
    match (state, event) {
        (JobState::Queued, JobTransition::Claim) => queued()
            .claim()
            .map(|_| JobState::Active)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Active, JobTransition::Complete) => active()
            .complete()
            .map(|_| JobState::Completed)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Active, JobTransition::Requeue) => active()
            .requeue()
            .map(|_| JobState::Queued)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Active, JobTransition::Fail) => active()
            .fail()
            .map(|_| JobState::Failed)
            .map_err(|_| invalid_transition(state, event)),
        _ => Err(invalid_transition(state, event)),
    }
}

stored_object!(IngestionJob, "ingestion_job", {
    document_id: String,
    payload: JobPayload,
    state: JobState,
    attempts: u32,
    max_attempts: u32,
    backoff_delay_ms: u64,
    remove_on_fail: bool,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime")]
    scheduled_at: chrono::DateTime<chrono::Utc>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    locked_at: Option<chrono::DateTime<chrono::Utc>>,
    lease_duration_secs: i64,
    worker_id: Option<String>,
    error_message: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    last_error_at: Option<chrono::DateTime<chrono::Utc>>
});

impl IngestionJob {
    pub fn new(
        document_id: String,
        payload: JobPayload,
        max_attempts: u32,
        backoff_delay: Duration,
        remove_on_fail: bool,
    ) -> Self {
        let now = chrono::Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            document_id,
            payload,
            state: JobState::Queued,
            attempts: 0,
            max_attempts,
            backoff_delay_ms: u64::try_from(backoff_delay.as_millis())
                .unwrap_or(DEFAULT_BACKOFF_DELAY_MS),
            remove_on_fail,
            scheduled_at: now,
            locked_at: None,
            lease_duration_secs: DEFAULT_LEASE_SECS,
            worker_id: None,
            error_message: None,
            last_error_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn backoff_delay(&self) -> Duration {
        Duration::from_millis(self.backoff_delay_ms)
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs.max(0) as u64)
    }

    /// Persists the job in the queued state, immediately visible to claims.
    pub async fn enqueue(self, db: &SurrealDbClient) -> Result<IngestionJob, AppError> {
        db.store_item(self.clone()).await?;
        Ok(self)
    }

    pub async fn find(db: &SurrealDbClient, id: &str) -> Result<Option<IngestionJob>, AppError> {
        Ok(db.get_item::<IngestionJob>(id).await?)
    }

    /// Atomically claims the oldest ready job for `worker_id`, transitioning
    /// it queued -> active so no two workers ever hold the same job. A job is
    /// ready when it is queued and its visibility time has passed, or when it
    /// is active but its lease expired (the holding worker crashed). Attempts
    /// only count fresh claims, not lease recoveries.
    pub async fn claim_next_ready(
        db: &SurrealDbClient,
        worker_id: &str,
        now: chrono::DateTime<chrono::Utc>,
        lease_duration: Duration,
    ) -> Result<Option<IngestionJob>, AppError> {
        debug_assert!(compute_next_state(JobState::Queued, JobTransition::Claim).is_ok());

        const CLAIM_QUERY: &str = r#"
            UPDATE (
                SELECT * FROM type::table($table)
                WHERE (
                        (state = $queued AND scheduled_at <= $now)
                     OR (
                        state = $active
                        AND locked_at != NONE
                        AND time::unix($now) - time::unix(locked_at) >= lease_duration_secs
                     )
                )
                ORDER BY scheduled_at ASC, created_at ASC
                LIMIT 1
            )
            SET attempts = IF state = $queued THEN attempts + 1 ELSE attempts END,
                state = $active,
                locked_at = $now,
                worker_id = $worker_id,
                lease_duration_secs = $lease_secs,
                updated_at = $now
            RETURN *;
        "#;

        let mut result = db
            .client
            .query(CLAIM_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("queued", JobState::Queued.as_str()))
            .bind(("active", JobState::Active.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("worker_id", worker_id.to_string()))
            .bind(("lease_secs", lease_duration.as_secs() as i64))
            .await?;

        let job: Option<IngestionJob> = result.take(0)?;
        Ok(job)
    }

    /// Marks the job completed. Idempotent: completing an already-completed
    /// job is a no-op returning the stored row, not an error.
    pub async fn mark_completed(&self, db: &SurrealDbClient) -> Result<IngestionJob, AppError> {
        if self.state != JobState::Completed {
            let next = compute_next_state(self.state, JobTransition::Complete)?;
            debug_assert_eq!(next, JobState::Completed);
        }

        const COMPLETE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET state = $completed,
                updated_at = $now,
                locked_at = NONE,
                worker_id = NONE,
                error_message = NONE,
                last_error_at = NONE
            WHERE (state = $active AND worker_id = $worker_id) OR state = $completed
            RETURN *;
        "#;

        let now = chrono::Utc::now();
        let mut result = db
            .client
            .query(COMPLETE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("completed", JobState::Completed.as_str()))
            .bind(("active", JobState::Active.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("worker_id", self.worker_id.clone().unwrap_or_default()))
            .await?;

        let updated: Option<IngestionJob> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(self.state, JobTransition::Complete))
    }

    /// Returns the job to the queue with a visibility delay. The delay only
    /// governs when the job becomes claimable again, not processing order.
    pub async fn mark_requeued(
        &self,
        error_message: String,
        delay: Duration,
        db: &SurrealDbClient,
    ) -> Result<IngestionJob, AppError> {
        let next = compute_next_state(self.state, JobTransition::Requeue)?;
        debug_assert_eq!(next, JobState::Queued);

        let now = chrono::Utc::now();
        let retry_at = now
            + ChronoDuration::from_std(delay)
                .unwrap_or_else(|_| ChronoDuration::milliseconds(DEFAULT_BACKOFF_DELAY_MS as i64));

        const REQUEUE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET state = $queued,
                updated_at = $now,
                locked_at = NONE,
                worker_id = NONE,
                scheduled_at = $retry_at,
                error_message = $error_message,
                last_error_at = $now
            WHERE state = $active AND worker_id = $worker_id
            RETURN *;
        "#;

        let mut result = db
            .client
            .query(REQUEUE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("queued", JobState::Queued.as_str()))
            .bind(("active", JobState::Active.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("retry_at", SurrealDatetime::from(retry_at)))
            .bind(("error_message", error_message))
            .bind(("worker_id", self.worker_id.clone().unwrap_or_default()))
            .await?;

        let updated: Option<IngestionJob> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(self.state, JobTransition::Requeue))
    }

    /// Marks the job terminally failed, retained for inspection. Purging
    /// `remove_on_fail` jobs is the worker's responsibility after it has
    /// recorded the document status.
    pub async fn mark_failed(
        &self,
        error_message: String,
        db: &SurrealDbClient,
    ) -> Result<IngestionJob, AppError> {
        let next = compute_next_state(self.state, JobTransition::Fail)?;
        debug_assert_eq!(next, JobState::Failed);

        const FAIL_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET state = $failed,
                updated_at = $now,
                locked_at = NONE,
                worker_id = NONE,
                scheduled_at = $now,
                error_message = $error_message,
                last_error_at = $now
            WHERE state = $active AND worker_id = $worker_id
            RETURN *;
        "#;

        let now = chrono::Utc::now();
        let mut result = db
            .client
            .query(FAIL_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("failed", JobState::Failed.as_str()))
            .bind(("active", JobState::Active.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("error_message", error_message))
            .bind(("worker_id", self.worker_id.clone().unwrap_or_default()))
            .await?;

        let updated: Option<IngestionJob> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(self.state, JobTransition::Fail))
    }

    /// Non-terminal jobs, oldest first. Operational visibility only.
    pub async fn get_unfinished_jobs(
        db: &SurrealDbClient,
    ) -> Result<Vec<IngestionJob>, AppError> {
        let jobs: Vec<IngestionJob> = db
            .query(
                "SELECT * FROM type::table($table)
                 WHERE state IN $open_states
                 ORDER BY scheduled_at ASC, created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind((
                "open_states",
                vec![JobState::Queued.as_str(), JobState::Active.as_str()],
            ))
            .await?
            .take(0)?;

        Ok(jobs)
    }

    /// All jobs ever enqueued for a document, newest first.
    pub async fn for_document(
        db: &SurrealDbClient,
        document_id: &str,
    ) -> Result<Vec<IngestionJob>, AppError> {
        let jobs: Vec<IngestionJob> = db
            .query(
                "SELECT * FROM type::table($table)
                 WHERE document_id = $document_id
                 ORDER BY created_at DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_string()))
            .await?
            .take(0)?;

        Ok(jobs)
    }
}
