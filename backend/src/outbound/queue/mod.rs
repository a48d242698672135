//! Durable job queue backed by PostgreSQL.
//!
//! Jobs live in a single `scheduled_jobs` table partitioned logically by
//! family. Claiming uses `FOR UPDATE SKIP LOCKED` so concurrent workers never
//! receive the same job, and a crashed worker's row stays `running` until an
//! operator intervenes rather than being silently redelivered mid-flight.

mod worker;

pub use worker::{WorkerPool, WorkerPoolHandle};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Text, Timestamptz};
use diesel_async::RunQueryDsl;
use tracing::debug;
use uuid::Uuid;

use crate::domain::ids::JobId;
use crate::domain::ports::{JobCompletion, JobQueue, JobQueueError, JobStore, JobStoreError};
use crate::domain::scheduler::jobs::{ClaimedJob, JobFamily, JobPayload};

use super::persistence::schema::scheduled_jobs;
use super::persistence::{DbPool, PoolError};

/// Queue states a job row moves through.
mod state {
    pub const QUEUED: &str = "queued";
    pub const RUNNING: &str = "running";
    pub const SUCCEEDED: &str = "succeeded";
    pub const FAILED: &str = "failed";
}

/// Producer-side adapter implementing the `JobQueue` port.
#[derive(Clone)]
pub struct DieselJobQueue {
    pool: DbPool,
}

impl DieselJobQueue {
    /// Create a queue over the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = scheduled_jobs)]
struct NewJobRow {
    id: Uuid,
    family: String,
    payload: serde_json::Value,
    run_at: DateTime<Utc>,
    attempts: i32,
    state: String,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn map_queue_pool_error(error: PoolError) -> JobQueueError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            JobQueueError::connection(message)
        }
    }
}

fn map_queue_diesel_error(error: diesel::result::Error) -> JobQueueError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        other => debug!(
            error_type = %std::any::type_name_of_val(other),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            JobQueueError::connection("database connection error")
        }
        _ => JobQueueError::dispatch("database error"),
    }
}

#[async_trait]
impl JobQueue for DieselJobQueue {
    async fn enqueue(
        &self,
        payload: &JobPayload,
        run_at: DateTime<Utc>,
    ) -> Result<Option<JobId>, JobQueueError> {
        let encoded = serde_json::to_value(payload)
            .map_err(|err| JobQueueError::dispatch(err.to_string()))?;
        let mut conn = self.pool.get().await.map_err(map_queue_pool_error)?;

        let id = JobId::random();
        let now = Utc::now();
        // The partial unique index on (family, payload, run_at) for queued
        // rows makes the conflict path the dedup: an identical job still
        // waiting in the queue turns this insert into a no-op.
        let inserted = diesel::insert_into(scheduled_jobs::table)
            .values(NewJobRow {
                id: *id.as_uuid(),
                family: payload.family().as_str().to_owned(),
                payload: encoded,
                run_at,
                attempts: 0,
                state: state::QUEUED.to_owned(),
                last_error: None,
                created_at: now,
                updated_at: now,
            })
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await
            .map_err(map_queue_diesel_error)?;

        Ok((inserted > 0).then_some(id))
    }
}

/// Worker-side adapter implementing the `JobStore` port.
#[derive(Clone)]
pub struct DieselJobStore {
    pool: DbPool,
}

impl DieselJobStore {
    /// Create a store over the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_store_pool_error(error: PoolError) -> JobStoreError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            JobStoreError::connection(message)
        }
    }
}

fn map_store_diesel_error(error: diesel::result::Error) -> JobStoreError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        other => debug!(
            error_type = %std::any::type_name_of_val(other),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            JobStoreError::connection("database connection error")
        }
        _ => JobStoreError::query("database error"),
    }
}

/// Atomic claim: the subquery picks the oldest due row of the family and
/// locks it, skipping rows another worker already holds.
const CLAIM_DUE_SQL: &str = "\
UPDATE scheduled_jobs
SET state = 'running', attempts = attempts + 1, updated_at = $2
WHERE id = (
    SELECT id FROM scheduled_jobs
    WHERE family = $1 AND state = 'queued' AND run_at <= $2
    ORDER BY run_at ASC, created_at ASC
    FOR UPDATE SKIP LOCKED
    LIMIT 1
)
RETURNING id, payload, attempts";

#[derive(Debug, QueryableByName)]
struct ClaimedRow {
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    id: Uuid,
    #[diesel(sql_type = diesel::sql_types::Jsonb)]
    payload: serde_json::Value,
    #[diesel(sql_type = diesel::sql_types::Integer)]
    attempts: i32,
}

fn row_to_claimed(row: ClaimedRow) -> Result<ClaimedJob, JobStoreError> {
    let payload: JobPayload = serde_json::from_value(row.payload)
        .map_err(|err| JobStoreError::query(format!("malformed job payload: {err}")))?;
    Ok(ClaimedJob {
        id: JobId::from_uuid(row.id),
        payload,
        attempt: u32::try_from(row.attempts).unwrap_or(1),
    })
}

#[async_trait]
impl JobStore for DieselJobStore {
    async fn claim_due(
        &self,
        family: JobFamily,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedJob>, JobStoreError> {
        let mut conn = self.pool.get().await.map_err(map_store_pool_error)?;

        let row: Option<ClaimedRow> = diesel::sql_query(CLAIM_DUE_SQL)
            .bind::<Text, _>(family.as_str())
            .bind::<Timestamptz, _>(now)
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_store_diesel_error)?;

        row.map(row_to_claimed).transpose()
    }

    async fn finish(&self, id: &JobId, outcome: JobCompletion) -> Result<(), JobStoreError> {
        let mut conn = self.pool.get().await.map_err(map_store_pool_error)?;
        let now = Utc::now();

        let updated = match outcome {
            JobCompletion::Succeeded => {
                diesel::update(scheduled_jobs::table)
                    .filter(scheduled_jobs::id.eq(id.as_uuid()))
                    .set((
                        scheduled_jobs::state.eq(state::SUCCEEDED),
                        scheduled_jobs::last_error.eq(None::<String>),
                        scheduled_jobs::updated_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .await
            }
            JobCompletion::Failed {
                error,
                retry_at: Some(retry_at),
            } => {
                diesel::update(scheduled_jobs::table)
                    .filter(scheduled_jobs::id.eq(id.as_uuid()))
                    .set((
                        scheduled_jobs::state.eq(state::QUEUED),
                        scheduled_jobs::run_at.eq(retry_at),
                        scheduled_jobs::last_error.eq(Some(error)),
                        scheduled_jobs::updated_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .await
            }
            JobCompletion::Failed {
                error,
                retry_at: None,
            } => {
                diesel::update(scheduled_jobs::table)
                    .filter(scheduled_jobs::id.eq(id.as_uuid()))
                    .set((
                        scheduled_jobs::state.eq(state::FAILED),
                        scheduled_jobs::last_error.eq(Some(error)),
                        scheduled_jobs::updated_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .await
            }
        }
        .map_err(map_store_diesel_error)?;

        if updated == 0 {
            debug!(job_id = %id, "finish targeted an unknown job row");
        }
        Ok(())
    }
}
