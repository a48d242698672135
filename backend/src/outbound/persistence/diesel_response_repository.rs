//! PostgreSQL-backed `ResponseRepository` implementation using Diesel.
//!
//! Rows are unique on (prompt, user); both submission and reminder tracking
//! are upserts against that constraint, so the first reminder can create a
//! placeholder row before the member ever submits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;
use uuid::Uuid;

use crate::domain::ids::{PromptId, UserId};
use crate::domain::ports::{ResponseRepository, ResponseRepositoryError};
use crate::domain::prompt::{AvailabilityResponse, TimeSlot};

use super::models::{NewResponseRow, ResponseRow};
use super::pool::{DbPool, PoolError};
use super::schema::availability_responses;

/// Diesel-backed implementation of the `ResponseRepository` port.
#[derive(Clone)]
pub struct DieselResponseRepository {
    pool: DbPool,
}

impl DieselResponseRepository {
    /// Create a repository over the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ResponseRepositoryError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            ResponseRepositoryError::connection(message)
        }
    }
}

fn map_diesel_error(error: diesel::result::Error) -> ResponseRepositoryError {
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
            ResponseRepositoryError::connection("database connection error")
        }
        _ => ResponseRepositoryError::query("database error"),
    }
}

fn row_to_response(row: ResponseRow) -> Result<AvailabilityResponse, ResponseRepositoryError> {
    AvailabilityResponse::try_from(row)
        .map_err(|err| ResponseRepositoryError::query(err.to_string()))
}

fn encode_slots(slots: &[TimeSlot]) -> Result<serde_json::Value, ResponseRepositoryError> {
    serde_json::to_value(slots).map_err(|err| ResponseRepositoryError::query(err.to_string()))
}

#[async_trait]
impl ResponseRepository for DieselResponseRepository {
    async fn submit(
        &self,
        prompt_id: &PromptId,
        user_id: &UserId,
        slots: &[TimeSlot],
        submitted_at: DateTime<Utc>,
    ) -> Result<AvailabilityResponse, ResponseRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let encoded = encode_slots(slots)?;

        let new_row = NewResponseRow {
            id: Uuid::new_v4(),
            prompt_id: *prompt_id.as_uuid(),
            user_id: *user_id.as_uuid(),
            slots: encoded.clone(),
            submitted_at: Some(submitted_at),
            last_reminded_at: None,
            reminder_count: 0,
        };

        let row: ResponseRow = diesel::insert_into(availability_responses::table)
            .values(new_row)
            .on_conflict((
                availability_responses::prompt_id,
                availability_responses::user_id,
            ))
            .do_update()
            .set((
                availability_responses::slots.eq(encoded),
                availability_responses::submitted_at.eq(Some(submitted_at)),
            ))
            .returning(ResponseRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        row_to_response(row)
    }

    async fn find(
        &self,
        prompt_id: &PromptId,
        user_id: &UserId,
    ) -> Result<Option<AvailabilityResponse>, ResponseRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<ResponseRow> = availability_responses::table
            .filter(availability_responses::prompt_id.eq(prompt_id.as_uuid()))
            .filter(availability_responses::user_id.eq(user_id.as_uuid()))
            .select(ResponseRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_response).transpose()
    }

    async fn list_for_prompt(
        &self,
        prompt_id: &PromptId,
    ) -> Result<Vec<AvailabilityResponse>, ResponseRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<ResponseRow> = availability_responses::table
            .filter(availability_responses::prompt_id.eq(prompt_id.as_uuid()))
            .order(availability_responses::user_id.asc())
            .select(ResponseRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter().map(row_to_response).collect()
    }

    async fn record_reminder(
        &self,
        prompt_id: &PromptId,
        user_id: &UserId,
        reminded_at: DateTime<Utc>,
    ) -> Result<AvailabilityResponse, ResponseRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let placeholder = NewResponseRow {
            id: Uuid::new_v4(),
            prompt_id: *prompt_id.as_uuid(),
            user_id: *user_id.as_uuid(),
            slots: serde_json::Value::Array(Vec::new()),
            submitted_at: None,
            last_reminded_at: Some(reminded_at),
            reminder_count: 1,
        };

        let row: ResponseRow = diesel::insert_into(availability_responses::table)
            .values(placeholder)
            .on_conflict((
                availability_responses::prompt_id,
                availability_responses::user_id,
            ))
            .do_update()
            .set((
                availability_responses::reminder_count
                    .eq(availability_responses::reminder_count + 1),
                availability_responses::last_reminded_at.eq(Some(reminded_at)),
            ))
            .returning(ResponseRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        row_to_response(row)
    }
}
