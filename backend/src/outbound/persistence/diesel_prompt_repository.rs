//! PostgreSQL-backed `PromptRepository` implementation using Diesel.
//!
//! The partial unique index on open (group, week) rows is the authoritative
//! guard for the one-open-prompt-per-week invariant; a unique violation on
//! insert surfaces as the port's duplicate-week variant.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ids::{GroupId, PromptId};
use crate::domain::ports::{PromptRepository, PromptRepositoryError};
use crate::domain::prompt::{AvailabilityPrompt, PromptStatus};
use crate::domain::week::WeekId;

use super::models::{NewPromptRow, PromptRow};
use super::pool::{DbPool, PoolError};
use super::schema::availability_prompts;

/// Diesel-backed implementation of the `PromptRepository` port.
#[derive(Clone)]
pub struct DieselPromptRepository {
    pool: DbPool,
}

impl DieselPromptRepository {
    /// Create a repository over the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> PromptRepositoryError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            PromptRepositoryError::connection(message)
        }
    }
}

fn map_diesel_error(error: diesel::result::Error) -> PromptRepositoryError {
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
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            PromptRepositoryError::duplicate_week(info.message().to_owned())
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            PromptRepositoryError::connection("database connection error")
        }
        _ => PromptRepositoryError::query("database error"),
    }
}

fn row_to_prompt(row: PromptRow) -> Result<AvailabilityPrompt, PromptRepositoryError> {
    AvailabilityPrompt::try_from(row).map_err(|err| PromptRepositoryError::query(err.to_string()))
}

const OPEN_STATUSES: [&str; 2] = ["pending", "active"];

#[async_trait]
impl PromptRepository for DieselPromptRepository {
    async fn insert(&self, prompt: &AvailabilityPrompt) -> Result<(), PromptRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::insert_into(availability_prompts::table)
            .values(NewPromptRow::from_domain(prompt))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn find_by_id(
        &self,
        id: &PromptId,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<PromptRow> = availability_prompts::table
            .filter(availability_prompts::id.eq(id.as_uuid()))
            .select(PromptRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_prompt).transpose()
    }

    async fn find_open_for_week(
        &self,
        group_id: &GroupId,
        week: &WeekId,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<PromptRow> = availability_prompts::table
            .filter(availability_prompts::group_id.eq(group_id.as_uuid()))
            .filter(availability_prompts::week.eq(week.as_str()))
            .filter(availability_prompts::status.eq_any(OPEN_STATUSES))
            .select(PromptRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_prompt).transpose()
    }

    async fn transition_status(
        &self,
        id: &PromptId,
        from: PromptStatus,
        to: PromptStatus,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        // Compare-and-set on the status column; zero rows means the prompt
        // was not in `from` and the caller decides what that implies.
        let row: Option<PromptRow> = diesel::update(availability_prompts::table)
            .filter(availability_prompts::id.eq(id.as_uuid()))
            .filter(availability_prompts::status.eq(from.as_str()))
            .set(availability_prompts::status.eq(to.as_str()))
            .returning(PromptRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_prompt).transpose()
    }

    async fn clear_open_for_week(
        &self,
        group_id: &GroupId,
        week: &WeekId,
    ) -> Result<bool, PromptRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let deleted = diesel::delete(
            availability_prompts::table
                .filter(availability_prompts::group_id.eq(group_id.as_uuid()))
                .filter(availability_prompts::week.eq(week.as_str()))
                .filter(availability_prompts::status.eq_any(OPEN_STATUSES)),
        )
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;

        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn open_statuses_match_the_domain_predicate() {
        for status in [PromptStatus::Pending, PromptStatus::Active] {
            assert!(OPEN_STATUSES.contains(&status.as_str()));
            assert!(status.is_open());
        }
        for status in [PromptStatus::Closed, PromptStatus::Converted] {
            assert!(!OPEN_STATUSES.contains(&status.as_str()));
        }
    }

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let err = map_pool_error(PoolError::checkout("timed out"));
        assert!(matches!(err, PromptRepositoryError::Connection { .. }));
    }
}
