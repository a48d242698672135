//! PostgreSQL-backed `SuggestionRepository` implementation using Diesel.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ids::{EventId, PromptId, SuggestionId};
use crate::domain::ports::{SuggestionRepository, SuggestionRepositoryError};
use crate::domain::suggestion::Suggestion;

use super::models::{NewSuggestionRow, SuggestionRow};
use super::pool::{DbPool, PoolError};
use super::schema::prompt_suggestions;

/// Diesel-backed implementation of the `SuggestionRepository` port.
#[derive(Clone)]
pub struct DieselSuggestionRepository {
    pool: DbPool,
}

impl DieselSuggestionRepository {
    /// Create a repository over the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> SuggestionRepositoryError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            SuggestionRepositoryError::connection(message)
        }
    }
}

fn map_diesel_error(error: diesel::result::Error) -> SuggestionRepositoryError {
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
            SuggestionRepositoryError::connection("database connection error")
        }
        _ => SuggestionRepositoryError::query("database error"),
    }
}

#[async_trait]
impl SuggestionRepository for DieselSuggestionRepository {
    async fn replace_for_prompt(
        &self,
        prompt_id: &PromptId,
        suggestions: &[Suggestion],
    ) -> Result<(), SuggestionRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let rows: Vec<NewSuggestionRow> =
            suggestions.iter().map(NewSuggestionRow::from_domain).collect();
        let prompt_uuid = *prompt_id.as_uuid();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        // Delete and insert in one transaction so readers never observe a
        // half-replaced suggestion set.
        conn.transaction(|conn| {
            async move {
                diesel::delete(
                    prompt_suggestions::table
                        .filter(prompt_suggestions::prompt_id.eq(prompt_uuid)),
                )
                .execute(conn)
                .await?;

                if !rows.is_empty() {
                    diesel::insert_into(prompt_suggestions::table)
                        .values(&rows)
                        .execute(conn)
                        .await?;
                }

                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn list_for_prompt(
        &self,
        prompt_id: &PromptId,
    ) -> Result<Vec<Suggestion>, SuggestionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<SuggestionRow> = prompt_suggestions::table
            .filter(prompt_suggestions::prompt_id.eq(prompt_id.as_uuid()))
            .order((
                prompt_suggestions::score.desc(),
                prompt_suggestions::starts_at.asc(),
                prompt_suggestions::ends_at.asc(),
            ))
            .select(SuggestionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(rows.into_iter().map(Suggestion::from).collect())
    }

    async fn mark_converted(
        &self,
        suggestion_id: &SuggestionId,
        event_id: &EventId,
    ) -> Result<Option<Suggestion>, SuggestionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<SuggestionRow> = diesel::update(prompt_suggestions::table)
            .filter(prompt_suggestions::id.eq(suggestion_id.as_uuid()))
            .set(prompt_suggestions::converted_event_id.eq(Some(*event_id.as_uuid())))
            .returning(SuggestionRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        Ok(row.map(Suggestion::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let err = map_pool_error(PoolError::checkout("timed out"));
        assert!(matches!(err, SuggestionRepositoryError::Connection { .. }));
    }

    #[rstest]
    fn rollback_maps_to_query_error() {
        let err = map_diesel_error(diesel::result::Error::RollbackTransaction);
        assert!(matches!(err, SuggestionRepositoryError::Query { .. }));
    }
}
