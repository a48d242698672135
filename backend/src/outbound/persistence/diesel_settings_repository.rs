//! PostgreSQL-backed `SettingsRepository` implementation using Diesel.
//!
//! Settings rows are written by the group administration surface; this
//! adapter only reads them.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ids::{GroupId, SettingsId};
use crate::domain::ports::{SettingsRepository, SettingsRepositoryError};
use crate::domain::prompt::GroupPromptSettings;

use super::models::SettingsRow;
use super::pool::{DbPool, PoolError};
use super::schema::group_prompt_settings;

/// Diesel-backed implementation of the `SettingsRepository` port.
#[derive(Clone)]
pub struct DieselSettingsRepository {
    pool: DbPool,
}

impl DieselSettingsRepository {
    /// Create a repository over the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> SettingsRepositoryError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            SettingsRepositoryError::connection(message)
        }
    }
}

fn map_diesel_error(error: diesel::result::Error) -> SettingsRepositoryError {
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
            SettingsRepositoryError::connection("database connection error")
        }
        _ => SettingsRepositoryError::query("database error"),
    }
}

fn row_to_settings(row: SettingsRow) -> Result<GroupPromptSettings, SettingsRepositoryError> {
    GroupPromptSettings::try_from(row)
        .map_err(|err| SettingsRepositoryError::query(err.to_string()))
}

#[async_trait]
impl SettingsRepository for DieselSettingsRepository {
    async fn find_by_id(
        &self,
        id: &SettingsId,
    ) -> Result<Option<GroupPromptSettings>, SettingsRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<SettingsRow> = group_prompt_settings::table
            .filter(group_prompt_settings::id.eq(id.as_uuid()))
            .select(SettingsRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_settings).transpose()
    }

    async fn find_for_group(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<GroupPromptSettings>, SettingsRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<SettingsRow> = group_prompt_settings::table
            .filter(group_prompt_settings::group_id.eq(group_id.as_uuid()))
            .select(SettingsRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_settings).transpose()
    }

    async fn list_active(&self) -> Result<Vec<GroupPromptSettings>, SettingsRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<SettingsRow> = group_prompt_settings::table
            .filter(group_prompt_settings::active.eq(true))
            .order(group_prompt_settings::id.asc())
            .select(SettingsRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter().map(row_to_settings).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let err = map_pool_error(PoolError::build("bad url"));
        assert!(matches!(err, SettingsRepositoryError::Connection { .. }));
    }
}
