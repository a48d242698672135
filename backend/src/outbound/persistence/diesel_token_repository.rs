//! PostgreSQL-backed `TokenRepository` implementation using Diesel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ids::TokenId;
use crate::domain::ports::{TokenRepository, TokenRepositoryError};
use crate::domain::token::{MagicToken, TokenStatus};

use super::models::{MagicTokenRow, NewMagicTokenRow};
use super::pool::{DbPool, PoolError};
use super::schema::magic_tokens;

/// Diesel-backed implementation of the `TokenRepository` port.
#[derive(Clone)]
pub struct DieselTokenRepository {
    pool: DbPool,
}

impl DieselTokenRepository {
    /// Create a repository over the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> TokenRepositoryError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            TokenRepositoryError::connection(message)
        }
    }
}

fn map_diesel_error(error: diesel::result::Error) -> TokenRepositoryError {
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
            TokenRepositoryError::duplicate_token(info.message().to_owned())
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            TokenRepositoryError::connection("database connection error")
        }
        _ => TokenRepositoryError::query("database error"),
    }
}

fn row_to_token(row: MagicTokenRow) -> Result<MagicToken, TokenRepositoryError> {
    MagicToken::try_from(row).map_err(|err| TokenRepositoryError::query(err.to_string()))
}

#[async_trait]
impl TokenRepository for DieselTokenRepository {
    async fn insert(&self, token: &MagicToken) -> Result<(), TokenRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::insert_into(magic_tokens::table)
            .values(NewMagicTokenRow::from_domain(token))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn find_by_id(&self, id: &TokenId) -> Result<Option<MagicToken>, TokenRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<MagicTokenRow> = magic_tokens::table
            .filter(magic_tokens::id.eq(id.as_uuid()))
            .select(MagicTokenRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_token).transpose()
    }

    async fn record_use(
        &self,
        id: &TokenId,
        used_at: DateTime<Utc>,
    ) -> Result<Option<MagicToken>, TokenRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<MagicTokenRow> = diesel::update(magic_tokens::table)
            .filter(magic_tokens::id.eq(id.as_uuid()))
            .set((
                magic_tokens::usage_count.eq(magic_tokens::usage_count + 1),
                magic_tokens::last_used_at.eq(used_at),
            ))
            .returning(MagicTokenRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_token).transpose()
    }

    async fn revoke(&self, id: &TokenId) -> Result<bool, TokenRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = diesel::update(magic_tokens::table)
            .filter(magic_tokens::id.eq(id.as_uuid()))
            .set(magic_tokens::status.eq(TokenStatus::Revoked.as_str()))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(updated > 0)
    }
}
