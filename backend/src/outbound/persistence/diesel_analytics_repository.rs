//! PostgreSQL-backed `TokenAnalyticsRepository` implementation using Diesel.
//!
//! The analytics table is append-only; the summary view aggregates it with
//! filtered counts rather than loading rows.

use async_trait::async_trait;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ports::{AnalyticsRepositoryError, TokenAnalyticsRepository};
use crate::domain::token::{AnalyticsSummary, TokenAnalyticsRecord, ValidationFailure};

use super::models::NewTokenAnalyticsRow;
use super::pool::{DbPool, PoolError};
use super::schema::token_analytics;

/// Diesel-backed implementation of the `TokenAnalyticsRepository` port.
#[derive(Clone)]
pub struct DieselAnalyticsRepository {
    pool: DbPool,
}

impl DieselAnalyticsRepository {
    /// Create a repository over the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> AnalyticsRepositoryError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            AnalyticsRepositoryError::connection(message)
        }
    }
}

fn map_diesel_error(error: diesel::result::Error) -> AnalyticsRepositoryError {
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
            AnalyticsRepositoryError::connection("database connection error")
        }
        _ => AnalyticsRepositoryError::query("database error"),
    }
}

fn as_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[async_trait]
impl TokenAnalyticsRepository for DieselAnalyticsRepository {
    async fn append(&self, record: &TokenAnalyticsRecord) -> Result<(), AnalyticsRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::insert_into(token_analytics::table)
            .values(NewTokenAnalyticsRow::from_domain(record))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn summary(&self) -> Result<AnalyticsSummary, AnalyticsRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let attempts: i64 = token_analytics::table
            .select(count_star())
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let successes: i64 = token_analytics::table
            .filter(token_analytics::success.eq(true))
            .select(count_star())
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let grace_uses: i64 = token_analytics::table
            .filter(token_analytics::grace_used.eq(true))
            .select(count_star())
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let reasons: Vec<(Option<String>, i64)> = token_analytics::table
            .filter(token_analytics::failure_reason.is_not_null())
            .group_by(token_analytics::failure_reason)
            .select((token_analytics::failure_reason, count_star()))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let mut summary = AnalyticsSummary {
            attempts: as_count(attempts),
            successes: as_count(successes),
            grace_uses: as_count(grace_uses),
            ..AnalyticsSummary::default()
        };
        for (reason, count) in reasons {
            let Some(reason) = reason else { continue };
            match reason.parse::<ValidationFailure>() {
                Ok(ValidationFailure::InvalidToken) => summary.invalid_token = as_count(count),
                Ok(ValidationFailure::TokenNotFound) => summary.token_not_found = as_count(count),
                Ok(ValidationFailure::TokenRevoked) => summary.token_revoked = as_count(count),
                Ok(ValidationFailure::TokenExpired) => summary.token_expired = as_count(count),
                Err(detail) => debug!(reason, detail, "skipping unknown failure reason"),
            }
        }
        Ok(summary)
    }
}
