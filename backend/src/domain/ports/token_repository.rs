//! Port abstraction for magic-token persistence.
//!
//! Token rows are never deleted (kept for audit); they are mutated only by
//! usage tracking and explicit revocation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ids::TokenId;
use crate::domain::token::MagicToken;

use super::define_port_error;

define_port_error! {
    /// Errors raised by token repository adapters.
    pub enum TokenRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "token repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "token repository query failed: {message}",
        /// A token row with this identifier already exists.
        DuplicateToken { message: String } => "token identifier already exists: {message}",
    }
}

/// Port for storing and mutating issued token rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Persist a freshly issued token row.
    async fn insert(&self, token: &MagicToken) -> Result<(), TokenRepositoryError>;

    /// Look up a token row by its identifier.
    async fn find_by_id(&self, id: &TokenId) -> Result<Option<MagicToken>, TokenRepositoryError>;

    /// Record one successful use: increment usage count, set last-used.
    ///
    /// Returns the updated row, or `None` if the id is unknown.
    async fn record_use(
        &self,
        id: &TokenId,
        used_at: DateTime<Utc>,
    ) -> Result<Option<MagicToken>, TokenRepositoryError>;

    /// Mark a token revoked. Idempotent; unknown ids return `false`.
    async fn revoke(&self, id: &TokenId) -> Result<bool, TokenRepositoryError>;
}

/// Fixture implementation for tests that do not exercise token storage.
///
/// Stores nothing and finds nothing.
#[derive(Debug, Default)]
pub struct FixtureTokenRepository;

#[async_trait]
impl TokenRepository for FixtureTokenRepository {
    async fn insert(&self, _token: &MagicToken) -> Result<(), TokenRepositoryError> {
        Ok(())
    }

    async fn find_by_id(&self, _id: &TokenId) -> Result<Option<MagicToken>, TokenRepositoryError> {
        Ok(None)
    }

    async fn record_use(
        &self,
        _id: &TokenId,
        _used_at: DateTime<Utc>,
    ) -> Result<Option<MagicToken>, TokenRepositoryError> {
        Ok(None)
    }

    async fn revoke(&self, _id: &TokenId) -> Result<bool, TokenRepositoryError> {
        Ok(false)
    }
}
