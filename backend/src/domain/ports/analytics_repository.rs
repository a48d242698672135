//! Port abstraction for the append-only token analytics log.

use async_trait::async_trait;

use crate::domain::token::{AnalyticsSummary, TokenAnalyticsRecord};

use super::define_port_error;

define_port_error! {
    /// Errors raised by analytics repository adapters.
    pub enum AnalyticsRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "analytics repository connection failed: {message}",
        /// Append or aggregate query failed.
        Query { message: String } => "analytics repository query failed: {message}",
    }
}

/// Port for recording validation attempts and reporting aggregates.
///
/// Records are write-once; there is no mutation surface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenAnalyticsRepository: Send + Sync {
    /// Append one validation-attempt record.
    async fn append(&self, record: &TokenAnalyticsRecord) -> Result<(), AnalyticsRepositoryError>;

    /// Aggregate counts for operator reporting.
    async fn summary(&self) -> Result<AnalyticsSummary, AnalyticsRepositoryError>;
}

/// Fixture that discards records and reports an empty summary.
#[derive(Debug, Default)]
pub struct FixtureTokenAnalyticsRepository;

#[async_trait]
impl TokenAnalyticsRepository for FixtureTokenAnalyticsRepository {
    async fn append(&self, _record: &TokenAnalyticsRecord) -> Result<(), AnalyticsRepositoryError> {
        Ok(())
    }

    async fn summary(&self) -> Result<AnalyticsSummary, AnalyticsRepositoryError> {
        Ok(AnalyticsSummary::default())
    }
}
