//! Port abstraction for the worker-side view of the durable job store.
//!
//! The queue gives at-least-once delivery with FIFO-within-a-family best
//! effort; exhausted jobs stay in a terminal failed state for operator
//! inspection, never purged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ids::JobId;
use crate::domain::scheduler::jobs::{ClaimedJob, JobFamily};

use super::define_port_error;

define_port_error! {
    /// Errors raised by job store adapters.
    pub enum JobStoreError {
        /// Store backend could not be reached.
        Connection { message: String } => "job store connection failed: {message}",
        /// Claim or completion failed.
        Query { message: String } => "job store query failed: {message}",
    }
}

/// How a delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCompletion {
    /// Handler finished (including idempotent no-op skips).
    Succeeded,
    /// Handler failed; retry at the given instant, or leave terminally
    /// failed when `retry_at` is `None`.
    Failed {
        error: String,
        retry_at: Option<DateTime<Utc>>,
    },
}

/// Worker-side port over the durable queue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Claim the oldest due job of the family, marking it running and
    /// incrementing its attempt counter. Concurrent claimers never receive
    /// the same job.
    async fn claim_due(
        &self,
        family: JobFamily,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedJob>, JobStoreError>;

    /// Record the outcome of a claimed job's attempt.
    async fn finish(&self, id: &JobId, outcome: JobCompletion) -> Result<(), JobStoreError>;
}

/// Fixture store with no jobs.
#[derive(Debug, Default)]
pub struct FixtureJobStore;

#[async_trait]
impl JobStore for FixtureJobStore {
    async fn claim_due(
        &self,
        _family: JobFamily,
        _now: DateTime<Utc>,
    ) -> Result<Option<ClaimedJob>, JobStoreError> {
        Ok(None)
    }

    async fn finish(&self, _id: &JobId, _outcome: JobCompletion) -> Result<(), JobStoreError> {
        Ok(())
    }
}
