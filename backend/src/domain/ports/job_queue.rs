//! Port abstraction for the durable job queue.
//!
//! Each job family runs on its own queue with an independent retry policy;
//! delivery is at-least-once, so handlers carry their own idempotency guards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ids::JobId;
use crate::domain::scheduler::jobs::JobPayload;

use super::define_port_error;

define_port_error! {
    /// Errors raised by queue adapters.
    pub enum JobQueueError {
        /// Queue backend could not be reached.
        Connection { message: String } => "job queue connection failed: {message}",
        /// Enqueue or state change failed.
        Dispatch { message: String } => "job dispatch failed: {message}",
    }
}

/// Port for submitting jobs to their family queue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job to run at (or after) `run_at`.
    ///
    /// One queued job per (payload, `run_at`): re-submitting an identical job
    /// that is still queued is a no-op and returns `None`, so producers may
    /// plan the same fire repeatedly without stacking duplicates.
    async fn enqueue(
        &self,
        payload: &JobPayload,
        run_at: DateTime<Utc>,
    ) -> Result<Option<JobId>, JobQueueError>;
}

/// Fixture queue that accepts jobs and forgets them.
#[derive(Debug, Default)]
pub struct FixtureJobQueue;

#[async_trait]
impl JobQueue for FixtureJobQueue {
    async fn enqueue(
        &self,
        _payload: &JobPayload,
        _run_at: DateTime<Utc>,
    ) -> Result<Option<JobId>, JobQueueError> {
        Ok(Some(JobId::random()))
    }
}
