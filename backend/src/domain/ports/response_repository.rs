//! Port abstraction for availability-response persistence.
//!
//! Responses are unique on (prompt, user); submission is a full replace of
//! the slot collection, and reminder bookkeeping mutates the same row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ids::{PromptId, UserId};
use crate::domain::prompt::{AvailabilityResponse, TimeSlot};

use super::define_port_error;

define_port_error! {
    /// Errors raised by response repository adapters.
    pub enum ResponseRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "response repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "response repository query failed: {message}",
    }
}

/// Port for per-member response rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// Replace the member's slots and stamp the submission time, creating the
    /// row if none exists yet.
    async fn submit(
        &self,
        prompt_id: &PromptId,
        user_id: &UserId,
        slots: &[TimeSlot],
        submitted_at: DateTime<Utc>,
    ) -> Result<AvailabilityResponse, ResponseRepositoryError>;

    /// Look up one member's response row.
    async fn find(
        &self,
        prompt_id: &PromptId,
        user_id: &UserId,
    ) -> Result<Option<AvailabilityResponse>, ResponseRepositoryError>;

    /// All response rows for a prompt, placeholders included.
    async fn list_for_prompt(
        &self,
        prompt_id: &PromptId,
    ) -> Result<Vec<AvailabilityResponse>, ResponseRepositoryError>;

    /// Record a reminder: create a placeholder row if needed, increment the
    /// reminder count, and set last-reminded. Returns the updated row.
    async fn record_reminder(
        &self,
        prompt_id: &PromptId,
        user_id: &UserId,
        reminded_at: DateTime<Utc>,
    ) -> Result<AvailabilityResponse, ResponseRepositoryError>;
}

/// Fixture that accepts writes and reports no stored responses.
#[derive(Debug, Default)]
pub struct FixtureResponseRepository;

#[async_trait]
impl ResponseRepository for FixtureResponseRepository {
    async fn submit(
        &self,
        prompt_id: &PromptId,
        user_id: &UserId,
        slots: &[TimeSlot],
        submitted_at: DateTime<Utc>,
    ) -> Result<AvailabilityResponse, ResponseRepositoryError> {
        Ok(AvailabilityResponse {
            prompt_id: *prompt_id,
            user_id: *user_id,
            slots: slots.to_vec(),
            submitted_at: Some(submitted_at),
            last_reminded_at: None,
            reminder_count: 0,
        })
    }

    async fn find(
        &self,
        _prompt_id: &PromptId,
        _user_id: &UserId,
    ) -> Result<Option<AvailabilityResponse>, ResponseRepositoryError> {
        Ok(None)
    }

    async fn list_for_prompt(
        &self,
        _prompt_id: &PromptId,
    ) -> Result<Vec<AvailabilityResponse>, ResponseRepositoryError> {
        Ok(Vec::new())
    }

    async fn record_reminder(
        &self,
        prompt_id: &PromptId,
        user_id: &UserId,
        reminded_at: DateTime<Utc>,
    ) -> Result<AvailabilityResponse, ResponseRepositoryError> {
        let mut row = AvailabilityResponse::placeholder(*prompt_id, *user_id);
        row.last_reminded_at = Some(reminded_at);
        row.reminder_count = 1;
        Ok(row)
    }
}
