//! Port abstraction for availability-prompt persistence.
//!
//! The storage layer enforces the one-open-prompt-per-(group, week) invariant
//! with a partial unique constraint; conflicting inserts surface as
//! [`PromptRepositoryError::DuplicateWeek`] and callers treat that as
//! "already exists, proceed as no-op".

use async_trait::async_trait;

use crate::domain::ids::{GroupId, PromptId};
use crate::domain::prompt::{AvailabilityPrompt, PromptStatus};
use crate::domain::week::WeekId;

use super::define_port_error;

define_port_error! {
    /// Errors raised by prompt repository adapters.
    pub enum PromptRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "prompt repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "prompt repository query failed: {message}",
        /// An open prompt already exists for this (group, week).
        DuplicateWeek { message: String } => "open prompt already exists for this week: {message}",
    }
}

/// Port for prompt rows and their status transitions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromptRepository: Send + Sync {
    /// Insert a new prompt row. Fails with `DuplicateWeek` when an open
    /// prompt for the same (group, week) exists.
    async fn insert(&self, prompt: &AvailabilityPrompt) -> Result<(), PromptRepositoryError>;

    /// Look up a prompt by id.
    async fn find_by_id(
        &self,
        id: &PromptId,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError>;

    /// Find the open (pending or active) prompt for a group and week, if any.
    async fn find_open_for_week(
        &self,
        group_id: &GroupId,
        week: &WeekId,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError>;

    /// Compare-and-set the prompt status.
    ///
    /// Returns the updated prompt when the row was in `from`; `None` when the
    /// row was missing or already moved on (idempotent retry path).
    async fn transition_status(
        &self,
        id: &PromptId,
        from: PromptStatus,
        to: PromptStatus,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError>;

    /// Delete the open prompt for a group/week so a manual re-trigger can
    /// bypass the idempotency guard. Returns `true` if a row was removed.
    async fn clear_open_for_week(
        &self,
        group_id: &GroupId,
        week: &WeekId,
    ) -> Result<bool, PromptRepositoryError>;
}

/// Fixture that stores nothing; every lookup misses.
#[derive(Debug, Default)]
pub struct FixturePromptRepository;

#[async_trait]
impl PromptRepository for FixturePromptRepository {
    async fn insert(&self, _prompt: &AvailabilityPrompt) -> Result<(), PromptRepositoryError> {
        Ok(())
    }

    async fn find_by_id(
        &self,
        _id: &PromptId,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError> {
        Ok(None)
    }

    async fn find_open_for_week(
        &self,
        _group_id: &GroupId,
        _week: &WeekId,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError> {
        Ok(None)
    }

    async fn transition_status(
        &self,
        _id: &PromptId,
        _from: PromptStatus,
        _to: PromptStatus,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError> {
        Ok(None)
    }

    async fn clear_open_for_week(
        &self,
        _group_id: &GroupId,
        _week: &WeekId,
    ) -> Result<bool, PromptRepositoryError> {
        Ok(false)
    }
}
