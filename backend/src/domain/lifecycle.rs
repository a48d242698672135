//! Prompt lifecycle state machine.
//!
//! pending → active → closed → converted, with `closed` and `converted`
//! terminal. The storage layer's partial unique constraint on (group, week)
//! is the sole concurrency control: a duplicate-week rejection means another
//! writer got there first and is treated as "already exists, proceed as
//! no-op", never as a hard error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::info;
use uuid::Uuid;

use super::error::Error;
use super::ids::{EventId, GroupId, PromptId, SuggestionId};
use super::ports::{
    PromptRepository, PromptRepositoryError, SuggestionRepository, SuggestionRepositoryError,
};
use super::prompt::{AvailabilityPrompt, PromptStatus};
use super::week::WeekId;

fn map_prompt_error(error: PromptRepositoryError) -> Error {
    match error {
        PromptRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("prompt repository unavailable: {message}"))
        }
        PromptRepositoryError::Query { message } => {
            Error::internal(format!("prompt repository error: {message}"))
        }
        PromptRepositoryError::DuplicateWeek { message } => {
            Error::conflict(format!("prompt already exists: {message}"))
        }
    }
}

fn map_suggestion_error(error: SuggestionRepositoryError) -> Error {
    match error {
        SuggestionRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("suggestion repository unavailable: {message}"))
        }
        SuggestionRepositoryError::Query { message } => {
            Error::internal(format!("suggestion repository error: {message}"))
        }
    }
}

/// Request to open a new weekly prompt.
#[derive(Debug, Clone)]
pub struct NewPrompt {
    pub group_id: GroupId,
    pub game_id: Option<Uuid>,
    pub deadline: DateTime<Utc>,
    pub custom_message: Option<String>,
    pub auto_schedule: bool,
    pub blind_voting: bool,
}

/// Result of attempting to create a prompt for a group/week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A fresh pending prompt was created.
    Created(AvailabilityPrompt),
    /// An open prompt already exists for this group/week; idempotent no-op.
    AlreadyExists(AvailabilityPrompt),
}

/// Result of a close attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The prompt moved active → closed.
    Closed(AvailabilityPrompt),
    /// The prompt was already terminal; treat as a cancellation signal.
    AlreadyTerminal(AvailabilityPrompt),
}

/// Owns prompt state transitions and the one-open-prompt-per-week guard.
pub struct PromptLifecycle {
    prompts: Arc<dyn PromptRepository>,
    suggestions: Arc<dyn SuggestionRepository>,
    clock: Arc<dyn Clock>,
}

impl PromptLifecycle {
    /// Create a lifecycle service over injected stores and clock.
    pub fn new(
        prompts: Arc<dyn PromptRepository>,
        suggestions: Arc<dyn SuggestionRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            prompts,
            suggestions,
            clock,
        }
    }

    /// Create a pending prompt for the week containing `now`.
    ///
    /// If an open prompt for the same (group, week) already exists, found by
    /// the pre-check or surfaced as a duplicate-key rejection from a racing
    /// writer, it is returned unchanged.
    pub async fn create(&self, request: NewPrompt) -> Result<CreateOutcome, Error> {
        let now = self.clock.utc();
        let week = WeekId::for_instant(now);

        if let Some(existing) = self
            .prompts
            .find_open_for_week(&request.group_id, &week)
            .await
            .map_err(map_prompt_error)?
        {
            return Ok(CreateOutcome::AlreadyExists(existing));
        }

        let prompt = AvailabilityPrompt {
            id: PromptId::random(),
            group_id: request.group_id,
            game_id: request.game_id,
            created_at: now,
            deadline: request.deadline,
            status: PromptStatus::Pending,
            week: week.clone(),
            custom_message: request.custom_message,
            auto_schedule: request.auto_schedule,
            blind_voting: request.blind_voting,
        };

        match self.prompts.insert(&prompt).await {
            Ok(()) => {
                info!(prompt_id = %prompt.id, group_id = %prompt.group_id, week = %week,
                    "created availability prompt");
                Ok(CreateOutcome::Created(prompt))
            }
            Err(PromptRepositoryError::DuplicateWeek { .. }) => {
                // Lost the race; the winner's row is authoritative.
                let existing = self
                    .prompts
                    .find_open_for_week(&request.group_id, &week)
                    .await
                    .map_err(map_prompt_error)?
                    .ok_or_else(|| {
                        Error::internal("open prompt disappeared during duplicate resolution")
                    })?;
                Ok(CreateOutcome::AlreadyExists(existing))
            }
            Err(err) => Err(map_prompt_error(err)),
        }
    }

    /// Transition pending → active after tokens were minted and sent.
    ///
    /// Already-active prompts are returned as-is (idempotent retry path);
    /// terminal prompts are a conflict.
    pub async fn activate(&self, id: &PromptId) -> Result<AvailabilityPrompt, Error> {
        if let Some(updated) = self
            .prompts
            .transition_status(id, PromptStatus::Pending, PromptStatus::Active)
            .await
            .map_err(map_prompt_error)?
        {
            return Ok(updated);
        }

        let current = self.require(id).await?;
        match current.status {
            PromptStatus::Active => Ok(current),
            status => Err(Error::conflict(format!(
                "prompt {id} is {} and cannot be activated",
                status.as_str()
            ))),
        }
    }

    /// Transition active (or still-pending) → closed.
    ///
    /// A prompt already in a terminal state is reported as such so deadline
    /// and reminder jobs can exit early without side effects.
    pub async fn close(&self, id: &PromptId) -> Result<CloseOutcome, Error> {
        for from in [PromptStatus::Active, PromptStatus::Pending] {
            if let Some(updated) = self
                .prompts
                .transition_status(id, from, PromptStatus::Closed)
                .await
                .map_err(map_prompt_error)?
            {
                info!(prompt_id = %id, "closed availability prompt");
                return Ok(CloseOutcome::Closed(updated));
            }
        }

        let current = self.require(id).await?;
        if current.status.is_terminal() {
            Ok(CloseOutcome::AlreadyTerminal(current))
        } else {
            Err(Error::internal(format!(
                "prompt {id} could not be closed from {}",
                current.status.as_str()
            )))
        }
    }

    /// Convert a closed prompt's suggestion into a scheduled event.
    pub async fn convert(
        &self,
        prompt_id: &PromptId,
        suggestion_id: &SuggestionId,
        event_id: &EventId,
    ) -> Result<AvailabilityPrompt, Error> {
        let updated = self
            .prompts
            .transition_status(prompt_id, PromptStatus::Closed, PromptStatus::Converted)
            .await
            .map_err(map_prompt_error)?;
        let Some(prompt) = updated else {
            let current = self.require(prompt_id).await?;
            return Err(Error::conflict(format!(
                "prompt {prompt_id} is {} and cannot be converted",
                current.status.as_str()
            )));
        };

        self.suggestions
            .mark_converted(suggestion_id, event_id)
            .await
            .map_err(map_suggestion_error)?
            .ok_or_else(|| Error::not_found(format!("suggestion {suggestion_id} not found")))?;

        info!(prompt_id = %prompt_id, suggestion_id = %suggestion_id, event_id = %event_id,
            "converted prompt suggestion into event");
        Ok(prompt)
    }

    /// Remove the open prompt for this group's current week, letting a manual
    /// re-trigger bypass the idempotency guard.
    pub async fn clear_current_week(&self, group_id: &GroupId) -> Result<bool, Error> {
        let week = WeekId::for_instant(self.clock.utc());
        self.prompts
            .clear_open_for_week(group_id, &week)
            .await
            .map_err(map_prompt_error)
    }

    /// Fetch a prompt or fail with not-found.
    pub async fn require(&self, id: &PromptId) -> Result<AvailabilityPrompt, Error> {
        self.prompts
            .find_by_id(id)
            .await
            .map_err(map_prompt_error)?
            .ok_or_else(|| Error::not_found(format!("prompt {id} not found")))
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
