//! Port abstraction for suggestion persistence.

use async_trait::async_trait;

use crate::domain::ids::{EventId, PromptId, SuggestionId};
use crate::domain::suggestion::Suggestion;

use super::define_port_error;

define_port_error! {
    /// Errors raised by suggestion repository adapters.
    pub enum SuggestionRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "suggestion repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "suggestion repository query failed: {message}",
    }
}

/// Port for the computed suggestion set of a prompt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SuggestionRepository: Send + Sync {
    /// Atomically replace the prompt's suggestion set with a fresh run's
    /// output. Prior suggestions for the prompt are superseded, never
    /// accumulated.
    async fn replace_for_prompt(
        &self,
        prompt_id: &PromptId,
        suggestions: &[Suggestion],
    ) -> Result<(), SuggestionRepositoryError>;

    /// The current suggestion set, ranked best first.
    async fn list_for_prompt(
        &self,
        prompt_id: &PromptId,
    ) -> Result<Vec<Suggestion>, SuggestionRepositoryError>;

    /// Record the event a suggestion was converted into.
    async fn mark_converted(
        &self,
        suggestion_id: &SuggestionId,
        event_id: &EventId,
    ) -> Result<Option<Suggestion>, SuggestionRepositoryError>;
}

/// Fixture that discards suggestion sets.
#[derive(Debug, Default)]
pub struct FixtureSuggestionRepository;

#[async_trait]
impl SuggestionRepository for FixtureSuggestionRepository {
    async fn replace_for_prompt(
        &self,
        _prompt_id: &PromptId,
        _suggestions: &[Suggestion],
    ) -> Result<(), SuggestionRepositoryError> {
        Ok(())
    }

    async fn list_for_prompt(
        &self,
        _prompt_id: &PromptId,
    ) -> Result<Vec<Suggestion>, SuggestionRepositoryError> {
        Ok(Vec::new())
    }

    async fn mark_converted(
        &self,
        _suggestion_id: &SuggestionId,
        _event_id: &EventId,
    ) -> Result<Option<Suggestion>, SuggestionRepositoryError> {
        Ok(None)
    }
}
