//! Availability submission and respondent-status views.
//!
//! Submission is token-gated: callers prove who they are by presenting a
//! valid magic-link token, never by session state. On-time submissions
//! refresh the prompt's suggestion set immediately; late submissions are
//! stored for the record but leave the frozen suggestion set untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::info;

use super::error::Error;
use super::ids::{PromptId, UserId};
use super::overlap::{compute_suggestions, OverlapConfig};
use super::ports::{
    GroupDirectory, GroupDirectoryError, PromptRepository, ResponseRepository,
    ResponseRepositoryError, SettingsRepository, SettingsRepositoryError, SuggestionRepository,
    SuggestionRepositoryError, TokenAnalyticsRepository, TokenRepository,
};
use super::prompt::{AvailabilityPrompt, AvailabilityResponse, TimeSlot};
use super::suggestion::Suggestion;
use super::token::{RequestMetadata, ValidationFailure, ValidationOutcome};
use super::token_service::TokenService;

fn map_response_error(error: ResponseRepositoryError) -> Error {
    match error {
        ResponseRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("response repository unavailable: {message}"))
        }
        ResponseRepositoryError::Query { message } => {
            Error::internal(format!("response repository error: {message}"))
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

fn map_settings_error(error: SettingsRepositoryError) -> Error {
    match error {
        SettingsRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("settings repository unavailable: {message}"))
        }
        SettingsRepositoryError::Query { message } => {
            Error::internal(format!("settings repository error: {message}"))
        }
    }
}

fn map_directory_error(error: GroupDirectoryError) -> Error {
    match error {
        GroupDirectoryError::Connection { message } => {
            Error::service_unavailable(format!("group directory unavailable: {message}"))
        }
        GroupDirectoryError::Query { message } => {
            Error::internal(format!("group directory error: {message}"))
        }
        GroupDirectoryError::GroupMissing { message } => Error::not_found(message),
    }
}

/// Result of presenting a token with a slot payload.
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    /// The response row was written.
    Accepted {
        response: AvailabilityResponse,
        /// Acceptance relied on the post-expiry grace rule.
        grace_used: bool,
        /// Arrived after the deadline or close; stored but excluded from the
        /// frozen suggestion set.
        late: bool,
    },
    /// The token was rejected; the reason stays in the analytics log.
    Rejected { reason: ValidationFailure },
}

/// Everything the availability form needs to render, resolved from a token.
#[derive(Debug, Clone)]
pub struct FormContext {
    pub prompt: AvailabilityPrompt,
    pub respondent: UserId,
    pub display_name: String,
    pub existing: Option<AvailabilityResponse>,
    pub grace_used: bool,
}

/// One member's row in the respondent-status view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespondentStatus {
    pub user_id: UserId,
    pub display_name: String,
    pub has_submitted: bool,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Token-gated submission flow plus the status and suggestion read views.
pub struct AvailabilityService<T: ?Sized, A: ?Sized> {
    tokens: Arc<TokenService<T, A>>,
    prompts: Arc<dyn PromptRepository>,
    responses: Arc<dyn ResponseRepository>,
    suggestions: Arc<dyn SuggestionRepository>,
    settings: Arc<dyn SettingsRepository>,
    directory: Arc<dyn GroupDirectory>,
    clock: Arc<dyn Clock>,
}

impl<T: ?Sized, A: ?Sized> AvailabilityService<T, A>
where
    T: TokenRepository,
    A: TokenAnalyticsRepository,
{
    /// Wire the service over injected collaborators.
    pub fn new(
        tokens: Arc<TokenService<T, A>>,
        prompts: Arc<dyn PromptRepository>,
        responses: Arc<dyn ResponseRepository>,
        suggestions: Arc<dyn SuggestionRepository>,
        settings: Arc<dyn SettingsRepository>,
        directory: Arc<dyn GroupDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            prompts,
            responses,
            suggestions,
            settings,
            directory,
            clock,
        }
    }

    /// Resolve a form-load token into render context.
    ///
    /// Used by the GET side of the form so a member sees their name, the
    /// prompt message, and any previously submitted slots.
    pub async fn form_context(
        &self,
        presented: &str,
        requester: RequestMetadata,
    ) -> Result<Result<FormContext, ValidationFailure>, Error> {
        let outcome = self.tokens.validate(presented, None, requester).await?;
        let (claims, token, grace_used) = match outcome {
            ValidationOutcome::Valid {
                claims,
                token,
                grace_used,
            } => (claims, token, grace_used),
            ValidationOutcome::Invalid { reason } => return Ok(Err(reason)),
        };

        let prompt = self.require_prompt(&token.prompt_id).await?;
        let existing = self
            .responses
            .find(&token.prompt_id, &token.user_id)
            .await
            .map_err(map_response_error)?;

        Ok(Ok(FormContext {
            prompt,
            respondent: token.user_id,
            display_name: claims.name,
            existing,
            grace_used,
        }))
    }

    /// Submit availability slots against a presented token.
    ///
    /// A rejected token yields [`SubmissionOutcome::Rejected`]; only
    /// infrastructure faults surface as errors. An empty slot list is a valid
    /// submission meaning "no availability this week".
    pub async fn submit(
        &self,
        presented: &str,
        form_loaded_at: Option<DateTime<Utc>>,
        slots: Vec<TimeSlot>,
        requester: RequestMetadata,
    ) -> Result<SubmissionOutcome, Error> {
        let outcome = self
            .tokens
            .validate(presented, form_loaded_at, requester)
            .await?;
        let (token, grace_used) = match outcome {
            ValidationOutcome::Valid {
                token, grace_used, ..
            } => (token, grace_used),
            ValidationOutcome::Invalid { reason } => {
                return Ok(SubmissionOutcome::Rejected { reason })
            }
        };

        let prompt = self.require_prompt(&token.prompt_id).await?;
        let now = self.clock.utc();
        let late = !prompt.status.is_open() || now > prompt.deadline;

        let response = self
            .responses
            .submit(&token.prompt_id, &token.user_id, &slots, now)
            .await
            .map_err(map_response_error)?;

        if late {
            info!(prompt_id = %prompt.id, user_id = %token.user_id,
                "stored late availability submission without refreshing suggestions");
        } else {
            self.refresh_suggestions(&prompt).await?;
        }

        Ok(SubmissionOutcome::Accepted {
            response,
            grace_used,
            late,
        })
    }

    /// Recompute and replace the suggestion set for an open prompt.
    ///
    /// Closed and converted prompts have a frozen suggestion set; asking to
    /// refresh one is a conflict.
    pub async fn recompute(&self, prompt_id: &PromptId) -> Result<Vec<Suggestion>, Error> {
        let prompt = self.require_prompt(prompt_id).await?;
        if !prompt.status.is_open() {
            return Err(Error::conflict(format!(
                "prompt {prompt_id} is {} and its suggestions are frozen",
                prompt.status.as_str()
            )));
        }
        self.refresh_suggestions(&prompt).await
    }

    /// The stored suggestion set for a prompt, best ranked first.
    pub async fn suggestions(&self, prompt_id: &PromptId) -> Result<Vec<Suggestion>, Error> {
        self.require_prompt(prompt_id).await?;
        let mut suggestions = self
            .suggestions
            .list_for_prompt(prompt_id)
            .await
            .map_err(map_suggestion_error)?;
        suggestions.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.starts_at.cmp(&b.starts_at))
                .then_with(|| a.ends_at.cmp(&b.ends_at))
        });
        Ok(suggestions)
    }

    /// Who has and has not responded, as visible to `caller`.
    ///
    /// Under blind voting a non-admin who has not submitted sees only their
    /// own row; admins and submitters see the full roster.
    pub async fn respondent_status(
        &self,
        prompt_id: &PromptId,
        caller: &UserId,
    ) -> Result<Vec<RespondentStatus>, Error> {
        let prompt = self.require_prompt(prompt_id).await?;
        let members = self
            .directory
            .active_members(&prompt.group_id)
            .await
            .map_err(map_directory_error)?;
        let caller_member = members
            .iter()
            .find(|member| member.user_id == *caller)
            .ok_or_else(|| Error::forbidden("caller is not an active member of this group"))?;

        let responses = self
            .responses
            .list_for_prompt(prompt_id)
            .await
            .map_err(map_response_error)?;
        let submitted_at_for = |user_id: &UserId| {
            responses
                .iter()
                .find(|row| row.user_id == *user_id)
                .and_then(|row| row.submitted_at)
        };

        let caller_submitted = submitted_at_for(caller).is_some();
        let restricted = prompt.blind_voting && !caller_member.is_admin && !caller_submitted;

        let statuses = members
            .iter()
            .filter(|member| !restricted || member.user_id == *caller)
            .map(|member| {
                let submitted_at = submitted_at_for(&member.user_id);
                RespondentStatus {
                    user_id: member.user_id,
                    display_name: member.display_name.clone(),
                    has_submitted: submitted_at.is_some(),
                    submitted_at,
                }
            })
            .collect();
        Ok(statuses)
    }

    async fn require_prompt(&self, id: &PromptId) -> Result<AvailabilityPrompt, Error> {
        self.prompts
            .find_by_id(id)
            .await
            .map_err(|err| Error::internal(format!("prompt repository error: {err}")))?
            .ok_or_else(|| Error::not_found(format!("prompt {id} not found")))
    }

    async fn refresh_suggestions(
        &self,
        prompt: &AvailabilityPrompt,
    ) -> Result<Vec<Suggestion>, Error> {
        let settings = self
            .settings
            .find_for_group(&prompt.group_id)
            .await
            .map_err(map_settings_error)?;
        let config = settings
            .as_ref()
            .map_or_else(OverlapConfig::fallback, OverlapConfig::from_settings);

        let responses = self
            .responses
            .list_for_prompt(&prompt.id)
            .await
            .map_err(map_response_error)?;
        let suggestions = compute_suggestions(prompt.id, &responses, &config);
        self.suggestions
            .replace_for_prompt(&prompt.id, &suggestions)
            .await
            .map_err(map_suggestion_error)?;
        info!(prompt_id = %prompt.id, count = suggestions.len(), "refreshed suggestion set");
        Ok(suggestions)
    }
}

#[cfg(test)]
#[path = "availability_tests.rs"]
mod tests;
