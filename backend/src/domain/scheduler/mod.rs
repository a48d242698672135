//! Scheduling orchestration: cadence planning, prompt creation, staged
//! reminders, and deadline enforcement.
//!
//! Handlers are invoked by queue workers with at-least-once delivery, so each
//! one re-checks current state and reports [`JobOutcome::Skipped`] when the
//! work has already happened or its subject no longer exists. Skips are
//! successes from the queue's point of view; only transient infrastructure
//! faults propagate as errors and trigger the family's retry policy.

pub mod cadence;
pub mod jobs;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mockable::Clock;
use tracing::{info, warn};

use super::error::Error;
use super::ids::{EventId, GroupId, PromptId, UserId};
use super::lifecycle::{CloseOutcome, CreateOutcome, NewPrompt, PromptLifecycle};
use super::overlap::{compute_suggestions, OverlapConfig};
use super::ports::{
    EmailMessage, EmailPurpose, GroupDirectory, GroupDirectoryError, GroupMember, JobQueue,
    JobQueueError, Mailer, MailerError, PromptRepository, ResponseRepository,
    ResponseRepositoryError, SettingsRepository, SettingsRepositoryError, SuggestionRepository,
    SuggestionRepositoryError, TokenAnalyticsRepository, TokenRepository,
};
use super::prompt::{AvailabilityPrompt, GroupPromptSettings, PromptStatus};
use super::suggestion::Suggestion;
use super::token::TokenStatus;
use super::token_service::TokenService;
use super::week::WeekId;
use jobs::{DeadlineJob, JobPayload, PromptCreationJob, ReminderJob, ReminderStage};

/// Automatic reminders per member per prompt, across both stages.
pub const MAX_AUTO_REMINDERS: i32 = 2;
/// Minimum spacing between reminders to the same member, manual included.
pub const MANUAL_REMINDER_COOLDOWN: Duration = Duration::hours(24);
/// How long before the deadline the final-stage reminder aims to land.
pub const FINAL_REMINDER_LEAD: Duration = Duration::hours(24);

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

fn map_queue_error(error: JobQueueError) -> Error {
    match error {
        JobQueueError::Connection { message } => {
            Error::service_unavailable(format!("job queue unavailable: {message}"))
        }
        JobQueueError::Dispatch { message } => {
            Error::internal(format!("job dispatch error: {message}"))
        }
    }
}

fn map_mailer_error(error: MailerError) -> Error {
    let MailerError::Transport { message } = error;
    Error::service_unavailable(format!("mail transport failed: {message}"))
}

/// How a handler disposed of a delivered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The handler did its work.
    Completed,
    /// The work was already done or its subject is gone; not retried.
    Skipped { reason: String },
}

impl JobOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// Admin-supplied fields for a manually created prompt. Anything left unset
/// falls back to the group's settings defaults.
#[derive(Debug, Clone, Default)]
pub struct PromptOverrides {
    pub deadline: Option<DateTime<Utc>>,
    pub auto_schedule: Option<bool>,
    pub blind_voting: Option<bool>,
    pub custom_message: Option<String>,
}

/// Collaborators for [`SchedulingOrchestrator`], wired at the composition root.
pub struct OrchestratorDeps<T: ?Sized, A: ?Sized> {
    pub tokens: Arc<TokenService<T, A>>,
    pub lifecycle: Arc<PromptLifecycle>,
    pub prompts: Arc<dyn PromptRepository>,
    pub responses: Arc<dyn ResponseRepository>,
    pub suggestions: Arc<dyn SuggestionRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub directory: Arc<dyn GroupDirectory>,
    pub mailer: Arc<dyn Mailer>,
    pub queue: Arc<dyn JobQueue>,
    pub clock: Arc<dyn Clock>,
    /// Base URL the availability-form links are built on.
    pub form_base_url: String,
}

/// Drives the weekly prompt flow end to end.
pub struct SchedulingOrchestrator<T: ?Sized, A: ?Sized> {
    deps: OrchestratorDeps<T, A>,
}

impl<T: ?Sized, A: ?Sized> SchedulingOrchestrator<T, A>
where
    T: TokenRepository,
    A: TokenAnalyticsRepository,
{
    pub fn new(deps: OrchestratorDeps<T, A>) -> Self {
        Self { deps }
    }

    /// Enqueue the next cadence fire for every active group.
    ///
    /// Safe to call on any interval: the queue keeps one job per group per
    /// fire instant, so re-planning an already queued fire is a no-op.
    /// Returns the number of newly enqueued jobs.
    pub async fn plan_cadence(&self) -> Result<usize, Error> {
        let now = self.deps.clock.utc();
        let all = self
            .deps
            .settings
            .list_active()
            .await
            .map_err(map_settings_error)?;

        let mut planned = 0;
        for settings in &all {
            let fire_at = cadence::next_fire(settings, now);
            let payload = JobPayload::PromptCreation(PromptCreationJob {
                group_id: settings.group_id,
                settings_id: settings.id,
                timezone: settings.timezone.clone(),
            });
            let enqueued = self
                .deps
                .queue
                .enqueue(&payload, fire_at)
                .await
                .map_err(map_queue_error)?;
            if enqueued.is_some() {
                planned += 1;
                info!(group_id = %settings.group_id, fire_at = %fire_at, "planned cadence fire");
            }
        }
        Ok(planned)
    }

    /// Route a delivered job payload to its handler.
    pub async fn handle(&self, payload: &JobPayload) -> Result<JobOutcome, Error> {
        match payload {
            JobPayload::PromptCreation(job) => self.handle_prompt_creation(job).await,
            JobPayload::Reminder(job) => self.handle_reminder(job).await,
            JobPayload::Deadline(job) => self.handle_deadline(job).await,
        }
    }

    /// Cadence fire: create the week's prompt, mail every active member a
    /// personal link, activate, and schedule reminders plus the deadline job.
    pub async fn handle_prompt_creation(
        &self,
        job: &PromptCreationJob,
    ) -> Result<JobOutcome, Error> {
        let Some(settings) = self
            .deps
            .settings
            .find_by_id(&job.settings_id)
            .await
            .map_err(map_settings_error)?
        else {
            return Ok(JobOutcome::skipped("settings row no longer exists"));
        };
        if !settings.active {
            return Ok(JobOutcome::skipped("prompting disabled for group"));
        }
        self.launch_prompt(&settings, &PromptOverrides::default())
            .await
    }

    /// Create, mail, activate, and schedule followups for one group's weekly
    /// prompt.
    async fn launch_prompt(
        &self,
        settings: &GroupPromptSettings,
        overrides: &PromptOverrides,
    ) -> Result<JobOutcome, Error> {
        let group_id = settings.group_id;
        let members = match self.deps.directory.active_members(&group_id).await {
            Ok(members) => members,
            Err(GroupDirectoryError::GroupMissing { .. }) => {
                return Ok(JobOutcome::skipped("group no longer exists"));
            }
            Err(GroupDirectoryError::Connection { message }) => {
                return Err(Error::service_unavailable(message));
            }
            Err(GroupDirectoryError::Query { message }) => {
                return Err(Error::internal(message));
            }
        };
        if members.is_empty() {
            return Ok(JobOutcome::skipped("group has no active members"));
        }

        let now = self.deps.clock.utc();
        let deadline = overrides
            .deadline
            .unwrap_or_else(|| now + Duration::hours(settings.default_deadline_hours));
        let prompt = match self
            .deps
            .lifecycle
            .create(NewPrompt {
                group_id,
                game_id: None,
                deadline,
                custom_message: overrides
                    .custom_message
                    .clone()
                    .or_else(|| settings.message_template.clone()),
                auto_schedule: overrides.auto_schedule.unwrap_or(false),
                blind_voting: overrides.blind_voting.unwrap_or(false),
            })
            .await?
        {
            CreateOutcome::Created(prompt) => prompt,
            // A retried delivery after a mid-send crash resumes a still
            // pending prompt; an already active one means the first delivery
            // finished.
            CreateOutcome::AlreadyExists(prompt) if prompt.status == PromptStatus::Pending => {
                prompt
            }
            CreateOutcome::AlreadyExists(_) => {
                return Ok(JobOutcome::skipped("prompt already active for this week"));
            }
        };

        let group_name = self.group_name(&group_id).await?;
        for member in &members {
            self.send_form_link(
                &prompt,
                settings,
                &group_name,
                member,
                EmailPurpose::AvailabilityRequest,
            )
            .await?;
        }

        self.deps.lifecycle.activate(&prompt.id).await?;
        self.schedule_followups(&prompt, now).await?;

        info!(prompt_id = %prompt.id, group_id = %group_id, recipients = members.len(),
            "prompt created and activated");
        Ok(JobOutcome::Completed)
    }

    /// Staged reminder: nudge members who have not submitted yet.
    pub async fn handle_reminder(&self, job: &ReminderJob) -> Result<JobOutcome, Error> {
        let Some(prompt) = self
            .deps
            .prompts
            .find_by_id(&job.prompt_id)
            .await
            .map_err(|err| Error::internal(format!("prompt repository error: {err}")))?
        else {
            return Ok(JobOutcome::skipped("prompt no longer exists"));
        };
        if !prompt.status.is_open() {
            return Ok(JobOutcome::skipped("prompt already closed"));
        }
        let now = self.deps.clock.utc();
        if now >= prompt.deadline {
            return Ok(JobOutcome::skipped("deadline already passed"));
        }

        let Some(settings) = self
            .deps
            .settings
            .find_for_group(&prompt.group_id)
            .await
            .map_err(map_settings_error)?
        else {
            return Ok(JobOutcome::skipped("group settings no longer exist"));
        };
        let members = match self.deps.directory.active_members(&prompt.group_id).await {
            Ok(members) => members,
            Err(GroupDirectoryError::GroupMissing { .. }) => {
                return Ok(JobOutcome::skipped("group no longer exists"));
            }
            Err(GroupDirectoryError::Connection { message }) => {
                return Err(Error::service_unavailable(message));
            }
            Err(GroupDirectoryError::Query { message }) => {
                return Err(Error::internal(message));
            }
        };

        let responses = self
            .deps
            .responses
            .list_for_prompt(&job.prompt_id)
            .await
            .map_err(map_response_error)?;
        let group_name = self.group_name(&prompt.group_id).await?;

        let mut reminded = 0usize;
        for member in &members {
            let row = responses.iter().find(|row| row.user_id == member.user_id);
            if row.is_some_and(|row| row.has_submitted()) {
                continue;
            }
            if row.is_some_and(|row| row.reminder_count >= MAX_AUTO_REMINDERS) {
                continue;
            }
            self.send_form_link(
                &prompt,
                &settings,
                &group_name,
                member,
                EmailPurpose::AvailabilityReminder,
            )
            .await?;
            self.deps
                .responses
                .record_reminder(&job.prompt_id, &member.user_id, now)
                .await
                .map_err(map_response_error)?;
            reminded += 1;
        }

        if reminded == 0 {
            return Ok(JobOutcome::skipped("everyone has responded or is capped"));
        }
        info!(prompt_id = %job.prompt_id, stage = job.stage.as_str(), reminded,
            "sent reminder batch");
        Ok(JobOutcome::Completed)
    }

    /// Deadline enforcement: close the prompt, freeze the final suggestion
    /// set, and auto-convert the best qualifying window when configured.
    pub async fn handle_deadline(&self, job: &DeadlineJob) -> Result<JobOutcome, Error> {
        let prompt = match self.deps.lifecycle.close(&job.prompt_id).await {
            Ok(CloseOutcome::Closed(prompt)) => prompt,
            Ok(CloseOutcome::AlreadyTerminal(_)) => {
                return Ok(JobOutcome::skipped("prompt already closed"));
            }
            Err(err) => return Err(err),
        };

        let suggestions = self.freeze_suggestions(&prompt).await?;

        if prompt.auto_schedule {
            if let Some(best) = suggestions.iter().find(|s| s.meets_minimum) {
                let event_id = EventId::random();
                self.deps
                    .lifecycle
                    .convert(&prompt.id, &best.id, &event_id)
                    .await?;
                info!(prompt_id = %prompt.id, suggestion_id = %best.id, event_id = %event_id,
                    "auto-scheduled best qualifying window");
            } else {
                warn!(prompt_id = %prompt.id,
                    "auto-schedule enabled but no window meets minimum attendance");
            }
        }

        Ok(JobOutcome::Completed)
    }

    /// Admin shortcut: drop this week's open prompt and run creation inline.
    pub async fn manual_trigger(
        &self,
        group_id: &GroupId,
        overrides: PromptOverrides,
    ) -> Result<AvailabilityPrompt, Error> {
        let Some(settings) = self
            .deps
            .settings
            .find_for_group(group_id)
            .await
            .map_err(map_settings_error)?
        else {
            return Err(Error::not_found(format!(
                "no prompt settings for group {group_id}"
            )));
        };
        if let Some(deadline) = overrides.deadline {
            if deadline <= self.deps.clock.utc() {
                return Err(Error::invalid_request("deadline must be in the future"));
            }
        }

        self.deps.lifecycle.clear_current_week(group_id).await?;
        let outcome = self.launch_prompt(&settings, &overrides).await?;
        match outcome {
            JobOutcome::Completed => {
                let now = self.deps.clock.utc();
                let week = WeekId::for_instant(now);
                self.deps
                    .prompts
                    .find_open_for_week(group_id, &week)
                    .await
                    .map_err(|err| Error::internal(format!("prompt repository error: {err}")))?
                    .ok_or_else(|| Error::internal("prompt vanished after manual trigger"))
            }
            JobOutcome::Skipped { reason } => Err(Error::conflict(reason)),
        }
    }

    /// Admin-initiated reminder outside the staged schedule, either for one
    /// member or for everyone still owing a response.
    ///
    /// Honours the per-member cooldown. Sends are not blocked by the
    /// automatic-stage cap but do increment the shared reminder count, so a
    /// manual nudge can exhaust a member's remaining staged reminders.
    /// Returns how many members were reminded.
    pub async fn manual_reminder(
        &self,
        prompt_id: &PromptId,
        target: Option<&UserId>,
    ) -> Result<usize, Error> {
        let prompt = self.deps.lifecycle.require(prompt_id).await?;
        if !prompt.status.is_open() {
            return Err(Error::conflict("prompt is no longer accepting responses"));
        }
        let Some(settings) = self
            .deps
            .settings
            .find_for_group(&prompt.group_id)
            .await
            .map_err(map_settings_error)?
        else {
            return Err(Error::not_found(format!(
                "no prompt settings for group {}",
                prompt.group_id
            )));
        };
        let members = match self.deps.directory.active_members(&prompt.group_id).await {
            Ok(members) => members,
            Err(GroupDirectoryError::GroupMissing { message }) => {
                return Err(Error::not_found(message));
            }
            Err(GroupDirectoryError::Connection { message }) => {
                return Err(Error::service_unavailable(message));
            }
            Err(GroupDirectoryError::Query { message }) => {
                return Err(Error::internal(message));
            }
        };
        if let Some(target) = target {
            if !members.iter().any(|member| member.user_id == *target) {
                return Err(Error::not_found(format!(
                    "user {target} is not an active member of group {}",
                    prompt.group_id
                )));
            }
        }
        let responses = self
            .deps
            .responses
            .list_for_prompt(prompt_id)
            .await
            .map_err(map_response_error)?;
        let group_name = self.group_name(&prompt.group_id).await?;
        let now = self.deps.clock.utc();

        let mut reminded = 0usize;
        for member in &members {
            if target.is_some_and(|target| *target != member.user_id) {
                continue;
            }
            let row = responses.iter().find(|row| row.user_id == member.user_id);
            if row.is_some_and(|row| row.has_submitted()) {
                continue;
            }
            let in_cooldown = row
                .and_then(|row| row.last_reminded_at)
                .is_some_and(|last| now - last < MANUAL_REMINDER_COOLDOWN);
            if in_cooldown {
                continue;
            }
            self.send_form_link(
                &prompt,
                &settings,
                &group_name,
                member,
                EmailPurpose::AvailabilityReminder,
            )
            .await?;
            self.deps
                .responses
                .record_reminder(prompt_id, &member.user_id, now)
                .await
                .map_err(map_response_error)?;
            reminded += 1;
        }
        info!(prompt_id = %prompt_id, reminded, "manual reminder dispatched");
        Ok(reminded)
    }

    async fn schedule_followups(
        &self,
        prompt: &AvailabilityPrompt,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let until_deadline = prompt.deadline - now;
        let halfway_at = now + until_deadline / 2;
        let final_at = prompt.deadline - FINAL_REMINDER_LEAD;

        // A stage whose slot has already passed is dropped rather than fired
        // immediately; a prompt this short-lived sends its request email and
        // at most the halfway nudge.
        for (stage, run_at) in [
            (ReminderStage::Halfway, halfway_at),
            (ReminderStage::Final, final_at),
        ] {
            if run_at <= now || run_at >= prompt.deadline {
                continue;
            }
            let payload = JobPayload::Reminder(ReminderJob {
                prompt_id: prompt.id,
                stage,
                group_id: prompt.group_id,
            });
            self.deps
                .queue
                .enqueue(&payload, run_at)
                .await
                .map_err(map_queue_error)?;
        }

        let deadline_payload = JobPayload::Deadline(DeadlineJob {
            prompt_id: prompt.id,
        });
        self.deps
            .queue
            .enqueue(&deadline_payload, prompt.deadline)
            .await
            .map_err(map_queue_error)?;
        Ok(())
    }

    async fn freeze_suggestions(
        &self,
        prompt: &AvailabilityPrompt,
    ) -> Result<Vec<Suggestion>, Error> {
        let settings = self
            .deps
            .settings
            .find_for_group(&prompt.group_id)
            .await
            .map_err(map_settings_error)?;
        let config = settings
            .as_ref()
            .map_or_else(OverlapConfig::fallback, OverlapConfig::from_settings);
        let responses = self
            .deps
            .responses
            .list_for_prompt(&prompt.id)
            .await
            .map_err(map_response_error)?;
        let suggestions = compute_suggestions(prompt.id, &responses, &config);
        self.deps
            .suggestions
            .replace_for_prompt(&prompt.id, &suggestions)
            .await
            .map_err(map_suggestion_error)?;
        info!(prompt_id = %prompt.id, count = suggestions.len(), "froze final suggestion set");
        Ok(suggestions)
    }

    async fn group_name(&self, group_id: &GroupId) -> Result<String, Error> {
        match self.deps.directory.group_name(group_id).await {
            Ok(name) => Ok(name),
            Err(GroupDirectoryError::GroupMissing { message }) => Err(Error::not_found(message)),
            Err(GroupDirectoryError::Connection { message }) => {
                Err(Error::service_unavailable(message))
            }
            Err(GroupDirectoryError::Query { message }) => Err(Error::internal(message)),
        }
    }

    async fn send_form_link(
        &self,
        prompt: &AvailabilityPrompt,
        settings: &GroupPromptSettings,
        group_name: &str,
        member: &GroupMember,
        purpose: EmailPurpose,
    ) -> Result<(), Error> {
        debug_assert_eq!(prompt.group_id, settings.group_id);
        let issued = self
            .deps
            .tokens
            .issue(
                member.user_id,
                &member.display_name,
                prompt.id,
                settings.token_expiry_hours(),
            )
            .await?;
        debug_assert_eq!(issued.record.status, TokenStatus::Active);

        let link = format!(
            "{}/availability?token={}",
            self.deps.form_base_url.trim_end_matches('/'),
            issued.encoded
        );
        let subject = match purpose {
            EmailPurpose::AvailabilityRequest => {
                format!("When are you free for {group_name} this week?")
            }
            EmailPurpose::AvailabilityReminder => {
                format!("Reminder: {group_name} is waiting on your availability")
            }
        };
        let intro = prompt
            .custom_message
            .clone()
            .unwrap_or_else(|| format!("Pick the times you could play with {group_name}."));
        let deadline_line = format!(
            "Responses close {}",
            prompt.deadline.format("%A %e %B at %H:%M UTC")
        );
        let message = EmailMessage {
            recipient: member.email.clone(),
            subject,
            html_body: format!(
                "<p>Hi {name},</p><p>{intro}</p><p><a href=\"{link}\">Share your availability</a></p><p>{deadline_line}.</p>",
                name = member.display_name,
            ),
            text_body: format!(
                "Hi {name},\n\n{intro}\n\nShare your availability: {link}\n\n{deadline_line}.\n",
                name = member.display_name,
            ),
            group_name: group_name.to_owned(),
            purpose,
        };
        let receipt = self
            .deps
            .mailer
            .send(&message)
            .await
            .map_err(map_mailer_error)?;
        info!(prompt_id = %prompt.id, user_id = %member.user_id,
            message_id = %receipt.message_id, purpose = ?purpose, "sent availability email");
        Ok(())
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
