//! Stateful in-memory adapters for unit and integration tests.
//!
//! These implement the domain ports over plain mutex-guarded maps so service
//! behaviour can be exercised without a database, mail transport, or queue
//! backend. Enabled for the crate's own tests and, via the `test-support`
//! feature, for integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, Utc};
use mockable::Clock;

use crate::domain::ids::{EventId, GroupId, JobId, PromptId, SettingsId, SuggestionId, TokenId, UserId};
use crate::domain::ports::{
    AnalyticsRepositoryError, EmailMessage, EmailReceipt, GroupDirectory, GroupDirectoryError,
    GroupMember, JobCompletion, JobQueue, JobQueueError, JobStore, JobStoreError, Mailer,
    MailerError, PromptRepository, PromptRepositoryError, ResponseRepository,
    ResponseRepositoryError, SettingsRepository, SettingsRepositoryError, SuggestionRepository,
    SuggestionRepositoryError, TokenAnalyticsRepository, TokenRepository, TokenRepositoryError,
};
use crate::domain::prompt::{
    AvailabilityPrompt, AvailabilityResponse, GroupPromptSettings, PromptStatus, TimeSlot,
};
use crate::domain::scheduler::jobs::{ClaimedJob, JobFamily, JobPayload};
use crate::domain::suggestion::Suggestion;
use crate::domain::token::{AnalyticsSummary, MagicToken, TokenAnalyticsRecord, TokenStatus, ValidationFailure};
use crate::domain::week::WeekId;

/// Manually advanced clock for deterministic time-dependent tests.
pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    /// Create a clock frozen at the given instant.
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: Duration) {
        *self.now.lock().expect("clock lock") += delta;
    }

    /// Jump the clock to an absolute instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock") = now;
    }
}

impl Clock for TestClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// In-memory token store.
#[derive(Default)]
pub struct InMemoryTokenRepository {
    rows: Mutex<HashMap<TokenId, MagicToken>>,
}

impl InMemoryTokenRepository {
    /// Direct row access for assertions.
    #[must_use]
    pub fn get(&self, id: &TokenId) -> Option<MagicToken> {
        self.rows.lock().expect("token rows lock").get(id).cloned()
    }
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn insert(&self, token: &MagicToken) -> Result<(), TokenRepositoryError> {
        let mut rows = self.rows.lock().expect("token rows lock");
        if rows.contains_key(&token.id) {
            return Err(TokenRepositoryError::duplicate_token(token.id.to_string()));
        }
        rows.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &TokenId) -> Result<Option<MagicToken>, TokenRepositoryError> {
        Ok(self.rows.lock().expect("token rows lock").get(id).cloned())
    }

    async fn record_use(
        &self,
        id: &TokenId,
        used_at: DateTime<Utc>,
    ) -> Result<Option<MagicToken>, TokenRepositoryError> {
        let mut rows = self.rows.lock().expect("token rows lock");
        Ok(rows.get_mut(id).map(|row| {
            row.usage_count += 1;
            row.last_used_at = Some(used_at);
            row.clone()
        }))
    }

    async fn revoke(&self, id: &TokenId) -> Result<bool, TokenRepositoryError> {
        let mut rows = self.rows.lock().expect("token rows lock");
        Ok(rows
            .get_mut(id)
            .map(|row| {
                row.status = TokenStatus::Revoked;
            })
            .is_some())
    }
}

/// In-memory append-only analytics log.
#[derive(Default)]
pub struct InMemoryAnalyticsRepository {
    records: Mutex<Vec<TokenAnalyticsRecord>>,
}

impl InMemoryAnalyticsRepository {
    /// All recorded attempts, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<TokenAnalyticsRecord> {
        self.records.lock().expect("analytics lock").clone()
    }
}

#[async_trait]
impl TokenAnalyticsRepository for InMemoryAnalyticsRepository {
    async fn append(&self, record: &TokenAnalyticsRecord) -> Result<(), AnalyticsRepositoryError> {
        self.records.lock().expect("analytics lock").push(record.clone());
        Ok(())
    }

    async fn summary(&self) -> Result<AnalyticsSummary, AnalyticsRepositoryError> {
        let records = self.records.lock().expect("analytics lock");
        let mut summary = AnalyticsSummary::default();
        for record in records.iter() {
            summary.attempts += 1;
            if record.success {
                summary.successes += 1;
            }
            if record.grace_used {
                summary.grace_uses += 1;
            }
            match record.failure_reason {
                Some(ValidationFailure::InvalidToken) => summary.invalid_token += 1,
                Some(ValidationFailure::TokenNotFound) => summary.token_not_found += 1,
                Some(ValidationFailure::TokenRevoked) => summary.token_revoked += 1,
                Some(ValidationFailure::TokenExpired) => summary.token_expired += 1,
                None => {}
            }
        }
        Ok(summary)
    }
}

/// In-memory prompt store enforcing the (group, week) open-prompt invariant.
#[derive(Default)]
pub struct InMemoryPromptRepository {
    rows: Mutex<HashMap<PromptId, AvailabilityPrompt>>,
}

impl InMemoryPromptRepository {
    /// Direct row access for assertions.
    #[must_use]
    pub fn get(&self, id: &PromptId) -> Option<AvailabilityPrompt> {
        self.rows.lock().expect("prompt rows lock").get(id).cloned()
    }

    /// Number of stored prompt rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().expect("prompt rows lock").len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PromptRepository for InMemoryPromptRepository {
    async fn insert(&self, prompt: &AvailabilityPrompt) -> Result<(), PromptRepositoryError> {
        let mut rows = self.rows.lock().expect("prompt rows lock");
        let duplicate = rows.values().any(|row| {
            row.group_id == prompt.group_id && row.week == prompt.week && row.status.is_open()
        });
        if duplicate {
            return Err(PromptRepositoryError::duplicate_week(format!(
                "group {} week {}",
                prompt.group_id, prompt.week
            )));
        }
        rows.insert(prompt.id, prompt.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &PromptId,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError> {
        Ok(self.rows.lock().expect("prompt rows lock").get(id).cloned())
    }

    async fn find_open_for_week(
        &self,
        group_id: &GroupId,
        week: &WeekId,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError> {
        Ok(self
            .rows
            .lock()
            .expect("prompt rows lock")
            .values()
            .find(|row| row.group_id == *group_id && row.week == *week && row.status.is_open())
            .cloned())
    }

    async fn transition_status(
        &self,
        id: &PromptId,
        from: PromptStatus,
        to: PromptStatus,
    ) -> Result<Option<AvailabilityPrompt>, PromptRepositoryError> {
        let mut rows = self.rows.lock().expect("prompt rows lock");
        match rows.get_mut(id) {
            Some(row) if row.status == from => {
                row.status = to;
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn clear_open_for_week(
        &self,
        group_id: &GroupId,
        week: &WeekId,
    ) -> Result<bool, PromptRepositoryError> {
        let mut rows = self.rows.lock().expect("prompt rows lock");
        let target = rows
            .values()
            .find(|row| row.group_id == *group_id && row.week == *week && row.status.is_open())
            .map(|row| row.id);
        Ok(target.map(|id| rows.remove(&id)).is_some())
    }
}

/// In-memory response store, unique on (prompt, user).
#[derive(Default)]
pub struct InMemoryResponseRepository {
    rows: Mutex<HashMap<(PromptId, UserId), AvailabilityResponse>>,
}

#[async_trait]
impl ResponseRepository for InMemoryResponseRepository {
    async fn submit(
        &self,
        prompt_id: &PromptId,
        user_id: &UserId,
        slots: &[TimeSlot],
        submitted_at: DateTime<Utc>,
    ) -> Result<AvailabilityResponse, ResponseRepositoryError> {
        let mut rows = self.rows.lock().expect("response rows lock");
        let row = rows
            .entry((*prompt_id, *user_id))
            .or_insert_with(|| AvailabilityResponse::placeholder(*prompt_id, *user_id));
        row.slots = slots.to_vec();
        row.submitted_at = Some(submitted_at);
        Ok(row.clone())
    }

    async fn find(
        &self,
        prompt_id: &PromptId,
        user_id: &UserId,
    ) -> Result<Option<AvailabilityResponse>, ResponseRepositoryError> {
        Ok(self
            .rows
            .lock()
            .expect("response rows lock")
            .get(&(*prompt_id, *user_id))
            .cloned())
    }

    async fn list_for_prompt(
        &self,
        prompt_id: &PromptId,
    ) -> Result<Vec<AvailabilityResponse>, ResponseRepositoryError> {
        let rows = self.rows.lock().expect("response rows lock");
        let mut matching: Vec<AvailabilityResponse> = rows
            .values()
            .filter(|row| row.prompt_id == *prompt_id)
            .cloned()
            .collect();
        matching.sort_by_key(|row| row.user_id);
        Ok(matching)
    }

    async fn record_reminder(
        &self,
        prompt_id: &PromptId,
        user_id: &UserId,
        reminded_at: DateTime<Utc>,
    ) -> Result<AvailabilityResponse, ResponseRepositoryError> {
        let mut rows = self.rows.lock().expect("response rows lock");
        let row = rows
            .entry((*prompt_id, *user_id))
            .or_insert_with(|| AvailabilityResponse::placeholder(*prompt_id, *user_id));
        row.reminder_count += 1;
        row.last_reminded_at = Some(reminded_at);
        Ok(row.clone())
    }
}

/// In-memory suggestion store.
#[derive(Default)]
pub struct InMemorySuggestionRepository {
    rows: Mutex<HashMap<PromptId, Vec<Suggestion>>>,
}

#[async_trait]
impl SuggestionRepository for InMemorySuggestionRepository {
    async fn replace_for_prompt(
        &self,
        prompt_id: &PromptId,
        suggestions: &[Suggestion],
    ) -> Result<(), SuggestionRepositoryError> {
        self.rows
            .lock()
            .expect("suggestion rows lock")
            .insert(*prompt_id, suggestions.to_vec());
        Ok(())
    }

    async fn list_for_prompt(
        &self,
        prompt_id: &PromptId,
    ) -> Result<Vec<Suggestion>, SuggestionRepositoryError> {
        Ok(self
            .rows
            .lock()
            .expect("suggestion rows lock")
            .get(prompt_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_converted(
        &self,
        suggestion_id: &SuggestionId,
        event_id: &EventId,
    ) -> Result<Option<Suggestion>, SuggestionRepositoryError> {
        let mut rows = self.rows.lock().expect("suggestion rows lock");
        for suggestions in rows.values_mut() {
            if let Some(suggestion) = suggestions.iter_mut().find(|s| s.id == *suggestion_id) {
                suggestion.converted_event_id = Some(*event_id);
                return Ok(Some(suggestion.clone()));
            }
        }
        Ok(None)
    }
}

/// In-memory settings store.
#[derive(Default)]
pub struct InMemorySettingsRepository {
    rows: Mutex<Vec<GroupPromptSettings>>,
}

impl InMemorySettingsRepository {
    /// Seed one settings row.
    pub fn put(&self, settings: GroupPromptSettings) {
        let mut rows = self.rows.lock().expect("settings lock");
        rows.retain(|row| row.id != settings.id);
        rows.push(settings);
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn find_by_id(
        &self,
        id: &SettingsId,
    ) -> Result<Option<GroupPromptSettings>, SettingsRepositoryError> {
        Ok(self
            .rows
            .lock()
            .expect("settings lock")
            .iter()
            .find(|row| row.id == *id)
            .cloned())
    }

    async fn find_for_group(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<GroupPromptSettings>, SettingsRepositoryError> {
        Ok(self
            .rows
            .lock()
            .expect("settings lock")
            .iter()
            .find(|row| row.group_id == *group_id)
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<GroupPromptSettings>, SettingsRepositoryError> {
        Ok(self
            .rows
            .lock()
            .expect("settings lock")
            .iter()
            .filter(|row| row.active)
            .cloned()
            .collect())
    }
}

/// Static group directory seeded with one group's members.
pub struct StaticGroupDirectory {
    group_id: GroupId,
    name: String,
    members: Vec<GroupMember>,
}

impl StaticGroupDirectory {
    /// Directory answering for a single group.
    #[must_use]
    pub fn new(group_id: GroupId, name: impl Into<String>, members: Vec<GroupMember>) -> Self {
        Self {
            group_id,
            name: name.into(),
            members,
        }
    }
}

#[async_trait]
impl GroupDirectory for StaticGroupDirectory {
    async fn group_name(&self, group_id: &GroupId) -> Result<String, GroupDirectoryError> {
        if *group_id == self.group_id {
            Ok(self.name.clone())
        } else {
            Err(GroupDirectoryError::group_missing(group_id.to_string()))
        }
    }

    async fn active_members(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<GroupMember>, GroupDirectoryError> {
        if *group_id == self.group_id {
            Ok(self.members.clone())
        } else {
            Err(GroupDirectoryError::group_missing(group_id.to_string()))
        }
    }
}

/// Recording mail transport.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    counter: AtomicU64,
}

impl RecordingMailer {
    /// All accepted messages, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("mailer lock").clone()
    }

    /// Forget everything sent so far.
    pub fn clear(&self) {
        self.sent.lock().expect("mailer lock").clear();
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, MailerError> {
        self.sent.lock().expect("mailer lock").push(message.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(EmailReceipt {
            message_id: format!("recorded-{n}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredJob {
    id: JobId,
    payload: JobPayload,
    run_at: DateTime<Utc>,
    attempts: u32,
    state: StoredJobState,
    last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoredJobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// In-memory durable queue implementing both the enqueue port and the
/// worker-side store port.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<Vec<StoredJob>>,
}

impl InMemoryJobQueue {
    /// Queued (not yet finished) payloads for a family, soonest first.
    #[must_use]
    pub fn pending(&self, family: JobFamily) -> Vec<(JobPayload, DateTime<Utc>)> {
        let jobs = self.jobs.lock().expect("jobs lock");
        let mut pending: Vec<(JobPayload, DateTime<Utc>)> = jobs
            .iter()
            .filter(|job| {
                job.payload.family() == family && job.state == StoredJobState::Queued
            })
            .map(|job| (job.payload.clone(), job.run_at))
            .collect();
        pending.sort_by_key(|(_, run_at)| *run_at);
        pending
    }

    /// Number of terminally failed jobs (retained for inspection).
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.jobs
            .lock()
            .expect("jobs lock")
            .iter()
            .filter(|job| job.state == StoredJobState::Failed)
            .count()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        payload: &JobPayload,
        run_at: DateTime<Utc>,
    ) -> Result<Option<JobId>, JobQueueError> {
        let mut jobs = self.jobs.lock().expect("jobs lock");
        let already_queued = jobs.iter().any(|job| {
            job.state == StoredJobState::Queued && job.payload == *payload && job.run_at == run_at
        });
        if already_queued {
            return Ok(None);
        }
        let id = JobId::random();
        jobs.push(StoredJob {
            id,
            payload: payload.clone(),
            run_at,
            attempts: 0,
            state: StoredJobState::Queued,
            last_error: None,
        });
        Ok(Some(id))
    }
}

#[async_trait]
impl JobStore for InMemoryJobQueue {
    async fn claim_due(
        &self,
        family: JobFamily,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedJob>, JobStoreError> {
        let mut jobs = self.jobs.lock().expect("jobs lock");
        let mut due: Vec<&mut StoredJob> = jobs
            .iter_mut()
            .filter(|job| {
                job.payload.family() == family
                    && job.state == StoredJobState::Queued
                    && job.run_at <= now
            })
            .collect();
        due.sort_by_key(|job| job.run_at);
        Ok(due.into_iter().next().map(|job| {
            job.state = StoredJobState::Running;
            job.attempts += 1;
            ClaimedJob {
                id: job.id,
                payload: job.payload.clone(),
                attempt: job.attempts,
            }
        }))
    }

    async fn finish(&self, id: &JobId, outcome: JobCompletion) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock().expect("jobs lock");
        let job = jobs
            .iter_mut()
            .find(|job| job.id == *id)
            .ok_or_else(|| JobStoreError::query(format!("unknown job {id}")))?;
        match outcome {
            JobCompletion::Succeeded => job.state = StoredJobState::Succeeded,
            JobCompletion::Failed { error, retry_at } => {
                job.last_error = Some(error);
                match retry_at {
                    Some(run_at) => {
                        job.state = StoredJobState::Queued;
                        job.run_at = run_at;
                    }
                    None => job.state = StoredJobState::Failed,
                }
            }
        }
        Ok(())
    }
}
