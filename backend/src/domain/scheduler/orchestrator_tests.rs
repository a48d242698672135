use chrono::{NaiveTime, TimeZone, Weekday};

use super::*;
use crate::domain::error::ErrorCode;
use crate::domain::ids::{SettingsId, UserId};
use crate::domain::prompt::TimeSlot;
use crate::domain::token_codec::{SigningContext, TokenCodec};
use crate::test_support::{
    InMemoryAnalyticsRepository, InMemoryJobQueue, InMemoryPromptRepository,
    InMemoryResponseRepository, InMemorySettingsRepository, InMemorySuggestionRepository,
    InMemoryTokenRepository, RecordingMailer, StaticGroupDirectory, TestClock,
};

struct Harness {
    orchestrator:
        SchedulingOrchestrator<InMemoryTokenRepository, InMemoryAnalyticsRepository>,
    queue: Arc<InMemoryJobQueue>,
    mailer: Arc<RecordingMailer>,
    prompts: Arc<InMemoryPromptRepository>,
    responses: Arc<InMemoryResponseRepository>,
    suggestions: Arc<InMemorySuggestionRepository>,
    clock: Arc<TestClock>,
    group_id: GroupId,
    settings_id: SettingsId,
    members: Vec<GroupMember>,
}

fn harness() -> Harness {
    // Monday 2026-08-24 06:00 UTC.
    let start = Utc
        .with_ymd_and_hms(2026, 8, 24, 6, 0, 0)
        .single()
        .expect("valid timestamp");
    let clock = Arc::new(TestClock::at(start));

    let group_id = GroupId::random();
    let members: Vec<GroupMember> = [("Ada", true), ("Brendan", false), ("Carol", false)]
        .into_iter()
        .map(|(name, is_admin)| GroupMember {
            user_id: UserId::random(),
            display_name: name.to_owned(),
            email: format!("{}@example.com", name.to_lowercase()),
            is_admin,
        })
        .collect();
    let directory = Arc::new(StaticGroupDirectory::new(
        group_id,
        "Weekend Warriors",
        members.clone(),
    ));

    let settings_id = SettingsId::random();
    let settings_repo = Arc::new(InMemorySettingsRepository::default());
    settings_repo.put(GroupPromptSettings {
        id: settings_id,
        group_id,
        cadence_weekday: Weekday::Mon,
        cadence_time: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
        timezone: "Europe/London".to_owned(),
        utc_offset_minutes: 0,
        default_deadline_hours: 48,
        default_token_expiry_hours: 96,
        min_participants: 2,
        session_length_minutes: 60,
        active: true,
        message_template: None,
    });

    let token_rows = Arc::new(InMemoryTokenRepository::default());
    let analytics = Arc::new(InMemoryAnalyticsRepository::default());
    let tokens = Arc::new(TokenService::new(
        TokenCodec::new(SigningContext::from_secret(b"unit-test-secret")),
        token_rows,
        analytics,
        clock.clone() as Arc<dyn Clock>,
    ));

    let prompts = Arc::new(InMemoryPromptRepository::default());
    let responses = Arc::new(InMemoryResponseRepository::default());
    let suggestions = Arc::new(InMemorySuggestionRepository::default());
    let lifecycle = Arc::new(PromptLifecycle::new(
        Arc::clone(&prompts) as Arc<dyn PromptRepository>,
        Arc::clone(&suggestions) as Arc<dyn SuggestionRepository>,
        clock.clone() as Arc<dyn Clock>,
    ));

    let queue = Arc::new(InMemoryJobQueue::default());
    let mailer = Arc::new(RecordingMailer::default());

    let orchestrator = SchedulingOrchestrator::new(OrchestratorDeps {
        tokens,
        lifecycle,
        prompts: Arc::clone(&prompts) as Arc<dyn PromptRepository>,
        responses: Arc::clone(&responses) as Arc<dyn ResponseRepository>,
        suggestions: Arc::clone(&suggestions) as Arc<dyn SuggestionRepository>,
        settings: settings_repo as Arc<dyn SettingsRepository>,
        directory: directory as Arc<dyn GroupDirectory>,
        mailer: Arc::clone(&mailer) as Arc<dyn Mailer>,
        queue: Arc::clone(&queue) as Arc<dyn JobQueue>,
        clock: clock.clone() as Arc<dyn Clock>,
        form_base_url: "https://gamenight.test".to_owned(),
    });

    Harness {
        orchestrator,
        queue,
        mailer,
        prompts,
        responses,
        suggestions,
        clock,
        group_id,
        settings_id,
        members,
    }
}

fn creation_job(h: &Harness) -> PromptCreationJob {
    PromptCreationJob {
        group_id: h.group_id,
        settings_id: h.settings_id,
        timezone: "Europe/London".to_owned(),
    }
}

async fn created_prompt(h: &Harness) -> AvailabilityPrompt {
    let outcome = h
        .orchestrator
        .handle_prompt_creation(&creation_job(h))
        .await
        .expect("creation runs");
    assert_eq!(outcome, JobOutcome::Completed);
    let week = WeekId::for_instant(h.clock.utc());
    h.prompts
        .find_open_for_week(&h.group_id, &week)
        .await
        .expect("lookup runs")
        .expect("prompt exists")
}

fn slot(h: &Harness, start_hour: i64, hours: i64) -> TimeSlot {
    let start = h.clock.utc() + Duration::hours(start_hour);
    TimeSlot::try_new(start, start + Duration::hours(hours), "Europe/London", false)
        .expect("valid slot")
}

#[tokio::test]
async fn plan_cadence_enqueues_the_next_fire_per_active_group() {
    let h = harness();
    let planned = h.orchestrator.plan_cadence().await.expect("planning runs");
    assert_eq!(planned, 1);

    let pending = h.queue.pending(jobs::JobFamily::PromptCreation);
    assert_eq!(pending.len(), 1);
    // Monday 06:00 with a Monday 09:00 cadence fires the same morning.
    let expected = Utc
        .with_ymd_and_hms(2026, 8, 24, 9, 0, 0)
        .single()
        .expect("valid timestamp");
    assert_eq!(pending[0].1, expected);
}

#[tokio::test]
async fn replanning_the_same_fire_time_adds_no_duplicate_job() {
    let h = harness();
    assert_eq!(h.orchestrator.plan_cadence().await.expect("planning runs"), 1);
    assert_eq!(h.orchestrator.plan_cadence().await.expect("planning runs"), 0);

    // An hourly planner tick still targets the same Monday 09:00 fire.
    h.clock.advance(Duration::hours(1));
    assert_eq!(h.orchestrator.plan_cadence().await.expect("planning runs"), 0);

    assert_eq!(h.queue.pending(jobs::JobFamily::PromptCreation).len(), 1);
}

#[tokio::test]
async fn prompt_creation_mails_every_member_and_schedules_followups() {
    let h = harness();
    let prompt = created_prompt(&h).await;

    assert_eq!(prompt.status, PromptStatus::Active);
    assert_eq!(prompt.deadline, h.clock.utc() + Duration::hours(48));

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent
        .iter()
        .all(|m| m.purpose == EmailPurpose::AvailabilityRequest));
    assert!(sent.iter().all(|m| m.text_body.contains("token=")));
    let recipients: Vec<&str> = sent.iter().map(|m| m.recipient.as_str()).collect();
    assert!(recipients.contains(&"ada@example.com"));

    let reminders = h.queue.pending(jobs::JobFamily::Reminder);
    assert_eq!(reminders.len(), 2);
    // Halfway at +24h, final at deadline minus its lead (also +24h here).
    assert_eq!(reminders[0].1, h.clock.utc() + Duration::hours(24));
    let deadlines = h.queue.pending(jobs::JobFamily::Deadline);
    assert_eq!(deadlines.len(), 1);
    assert_eq!(deadlines[0].1, prompt.deadline);
}

#[tokio::test]
async fn redelivered_creation_job_is_skipped_once_the_prompt_is_active() {
    let h = harness();
    created_prompt(&h).await;

    let outcome = h
        .orchestrator
        .handle_prompt_creation(&creation_job(&h))
        .await
        .expect("creation runs");
    assert!(matches!(outcome, JobOutcome::Skipped { .. }));
    assert_eq!(h.prompts.len(), 1);
    // No duplicate mail from the redelivery.
    assert_eq!(h.mailer.sent().len(), 3);
}

#[tokio::test]
async fn creation_job_for_deleted_settings_is_skipped() {
    let h = harness();
    let job = PromptCreationJob {
        group_id: h.group_id,
        settings_id: SettingsId::random(),
        timezone: "Europe/London".to_owned(),
    };
    let outcome = h
        .orchestrator
        .handle_prompt_creation(&job)
        .await
        .expect("creation runs");
    assert!(matches!(outcome, JobOutcome::Skipped { .. }));
    assert!(h.prompts.is_empty());
}

#[tokio::test]
async fn reminders_target_only_members_who_have_not_submitted() {
    let h = harness();
    let prompt = created_prompt(&h).await;
    let submitted = &h.members[0];
    h.responses
        .submit(
            &prompt.id,
            &submitted.user_id,
            &[slot(&h, 30, 2)],
            h.clock.utc(),
        )
        .await
        .expect("response stored");

    h.clock.advance(Duration::hours(24));
    let outcome = h
        .orchestrator
        .handle_reminder(&ReminderJob {
            prompt_id: prompt.id,
            stage: ReminderStage::Halfway,
            group_id: h.group_id,
        })
        .await
        .expect("reminder runs");
    assert_eq!(outcome, JobOutcome::Completed);

    let sent = h.mailer.sent();
    let reminded: Vec<&EmailMessage> = sent
        .iter()
        .filter(|m| m.purpose == EmailPurpose::AvailabilityReminder)
        .collect();
    assert_eq!(reminded.len(), 2);
    assert!(reminded
        .iter()
        .all(|m| m.recipient != submitted.email));

    for member in &h.members[1..] {
        let row = h
            .responses
            .find(&prompt.id, &member.user_id)
            .await
            .expect("lookup runs")
            .expect("placeholder row created");
        assert_eq!(row.reminder_count, 1);
        assert!(!row.has_submitted());
    }
}

#[tokio::test]
async fn reminder_stage_caps_at_the_automatic_limit() {
    let h = harness();
    let prompt = created_prompt(&h).await;
    let job = ReminderJob {
        prompt_id: prompt.id,
        stage: ReminderStage::Halfway,
        group_id: h.group_id,
    };

    h.clock.advance(Duration::hours(12));
    for _ in 0..MAX_AUTO_REMINDERS {
        let outcome = h.orchestrator.handle_reminder(&job).await.expect("runs");
        assert_eq!(outcome, JobOutcome::Completed);
    }

    // Every member is at the cap now; a further stage delivers nothing.
    let outcome = h.orchestrator.handle_reminder(&job).await.expect("runs");
    assert!(matches!(outcome, JobOutcome::Skipped { .. }));
    let row = h
        .responses
        .find(&prompt.id, &h.members[1].user_id)
        .await
        .expect("lookup runs")
        .expect("row exists");
    assert_eq!(row.reminder_count, MAX_AUTO_REMINDERS);
}

#[tokio::test]
async fn reminder_after_the_deadline_is_skipped() {
    let h = harness();
    let prompt = created_prompt(&h).await;
    h.clock.advance(Duration::hours(49));

    let outcome = h
        .orchestrator
        .handle_reminder(&ReminderJob {
            prompt_id: prompt.id,
            stage: ReminderStage::Final,
            group_id: h.group_id,
        })
        .await
        .expect("reminder runs");
    assert!(matches!(outcome, JobOutcome::Skipped { .. }));
}

#[tokio::test]
async fn deadline_closes_the_prompt_and_freezes_suggestions() {
    let h = harness();
    let prompt = created_prompt(&h).await;
    for member in &h.members[..2] {
        h.responses
            .submit(
                &prompt.id,
                &member.user_id,
                &[slot(&h, 30, 2)],
                h.clock.utc(),
            )
            .await
            .expect("response stored");
    }

    h.clock.advance(Duration::hours(48));
    let outcome = h
        .orchestrator
        .handle_deadline(&DeadlineJob {
            prompt_id: prompt.id,
        })
        .await
        .expect("deadline runs");
    assert_eq!(outcome, JobOutcome::Completed);

    let closed = h.prompts.get(&prompt.id).expect("prompt exists");
    assert_eq!(closed.status, PromptStatus::Closed);
    let frozen = h
        .suggestions
        .list_for_prompt(&prompt.id)
        .await
        .expect("lists");
    assert!(!frozen.is_empty());
    assert!(frozen[0].meets_minimum);

    // Redelivery is a no-op.
    let again = h
        .orchestrator
        .handle_deadline(&DeadlineJob {
            prompt_id: prompt.id,
        })
        .await
        .expect("deadline runs");
    assert!(matches!(again, JobOutcome::Skipped { .. }));
}

#[tokio::test]
async fn auto_schedule_converts_the_best_qualifying_window() {
    let h = harness();
    let now = h.clock.utc();
    let prompt = AvailabilityPrompt {
        id: PromptId::random(),
        group_id: h.group_id,
        game_id: None,
        created_at: now,
        deadline: now + Duration::hours(48),
        status: PromptStatus::Active,
        week: WeekId::for_instant(now),
        custom_message: None,
        auto_schedule: true,
        blind_voting: false,
    };
    h.prompts.insert(&prompt).await.expect("prompt stored");
    for member in &h.members[..2] {
        h.responses
            .submit(
                &prompt.id,
                &member.user_id,
                &[slot(&h, 30, 3)],
                h.clock.utc(),
            )
            .await
            .expect("response stored");
    }

    h.clock.advance(Duration::hours(48));
    let outcome = h
        .orchestrator
        .handle_deadline(&DeadlineJob {
            prompt_id: prompt.id,
        })
        .await
        .expect("deadline runs");
    assert_eq!(outcome, JobOutcome::Completed);

    let converted = h.prompts.get(&prompt.id).expect("prompt exists");
    assert_eq!(converted.status, PromptStatus::Converted);
    let frozen = h
        .suggestions
        .list_for_prompt(&prompt.id)
        .await
        .expect("lists");
    assert!(frozen
        .iter()
        .any(|s| s.converted_event_id.is_some() && s.meets_minimum));
}

#[tokio::test]
async fn manual_reminder_honours_the_cooldown() {
    let h = harness();
    let prompt = created_prompt(&h).await;

    let first = h
        .orchestrator
        .manual_reminder(&prompt.id, None)
        .await
        .expect("manual reminder runs");
    assert_eq!(first, 3);

    h.clock.advance(Duration::hours(2));
    let second = h
        .orchestrator
        .manual_reminder(&prompt.id, None)
        .await
        .expect("manual reminder runs");
    assert_eq!(second, 0);

    h.clock.advance(MANUAL_REMINDER_COOLDOWN);
    let third = h
        .orchestrator
        .manual_reminder(&prompt.id, None)
        .await
        .expect("manual reminder runs");
    assert_eq!(third, 3);
}

#[tokio::test]
async fn manual_reminder_on_a_closed_prompt_is_a_conflict() {
    let h = harness();
    let prompt = created_prompt(&h).await;
    h.clock.advance(Duration::hours(48));
    h.orchestrator
        .handle_deadline(&DeadlineJob {
            prompt_id: prompt.id,
        })
        .await
        .expect("deadline runs");

    let err = h
        .orchestrator
        .manual_reminder(&prompt.id, None)
        .await
        .expect_err("closed prompts take no reminders");
    assert_eq!(err.code(), ErrorCode::Conflict);
}

#[tokio::test]
async fn manual_trigger_replaces_the_current_week_prompt() {
    let h = harness();
    let first = created_prompt(&h).await;

    let replacement = h
        .orchestrator
        .manual_trigger(&h.group_id, PromptOverrides::default())
        .await
        .expect("manual trigger runs");
    assert_ne!(replacement.id, first.id);
    assert_eq!(replacement.week, first.week);
    assert_eq!(replacement.status, PromptStatus::Active);
    assert!(h.prompts.get(&first.id).is_none());
}

#[tokio::test]
async fn manual_trigger_applies_admin_overrides() {
    let h = harness();
    let deadline = h.clock.utc() + Duration::hours(24);

    let prompt = h
        .orchestrator
        .manual_trigger(
            &h.group_id,
            PromptOverrides {
                deadline: Some(deadline),
                auto_schedule: Some(true),
                blind_voting: Some(true),
                custom_message: Some("Bring snacks.".to_owned()),
            },
        )
        .await
        .expect("manual trigger runs");

    assert_eq!(prompt.deadline, deadline);
    assert!(prompt.auto_schedule);
    assert!(prompt.blind_voting);
    assert_eq!(prompt.custom_message.as_deref(), Some("Bring snacks."));
}

#[tokio::test]
async fn followups_skip_the_final_stage_when_the_deadline_is_close() {
    let h = harness();
    let deadline = h.clock.utc() + Duration::hours(20);
    h.orchestrator
        .manual_trigger(
            &h.group_id,
            PromptOverrides {
                deadline: Some(deadline),
                ..PromptOverrides::default()
            },
        )
        .await
        .expect("manual trigger runs");

    // Under the final-stage lead only the halfway nudge is scheduled.
    let reminders = h.queue.pending(jobs::JobFamily::Reminder);
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].1, h.clock.utc() + Duration::hours(10));
    assert!(matches!(
        reminders[0].0,
        JobPayload::Reminder(ReminderJob {
            stage: ReminderStage::Halfway,
            ..
        })
    ));
    assert_eq!(h.queue.pending(jobs::JobFamily::Deadline).len(), 1);
}

#[tokio::test]
async fn manual_trigger_rejects_a_past_deadline() {
    let h = harness();
    let err = h
        .orchestrator
        .manual_trigger(
            &h.group_id,
            PromptOverrides {
                deadline: Some(h.clock.utc() - Duration::hours(1)),
                ..PromptOverrides::default()
            },
        )
        .await
        .expect_err("past deadlines are rejected");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn targeted_manual_reminder_nudges_only_that_member() {
    let h = harness();
    let prompt = created_prompt(&h).await;
    h.mailer.clear();

    let reminded = h
        .orchestrator
        .manual_reminder(&prompt.id, Some(&h.members[1].user_id))
        .await
        .expect("manual reminder runs");
    assert_eq!(reminded, 1);

    let recipients: Vec<String> = h
        .mailer
        .sent()
        .into_iter()
        .filter(|m| m.purpose == EmailPurpose::AvailabilityReminder)
        .map(|m| m.recipient)
        .collect();
    assert_eq!(recipients, vec![h.members[1].email.clone()]);

    let err = h
        .orchestrator
        .manual_reminder(&prompt.id, Some(&UserId::random()))
        .await
        .expect_err("unknown members are rejected");
    assert_eq!(err.code(), ErrorCode::NotFound);
}
