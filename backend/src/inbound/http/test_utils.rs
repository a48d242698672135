//! Shared wiring for HTTP handler tests: a full state over in-memory
//! adapters with one active group, one active prompt, and three members.

use std::sync::Arc;

use chrono::{NaiveTime, TimeZone, Utc, Weekday};
use mockable::Clock;

use crate::domain::ports::{
    GroupMember, PromptRepository, TokenAnalyticsRepository, TokenRepository,
};
use crate::domain::{
    AvailabilityPrompt, AvailabilityService, GroupId, GroupPromptSettings, OrchestratorDeps,
    PromptId, PromptLifecycle, PromptStatus, SchedulingOrchestrator, SettingsId, SigningContext,
    TokenCodec, TokenService, UserId, WeekId,
};
use crate::inbound::http::state::HttpState;
use crate::test_support::{
    InMemoryAnalyticsRepository, InMemoryJobQueue, InMemoryPromptRepository,
    InMemoryResponseRepository, InMemorySettingsRepository, InMemorySuggestionRepository,
    InMemoryTokenRepository, RecordingMailer, StaticGroupDirectory, TestClock,
};

pub struct TestHarness {
    pub state: HttpState,
    pub clock: Arc<TestClock>,
    pub group_id: GroupId,
    pub prompt_id: PromptId,
    pub members: Vec<GroupMember>,
    pub prompts: Arc<InMemoryPromptRepository>,
    pub queue: Arc<InMemoryJobQueue>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestHarness {
    /// Issue a live form token for a member of the seeded prompt.
    pub async fn issue_token(&self, member: &GroupMember) -> String {
        self.state
            .tokens
            .issue(member.user_id, &member.display_name, self.prompt_id, 96)
            .await
            .expect("issues token")
            .encoded
    }
}

fn member(name: &str, is_admin: bool) -> GroupMember {
    GroupMember {
        user_id: UserId::random(),
        display_name: name.to_owned(),
        email: format!("{}@example.com", name.to_lowercase()),
        is_admin,
    }
}

/// Build a full HTTP state over in-memory adapters.
///
/// The seeded prompt is active for the week containing the fixed test
/// instant, Friday 2026-08-28 12:00 UTC, with its deadline two days out.
pub async fn test_state() -> TestHarness {
    let now = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).single().expect("ts");
    let clock = Arc::new(TestClock::at(now));
    let group_id = GroupId::random();
    let members = vec![
        member("Ada", true),
        member("Brendan", false),
        member("Carol", false),
    ];

    let tokens = Arc::new(InMemoryTokenRepository::default());
    let analytics = Arc::new(InMemoryAnalyticsRepository::default());
    let prompts = Arc::new(InMemoryPromptRepository::default());
    let responses = Arc::new(InMemoryResponseRepository::default());
    let suggestions = Arc::new(InMemorySuggestionRepository::default());
    let settings = Arc::new(InMemorySettingsRepository::default());
    let directory = Arc::new(StaticGroupDirectory::new(
        group_id,
        "Weekend Warriors",
        members.clone(),
    ));
    let mailer = Arc::new(RecordingMailer::default());
    let queue = Arc::new(InMemoryJobQueue::default());

    settings.put(GroupPromptSettings {
        id: SettingsId::random(),
        group_id,
        cadence_weekday: Weekday::Mon,
        cadence_time: NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
        timezone: "Europe/London".to_owned(),
        utc_offset_minutes: 0,
        default_deadline_hours: 48,
        default_token_expiry_hours: 96,
        min_participants: 2,
        session_length_minutes: 60,
        active: true,
        message_template: None,
    });

    let prompt_id = PromptId::random();
    prompts
        .insert(&AvailabilityPrompt {
            id: prompt_id,
            group_id,
            game_id: None,
            created_at: now,
            deadline: now + chrono::Duration::hours(48),
            status: PromptStatus::Active,
            week: WeekId::for_instant(now),
            custom_message: None,
            auto_schedule: false,
            blind_voting: false,
        })
        .await
        .expect("seeds prompt");

    let codec = TokenCodec::new(SigningContext::from_secret(b"test-secret"));
    let token_service = Arc::new(TokenService::new(
        codec,
        tokens.clone() as Arc<dyn TokenRepository>,
        analytics.clone() as Arc<dyn TokenAnalyticsRepository>,
        clock.clone() as Arc<dyn Clock>,
    ));

    let availability = Arc::new(AvailabilityService::new(
        token_service.clone(),
        prompts.clone(),
        responses.clone(),
        suggestions.clone(),
        settings.clone(),
        directory.clone(),
        clock.clone() as Arc<dyn Clock>,
    ));

    let lifecycle = Arc::new(PromptLifecycle::new(
        prompts.clone(),
        suggestions.clone(),
        clock.clone() as Arc<dyn Clock>,
    ));
    let orchestrator = Arc::new(SchedulingOrchestrator::new(OrchestratorDeps {
        tokens: token_service.clone(),
        lifecycle,
        prompts: prompts.clone(),
        responses,
        suggestions,
        settings,
        directory,
        mailer: mailer.clone(),
        queue: queue.clone(),
        clock: clock.clone() as Arc<dyn Clock>,
        form_base_url: "https://gamenight.test".to_owned(),
    }));

    let state = HttpState {
        availability,
        tokens: token_service,
        orchestrator,
        analytics: analytics.clone(),
    };

    TestHarness {
        state,
        clock,
        group_id,
        prompt_id,
        members,
        prompts,
        queue,
        mailer,
    }
}
