//! Domain layer: scheduling-core types, services, and the ports that bound
//! them. Everything here is storage- and transport-agnostic; adapters live in
//! `crate::outbound` and `crate::inbound`.

pub mod availability;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod overlap;
pub mod ports;
pub mod prompt;
pub mod scheduler;
pub mod suggestion;
pub mod token;
pub mod token_codec;
pub mod token_service;
pub mod week;

pub use availability::{AvailabilityService, FormContext, RespondentStatus, SubmissionOutcome};
pub use error::{Error, ErrorCode};
pub use ids::{
    EventId, GroupId, JobId, PromptId, SettingsId, SuggestionId, TokenId, UserId,
};
pub use lifecycle::{CloseOutcome, CreateOutcome, NewPrompt, PromptLifecycle};
pub use overlap::{
    compute_suggestions, rank_windows, CandidateWindow, OverlapConfig, ScoringPolicy,
};
pub use prompt::{
    AvailabilityPrompt, AvailabilityResponse, GroupPromptSettings, PromptStatus, TimeSlot,
    TimeSlotError, DEFAULT_TOKEN_EXPIRY_HOURS,
};
pub use scheduler::{
    JobOutcome, OrchestratorDeps, PromptOverrides, SchedulingOrchestrator,
    MANUAL_REMINDER_COOLDOWN, MAX_AUTO_REMINDERS,
};
pub use suggestion::Suggestion;
pub use token::{
    AnalyticsSummary, MagicToken, RequestMetadata, TokenAnalyticsRecord, TokenStatus,
    ValidationFailure, ValidationOutcome, GENERIC_TOKEN_MESSAGE,
};
pub use token_codec::{AvailabilityClaims, SigningContext, TokenCodec, TokenCodecError};
pub use token_service::{IssuedToken, TokenService, GRACE_WINDOW};
pub use week::WeekId;
