//! Computed candidate meeting windows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EventId, PromptId, SuggestionId, UserId};

/// One ranked candidate meeting window for a prompt.
///
/// Produced wholesale by the overlap engine; every run fully replaces the
/// prior suggestion set for the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: SuggestionId,
    pub prompt_id: PromptId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Cardinality of `participants`.
    pub participant_count: u32,
    /// Covering user set, sorted for deterministic output.
    pub participants: Vec<UserId>,
    /// Users whose covering slot was flagged preferred.
    pub preferred_count: u32,
    /// Participant count ≥ the group's configured minimum.
    pub meets_minimum: bool,
    /// Composite ranking score; higher is better.
    pub score: f64,
    /// Set once an admin converts this window into a scheduled event.
    pub converted_event_id: Option<EventId>,
}
