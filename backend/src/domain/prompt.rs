//! Weekly availability prompts, member responses, and group settings.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{GroupId, PromptId, SettingsId, UserId};
use super::week::WeekId;

/// Lifecycle state of a prompt.
///
/// `Closed` and `Converted` are terminal; a prompt never reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStatus {
    /// Created but tokens not yet sent.
    Pending,
    /// Tokens issued, accepting responses.
    Active,
    /// Deadline passed or manually closed; suggestions frozen.
    Closed,
    /// One suggestion became a real scheduled event.
    Converted,
}

impl PromptStatus {
    /// Whether the state admits no further transitions besides `Closed → Converted`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Converted)
    }

    /// Whether the prompt still counts against the one-per-group-week invariant.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }

    /// Whether a transition to `next` is permitted by the state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending | Self::Active, Self::Closed)
                | (Self::Closed, Self::Converted)
        )
    }

    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Converted => "converted",
        }
    }
}

impl std::str::FromStr for PromptStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            "converted" => Ok(Self::Converted),
            other => Err(format!("unknown prompt status: {other}")),
        }
    }
}

/// One weekly round of availability collection for a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityPrompt {
    pub id: PromptId,
    pub group_id: GroupId,
    /// Optional reference to a game in the excluded catalogue store.
    pub game_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: PromptStatus,
    /// One prompt per group per calendar week.
    pub week: WeekId,
    pub custom_message: Option<String>,
    /// Convert the best qualifying suggestion automatically at close time.
    pub auto_schedule: bool,
    /// Hide others' response status from non-admins until own submission.
    pub blind_voting: bool,
}

/// One submitted availability window.
///
/// Timestamps are absolute UTC instants; `timezone` records the IANA name the
/// user reported so the excluded web layer can render local civil times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub timezone: String,
    /// Preference tier treated as a boolean weight per slot.
    #[serde(default)]
    pub preferred: bool,
}

/// Validation errors for submitted slots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeSlotError {
    #[error("slot end must be after its start")]
    EmptyInterval,
}

impl TimeSlot {
    /// Construct a slot, rejecting empty or inverted intervals.
    pub fn try_new(
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        timezone: impl Into<String>,
        preferred: bool,
    ) -> Result<Self, TimeSlotError> {
        if ends_at <= starts_at {
            return Err(TimeSlotError::EmptyInterval);
        }
        Ok(Self {
            starts_at,
            ends_at,
            timezone: timezone.into(),
            preferred,
        })
    }
}

/// One member's response row for a prompt; unique on (prompt, user).
///
/// Created lazily by the first submission or by the reminder worker as a
/// placeholder tracking row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub prompt_id: PromptId,
    pub user_id: UserId,
    pub slots: Vec<TimeSlot>,
    /// None until the user actually submits.
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_reminded_at: Option<DateTime<Utc>>,
    pub reminder_count: i32,
}

impl AvailabilityResponse {
    /// A placeholder row tracking reminders before any submission exists.
    #[must_use]
    pub fn placeholder(prompt_id: PromptId, user_id: UserId) -> Self {
        Self {
            prompt_id,
            user_id,
            slots: Vec::new(),
            submitted_at: None,
            last_reminded_at: None,
            reminder_count: 0,
        }
    }

    /// Whether the member has submitted availability.
    #[must_use]
    pub const fn has_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }
}

/// Per-group orchestration configuration; read-only input to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPromptSettings {
    pub id: SettingsId,
    pub group_id: GroupId,
    /// Day of week the cadence fires.
    pub cadence_weekday: Weekday,
    /// Local time of day the cadence fires.
    pub cadence_time: NaiveTime,
    /// IANA timezone name, stored for display by the excluded web layer.
    pub timezone: String,
    /// Offset applied when computing cadence fire instants.
    pub utc_offset_minutes: i32,
    /// Hours between prompt creation and its deadline.
    pub default_deadline_hours: i64,
    /// Hours an issued token stays valid.
    pub default_token_expiry_hours: i64,
    /// A suggestion meets minimum attendance at or above this count.
    pub min_participants: u32,
    /// Expected session length; shorter candidate windows are discarded.
    pub session_length_minutes: i64,
    pub active: bool,
    pub message_template: Option<String>,
}

/// System default applied when a group has no configured token expiry.
pub const DEFAULT_TOKEN_EXPIRY_HOURS: i64 = 96;

impl GroupPromptSettings {
    /// The configured token expiry, or the system default when the group
    /// carries no usable value.
    #[must_use]
    pub const fn token_expiry_hours(&self) -> i64 {
        if self.default_token_expiry_hours > 0 {
            self.default_token_expiry_hours
        } else {
            DEFAULT_TOKEN_EXPIRY_HOURS
        }
    }
}
/// Minimum attendance used when a group has no settings row.
pub const DEFAULT_MIN_PARTICIPANTS: u32 = 2;
/// Session length used when a group has no settings row.
pub const DEFAULT_SESSION_LENGTH_MINUTES: i64 = 120;
