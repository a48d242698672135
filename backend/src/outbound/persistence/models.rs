//! Row structs bridging Diesel and the domain types.
//!
//! Conversions that can encounter corrupt stored data (unknown status strings,
//! malformed slot JSON) report the offending value so the repository can map
//! it to a query error instead of panicking.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::ids::{
    EventId, GroupId, PromptId, SettingsId, SuggestionId, TokenId, UserId,
};
use crate::domain::prompt::{
    AvailabilityPrompt, AvailabilityResponse, GroupPromptSettings, PromptStatus, TimeSlot,
};
use crate::domain::suggestion::Suggestion;
use crate::domain::token::{MagicToken, TokenAnalyticsRecord, TokenStatus, ValidationFailure};
use crate::domain::week::WeekId;

use super::schema::{
    availability_prompts, availability_responses, group_members, group_prompt_settings,
    magic_tokens, prompt_suggestions, token_analytics,
};

/// A stored value that could not be converted back into its domain type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("corrupt stored value in {column}: {detail}")]
pub struct RowConversionError {
    pub column: &'static str,
    pub detail: String,
}

impl RowConversionError {
    fn new(column: &'static str, detail: impl Into<String>) -> Self {
        Self {
            column,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = magic_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MagicTokenRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub usage_count: i32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MagicTokenRow> for MagicToken {
    type Error = RowConversionError;

    fn try_from(row: MagicTokenRow) -> Result<Self, Self::Error> {
        let status: TokenStatus = row
            .status
            .parse()
            .map_err(|detail: String| RowConversionError::new("magic_tokens.status", detail))?;
        Ok(Self {
            id: TokenId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            prompt_id: PromptId::from_uuid(row.prompt_id),
            expires_at: row.expires_at,
            status,
            usage_count: row.usage_count,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = magic_tokens)]
pub struct NewMagicTokenRow<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub status: &'a str,
    pub usage_count: i32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl<'a> NewMagicTokenRow<'a> {
    pub fn from_domain(token: &'a MagicToken) -> Self {
        Self {
            id: *token.id.as_uuid(),
            user_id: *token.user_id.as_uuid(),
            prompt_id: *token.prompt_id.as_uuid(),
            expires_at: token.expires_at,
            status: token.status.as_str(),
            usage_count: token.usage_count,
            last_used_at: token.last_used_at,
            created_at: token.created_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = token_analytics)]
pub struct NewTokenAnalyticsRow<'a> {
    pub token_id: Option<Uuid>,
    pub success: bool,
    pub failure_reason: Option<&'a str>,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub grace_used: bool,
    pub occurred_at: DateTime<Utc>,
}

impl<'a> NewTokenAnalyticsRow<'a> {
    pub fn from_domain(record: &'a TokenAnalyticsRecord) -> Self {
        Self {
            token_id: record.token_id.map(|id| *id.as_uuid()),
            success: record.success,
            failure_reason: record.failure_reason.map(ValidationFailure::as_str),
            ip: record.requester.ip.as_deref(),
            user_agent: record.requester.user_agent.as_deref(),
            grace_used: record.grace_used,
            occurred_at: record.occurred_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = availability_prompts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PromptRow {
    pub id: Uuid,
    pub group_id: Uuid,
    pub game_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: String,
    pub week: String,
    pub custom_message: Option<String>,
    pub auto_schedule: bool,
    pub blind_voting: bool,
}

impl TryFrom<PromptRow> for AvailabilityPrompt {
    type Error = RowConversionError;

    fn try_from(row: PromptRow) -> Result<Self, Self::Error> {
        let status: PromptStatus = row.status.parse().map_err(|detail: String| {
            RowConversionError::new("availability_prompts.status", detail)
        })?;
        Ok(Self {
            id: PromptId::from_uuid(row.id),
            group_id: GroupId::from_uuid(row.group_id),
            game_id: row.game_id,
            created_at: row.created_at,
            deadline: row.deadline,
            status,
            week: WeekId::from_raw(row.week),
            custom_message: row.custom_message,
            auto_schedule: row.auto_schedule,
            blind_voting: row.blind_voting,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = availability_prompts)]
pub struct NewPromptRow<'a> {
    pub id: Uuid,
    pub group_id: Uuid,
    pub game_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: &'a str,
    pub week: &'a str,
    pub custom_message: Option<&'a str>,
    pub auto_schedule: bool,
    pub blind_voting: bool,
}

impl<'a> NewPromptRow<'a> {
    pub fn from_domain(prompt: &'a AvailabilityPrompt) -> Self {
        Self {
            id: *prompt.id.as_uuid(),
            group_id: *prompt.group_id.as_uuid(),
            game_id: prompt.game_id,
            created_at: prompt.created_at,
            deadline: prompt.deadline,
            status: prompt.status.as_str(),
            week: prompt.week.as_str(),
            custom_message: prompt.custom_message.as_deref(),
            auto_schedule: prompt.auto_schedule,
            blind_voting: prompt.blind_voting,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = availability_responses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ResponseRow {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub user_id: Uuid,
    pub slots: serde_json::Value,
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_reminded_at: Option<DateTime<Utc>>,
    pub reminder_count: i32,
}

impl TryFrom<ResponseRow> for AvailabilityResponse {
    type Error = RowConversionError;

    fn try_from(row: ResponseRow) -> Result<Self, Self::Error> {
        let slots: Vec<TimeSlot> = serde_json::from_value(row.slots).map_err(|err| {
            RowConversionError::new("availability_responses.slots", err.to_string())
        })?;
        Ok(Self {
            prompt_id: PromptId::from_uuid(row.prompt_id),
            user_id: UserId::from_uuid(row.user_id),
            slots,
            submitted_at: row.submitted_at,
            last_reminded_at: row.last_reminded_at,
            reminder_count: row.reminder_count,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = availability_responses)]
pub struct NewResponseRow {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub user_id: Uuid,
    pub slots: serde_json::Value,
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_reminded_at: Option<DateTime<Utc>>,
    pub reminder_count: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = prompt_suggestions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SuggestionRow {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub participant_count: i32,
    pub participants: Vec<Uuid>,
    pub preferred_count: i32,
    pub meets_minimum: bool,
    pub score: f64,
    pub converted_event_id: Option<Uuid>,
}

impl From<SuggestionRow> for Suggestion {
    fn from(row: SuggestionRow) -> Self {
        Self {
            id: SuggestionId::from_uuid(row.id),
            prompt_id: PromptId::from_uuid(row.prompt_id),
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            participant_count: u32::try_from(row.participant_count).unwrap_or_default(),
            participants: row.participants.into_iter().map(UserId::from_uuid).collect(),
            preferred_count: u32::try_from(row.preferred_count).unwrap_or_default(),
            meets_minimum: row.meets_minimum,
            score: row.score,
            converted_event_id: row.converted_event_id.map(EventId::from_uuid),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = prompt_suggestions)]
pub struct NewSuggestionRow {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub participant_count: i32,
    pub participants: Vec<Uuid>,
    pub preferred_count: i32,
    pub meets_minimum: bool,
    pub score: f64,
    pub converted_event_id: Option<Uuid>,
}

impl NewSuggestionRow {
    pub fn from_domain(suggestion: &Suggestion) -> Self {
        Self {
            id: *suggestion.id.as_uuid(),
            prompt_id: *suggestion.prompt_id.as_uuid(),
            starts_at: suggestion.starts_at,
            ends_at: suggestion.ends_at,
            participant_count: i32::try_from(suggestion.participant_count).unwrap_or(i32::MAX),
            participants: suggestion
                .participants
                .iter()
                .map(|id| *id.as_uuid())
                .collect(),
            preferred_count: i32::try_from(suggestion.preferred_count).unwrap_or(i32::MAX),
            meets_minimum: suggestion.meets_minimum,
            score: suggestion.score,
            converted_event_id: suggestion.converted_event_id.map(|id| *id.as_uuid()),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = group_prompt_settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SettingsRow {
    pub id: Uuid,
    pub group_id: Uuid,
    pub cadence_weekday: i16,
    pub cadence_time: NaiveTime,
    pub timezone: String,
    pub utc_offset_minutes: i32,
    pub default_deadline_hours: i64,
    pub default_token_expiry_hours: i64,
    pub min_participants: i32,
    pub session_length_minutes: i64,
    pub active: bool,
    pub message_template: Option<String>,
}

/// Weekday stored as days-from-Monday (0 through 6).
fn weekday_from_db(value: i16) -> Result<Weekday, RowConversionError> {
    match value {
        0 => Ok(Weekday::Mon),
        1 => Ok(Weekday::Tue),
        2 => Ok(Weekday::Wed),
        3 => Ok(Weekday::Thu),
        4 => Ok(Weekday::Fri),
        5 => Ok(Weekday::Sat),
        6 => Ok(Weekday::Sun),
        other => Err(RowConversionError::new(
            "group_prompt_settings.cadence_weekday",
            format!("value {other} outside 0..=6"),
        )),
    }
}

impl TryFrom<SettingsRow> for GroupPromptSettings {
    type Error = RowConversionError;

    fn try_from(row: SettingsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: SettingsId::from_uuid(row.id),
            group_id: GroupId::from_uuid(row.group_id),
            cadence_weekday: weekday_from_db(row.cadence_weekday)?,
            cadence_time: row.cadence_time,
            timezone: row.timezone,
            utc_offset_minutes: row.utc_offset_minutes,
            default_deadline_hours: row.default_deadline_hours,
            default_token_expiry_hours: row.default_token_expiry_hours,
            min_participants: u32::try_from(row.min_participants).unwrap_or_default(),
            session_length_minutes: row.session_length_minutes,
            active: row.active,
            message_template: row.message_template,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = group_members)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupMemberRow {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub email: String,
    pub is_admin: bool,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn token_row_round_trips_through_domain() {
        let token = MagicToken {
            id: TokenId::random(),
            user_id: UserId::random(),
            prompt_id: PromptId::random(),
            expires_at: Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).single().expect("ts"),
            status: TokenStatus::Active,
            usage_count: 2,
            last_used_at: None,
            created_at: Utc.with_ymd_and_hms(2026, 8, 24, 12, 0, 0).single().expect("ts"),
        };
        let new_row = NewMagicTokenRow::from_domain(&token);
        let row = MagicTokenRow {
            id: new_row.id,
            user_id: new_row.user_id,
            prompt_id: new_row.prompt_id,
            expires_at: new_row.expires_at,
            status: new_row.status.to_owned(),
            usage_count: new_row.usage_count,
            last_used_at: new_row.last_used_at,
            created_at: new_row.created_at,
        };
        assert_eq!(MagicToken::try_from(row).expect("converts"), token);
    }

    #[test]
    fn unknown_status_string_is_a_conversion_error() {
        let row = MagicTokenRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            prompt_id: Uuid::new_v4(),
            expires_at: Utc::now(),
            status: "dormant".to_owned(),
            usage_count: 0,
            last_used_at: None,
            created_at: Utc::now(),
        };
        let err = MagicToken::try_from(row).expect_err("unknown status rejected");
        assert_eq!(err.column, "magic_tokens.status");
    }

    #[test]
    fn weekday_mapping_covers_the_week() {
        for (value, expected) in [(0, Weekday::Mon), (4, Weekday::Fri), (6, Weekday::Sun)] {
            assert_eq!(weekday_from_db(value).expect("valid"), expected);
        }
        assert!(weekday_from_db(7).is_err());
    }

    #[test]
    fn malformed_slot_json_is_a_conversion_error() {
        let row = ResponseRow {
            id: Uuid::new_v4(),
            prompt_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            slots: serde_json::json!({"not": "a slot list"}),
            submitted_at: None,
            last_reminded_at: None,
            reminder_count: 0,
        };
        let err = AvailabilityResponse::try_from(row).expect_err("bad json rejected");
        assert_eq!(err.column, "availability_responses.slots");
    }
}
