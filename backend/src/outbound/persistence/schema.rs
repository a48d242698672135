//! Diesel table definitions for the scheduling core.
//!
//! `groups` and `group_members` are owned by the surrounding application;
//! this crate only reads them through the group directory adapter.

diesel::table! {
    magic_tokens (id) {
        id -> Uuid,
        user_id -> Uuid,
        prompt_id -> Uuid,
        expires_at -> Timestamptz,
        status -> Text,
        usage_count -> Int4,
        last_used_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    token_analytics (id) {
        id -> Int8,
        token_id -> Nullable<Uuid>,
        success -> Bool,
        failure_reason -> Nullable<Text>,
        ip -> Nullable<Text>,
        user_agent -> Nullable<Text>,
        grace_used -> Bool,
        occurred_at -> Timestamptz,
    }
}

diesel::table! {
    availability_prompts (id) {
        id -> Uuid,
        group_id -> Uuid,
        game_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        deadline -> Timestamptz,
        status -> Text,
        week -> Text,
        custom_message -> Nullable<Text>,
        auto_schedule -> Bool,
        blind_voting -> Bool,
    }
}

diesel::table! {
    availability_responses (id) {
        id -> Uuid,
        prompt_id -> Uuid,
        user_id -> Uuid,
        slots -> Jsonb,
        submitted_at -> Nullable<Timestamptz>,
        last_reminded_at -> Nullable<Timestamptz>,
        reminder_count -> Int4,
    }
}

diesel::table! {
    prompt_suggestions (id) {
        id -> Uuid,
        prompt_id -> Uuid,
        starts_at -> Timestamptz,
        ends_at -> Timestamptz,
        participant_count -> Int4,
        participants -> Array<Uuid>,
        preferred_count -> Int4,
        meets_minimum -> Bool,
        score -> Float8,
        converted_event_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    group_prompt_settings (id) {
        id -> Uuid,
        group_id -> Uuid,
        cadence_weekday -> Int2,
        cadence_time -> Time,
        timezone -> Text,
        utc_offset_minutes -> Int4,
        default_deadline_hours -> Int8,
        default_token_expiry_hours -> Int8,
        min_participants -> Int4,
        session_length_minutes -> Int8,
        active -> Bool,
        message_template -> Nullable<Text>,
    }
}

diesel::table! {
    scheduled_jobs (id) {
        id -> Uuid,
        family -> Text,
        payload -> Jsonb,
        run_at -> Timestamptz,
        attempts -> Int4,
        state -> Text,
        last_error -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    groups (id) {
        id -> Uuid,
        name -> Text,
    }
}

diesel::table! {
    group_members (group_id, user_id) {
        group_id -> Uuid,
        user_id -> Uuid,
        display_name -> Text,
        email -> Text,
        is_admin -> Bool,
        active -> Bool,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    magic_tokens,
    token_analytics,
    availability_prompts,
    availability_responses,
    prompt_suggestions,
    group_prompt_settings,
    scheduled_jobs,
    groups,
    group_members,
);
