//! Weekly cadence arithmetic.
//!
//! A group's cadence is a weekday plus a local time of day; fire instants are
//! computed in UTC by applying the group's stored offset. Timezone names are
//! carried opaquely for display, never interpreted here.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};

use crate::domain::prompt::GroupPromptSettings;

/// The first cadence fire instant strictly after `after`.
#[must_use]
pub fn next_fire(settings: &GroupPromptSettings, after: DateTime<Utc>) -> DateTime<Utc> {
    let offset = Duration::minutes(i64::from(settings.utc_offset_minutes));
    let local = after + offset;

    let days_ahead = i64::from(settings.cadence_weekday.num_days_from_monday())
        .wrapping_sub(i64::from(local.weekday().num_days_from_monday()))
        .rem_euclid(7);
    let date = local.date_naive() + Duration::days(days_ahead);
    let mut fire = NaiveDateTime::new(date, settings.cadence_time).and_utc() - offset;
    if fire <= after {
        fire += Duration::days(7);
    }
    fire
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{GroupId, SettingsId};
    use chrono::{NaiveTime, TimeZone, Weekday};
    use rstest::rstest;

    fn settings(weekday: Weekday, hour: u32, utc_offset_minutes: i32) -> GroupPromptSettings {
        GroupPromptSettings {
            id: SettingsId::random(),
            group_id: GroupId::random(),
            cadence_weekday: weekday,
            cadence_time: NaiveTime::from_hms_opt(hour, 0, 0).expect("valid time"),
            timezone: "Europe/London".to_owned(),
            utc_offset_minutes,
            default_deadline_hours: 48,
            default_token_expiry_hours: 96,
            min_participants: 2,
            session_length_minutes: 120,
            active: true,
            message_template: None,
        }
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        // August 2026: the 24th is a Monday.
        Utc.with_ymd_and_hms(2026, 8, day, hour, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    #[rstest]
    // Monday morning, cadence Monday 09:00: fires later the same day.
    #[case(Weekday::Mon, 9, at(24, 6, 0), at(24, 9, 0))]
    // Monday at 09:00 exactly: strictly-after pushes a full week out.
    #[case(Weekday::Mon, 9, at(24, 9, 0), at(31, 9, 0))]
    // Midweek trigger for a Friday cadence.
    #[case(Weekday::Fri, 18, at(26, 12, 0), at(28, 18, 0))]
    // Cadence day already passed this week.
    #[case(Weekday::Tue, 9, at(19, 12, 0), at(25, 9, 0))]
    fn fires_on_the_next_matching_weekday(
        #[case] weekday: Weekday,
        #[case] hour: u32,
        #[case] after: DateTime<Utc>,
        #[case] expected: DateTime<Utc>,
    ) {
        assert_eq!(next_fire(&settings(weekday, hour, 0), after), expected);
    }

    #[test]
    fn positive_offset_shifts_the_utc_fire_instant_earlier() {
        // 09:00 local at UTC+2 is 07:00 UTC.
        let fire = next_fire(&settings(Weekday::Mon, 9, 120), at(24, 6, 0));
        assert_eq!(fire, at(24, 7, 0));
    }

    #[test]
    fn negative_offset_shifts_the_utc_fire_instant_later() {
        // 09:00 local at UTC-5 is 14:00 UTC.
        let fire = next_fire(&settings(Weekday::Mon, 9, -300), at(24, 6, 0));
        assert_eq!(fire, at(24, 14, 0));
    }

    #[test]
    fn offset_can_move_the_fire_across_a_weekday_boundary() {
        // Monday 00:30 local at UTC+1 is Sunday 23:30 UTC; asking on Sunday
        // evening UTC must still find it.
        let mut cfg = settings(Weekday::Mon, 0, 60);
        cfg.cadence_time = NaiveTime::from_hms_opt(0, 30, 0).expect("valid time");
        let sunday_evening = at(23, 22, 0);
        assert_eq!(next_fire(&cfg, sunday_evening), at(23, 23, 30));
    }
}
