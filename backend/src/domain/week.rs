//! ISO calendar week identifiers.
//!
//! A [`WeekId`] names one ISO-8601 week (`YYYY-Www`) and deduplicates prompts
//! per group: the storage layer enforces uniqueness on (group, week id). The
//! ISO rule is Thursday-anchored, so dates near a year boundary may belong to
//! week 1 of the following ISO year or week 52/53 of the previous one;
//! chrono's `iso_week` implements exactly that rule.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one ISO calendar week, e.g. `2026-W35`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekId(String);

impl WeekId {
    /// Compute the week identifier containing the given instant.
    #[must_use]
    pub fn for_instant(instant: DateTime<Utc>) -> Self {
        let week = instant.iso_week();
        Self(format!("{:04}-W{:02}", week.year(), week.week()))
    }

    /// Wrap a previously persisted identifier without re-validation.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The identifier as stored, e.g. `2026-W35`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WeekId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    // 2026-08-28 is a Friday in ISO week 35.
    #[case(2026, 8, 28, "2026-W35")]
    // 2024-12-30 is a Monday belonging to ISO week 1 of 2025.
    #[case(2024, 12, 30, "2025-W01")]
    // 2027-01-01 is a Friday belonging to ISO week 53 of 2026.
    #[case(2027, 1, 1, "2026-W53")]
    // 2021-01-01 is a Friday belonging to ISO week 53 of 2020.
    #[case(2021, 1, 1, "2020-W53")]
    fn week_id_follows_iso_8601(
        #[case] year: i32,
        #[case] month: u32,
        #[case] day: u32,
        #[case] expected: &str,
    ) {
        let instant = Utc
            .with_ymd_and_hms(year, month, day, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        assert_eq!(WeekId::for_instant(instant).as_str(), expected);
    }

    #[test]
    fn week_id_is_stable_within_a_week() {
        let monday = Utc
            .with_ymd_and_hms(2026, 8, 24, 0, 0, 0)
            .single()
            .expect("valid timestamp");
        let sunday = Utc
            .with_ymd_and_hms(2026, 8, 30, 23, 59, 59)
            .single()
            .expect("valid timestamp");
        assert_eq!(WeekId::for_instant(monday), WeekId::for_instant(sunday));
    }
}
