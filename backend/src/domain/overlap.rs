//! Overlap engine: turns raw per-user time slots into ranked candidate
//! meeting windows.
//!
//! The engine is a pure function of its inputs. Each submitted slot is a
//! half-open interval on a shared UTC timeline; the union of interval
//! boundaries partitions the timeline into maximal segments, each segment is
//! labelled with its covering user set, and adjacent segments with identical
//! covering sets are merged back into one candidate window. Re-running on
//! identical inputs yields an identical candidate list.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};

use super::ids::{PromptId, SuggestionId, UserId};
use super::prompt::{
    AvailabilityResponse, GroupPromptSettings, DEFAULT_MIN_PARTICIPANTS,
    DEFAULT_SESSION_LENGTH_MINUTES,
};
use super::suggestion::Suggestion;

/// Weighting applied when ranking candidate windows.
///
/// The score is `participants + preferred_weight × preferred`; both counts
/// increase the score, and ties prefer the earlier start. The weight is a
/// policy knob rather than a fixed constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    pub preferred_weight: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            preferred_weight: 0.5,
        }
    }
}

/// Parameters for one engine run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapConfig {
    /// Windows with fewer participants still rank, but are flagged as not
    /// meeting minimum attendance.
    pub min_participants: u32,
    /// Candidate windows shorter than the group's expected session length
    /// are discarded.
    pub min_duration: Duration,
    pub scoring: ScoringPolicy,
}

impl OverlapConfig {
    /// Engine parameters taken from a group's settings row.
    #[must_use]
    pub fn from_settings(settings: &GroupPromptSettings) -> Self {
        Self {
            min_participants: settings.min_participants,
            min_duration: Duration::minutes(settings.session_length_minutes),
            scoring: ScoringPolicy::default(),
        }
    }

    /// System-default parameters for groups without a settings row.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            min_participants: DEFAULT_MIN_PARTICIPANTS,
            min_duration: Duration::minutes(DEFAULT_SESSION_LENGTH_MINUTES),
            scoring: ScoringPolicy::default(),
        }
    }
}

/// One candidate window before persistence assigns it an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Covering user set, sorted.
    pub participants: Vec<UserId>,
    /// Participants whose preferred slots cover the whole window.
    pub preferred_count: u32,
    pub meets_minimum: bool,
    pub score: f64,
}

impl CandidateWindow {
    /// Cardinality of the covering user set.
    #[must_use]
    pub fn participant_count(&self) -> u32 {
        u32::try_from(self.participants.len()).unwrap_or(u32::MAX)
    }

    /// Materialize a persisted suggestion from this candidate.
    #[must_use]
    pub fn into_suggestion(self, prompt_id: PromptId) -> Suggestion {
        let participant_count = self.participant_count();
        Suggestion {
            id: SuggestionId::random(),
            prompt_id,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            participant_count,
            participants: self.participants,
            preferred_count: self.preferred_count,
            meets_minimum: self.meets_minimum,
            score: self.score,
            converted_event_id: None,
        }
    }
}

/// Per-segment labelling: who covers it, and who covers it with preference.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Cover {
    users: BTreeSet<UserId>,
    preferred: BTreeSet<UserId>,
}

/// Compute ranked candidate windows from the full response set of a prompt.
///
/// Users who submitted zero slots contribute to zero windows. Windows with an
/// empty covering set are discarded, as are windows shorter than the minimum
/// duration.
#[must_use]
pub fn rank_windows(responses: &[AvailabilityResponse], config: &OverlapConfig) -> Vec<CandidateWindow> {
    let boundaries: BTreeSet<DateTime<Utc>> = responses
        .iter()
        .flat_map(|response| response.slots.iter())
        .flat_map(|slot| [slot.starts_at, slot.ends_at])
        .collect();
    if boundaries.len() < 2 {
        return Vec::new();
    }

    // Label every maximal segment between consecutive boundaries.
    let mut segments: Vec<(DateTime<Utc>, DateTime<Utc>, Cover)> = Vec::new();
    let ordered: Vec<DateTime<Utc>> = boundaries.into_iter().collect();
    for pair in ordered.windows(2) {
        let &[start, end] = pair else { continue };
        let cover = cover_for_segment(responses, start, end);
        if !cover.users.is_empty() {
            segments.push((start, end, cover));
        }
    }

    // Merge adjacent segments with an identical covering user set to avoid
    // spurious fragmentation; the merged window's preferred set is the
    // intersection, so it only counts users preferring the whole window.
    let mut merged: Vec<(DateTime<Utc>, DateTime<Utc>, Cover)> = Vec::new();
    for (start, end, cover) in segments {
        match merged.last_mut() {
            Some((_, prev_end, prev_cover))
                if *prev_end == start && prev_cover.users == cover.users =>
            {
                *prev_end = end;
                prev_cover.preferred = prev_cover
                    .preferred
                    .intersection(&cover.preferred)
                    .copied()
                    .collect();
            }
            _ => merged.push((start, end, cover)),
        }
    }

    let mut windows: Vec<CandidateWindow> = merged
        .into_iter()
        .filter(|(start, end, _)| *end - *start >= config.min_duration)
        .map(|(start, end, cover)| {
            let participants: Vec<UserId> = cover.users.iter().copied().collect();
            let participant_count = u32::try_from(participants.len()).unwrap_or(u32::MAX);
            let preferred_count = u32::try_from(cover.preferred.len()).unwrap_or(u32::MAX);
            CandidateWindow {
                starts_at: start,
                ends_at: end,
                score: score_window(participant_count, preferred_count, &config.scoring),
                meets_minimum: participant_count >= config.min_participants,
                participants,
                preferred_count,
            }
        })
        .collect();

    windows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.starts_at.cmp(&b.starts_at))
            .then_with(|| a.ends_at.cmp(&b.ends_at))
    });
    windows
}

/// Convenience wrapper materializing persisted suggestions for a prompt.
#[must_use]
pub fn compute_suggestions(
    prompt_id: PromptId,
    responses: &[AvailabilityResponse],
    config: &OverlapConfig,
) -> Vec<Suggestion> {
    rank_windows(responses, config)
        .into_iter()
        .map(|window| window.into_suggestion(prompt_id))
        .collect()
}

fn cover_for_segment(
    responses: &[AvailabilityResponse],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Cover {
    let mut users = BTreeSet::new();
    let mut preferred = BTreeSet::new();
    // Deduplicate defensively; the (prompt, user) uniqueness constraint
    // should already guarantee one row per user.
    let mut seen: BTreeMap<UserId, ()> = BTreeMap::new();
    for response in responses {
        if seen.insert(response.user_id, ()).is_some() {
            continue;
        }
        for slot in &response.slots {
            if slot.starts_at <= start && slot.ends_at >= end {
                users.insert(response.user_id);
                if slot.preferred {
                    preferred.insert(response.user_id);
                }
            }
        }
    }
    Cover { users, preferred }
}

fn score_window(participant_count: u32, preferred_count: u32, policy: &ScoringPolicy) -> f64 {
    f64::from(participant_count) + policy.preferred_weight * f64::from(preferred_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prompt::TimeSlot;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 28, hour, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    fn slot(start: DateTime<Utc>, end: DateTime<Utc>, preferred: bool) -> TimeSlot {
        TimeSlot::try_new(start, end, "Europe/London", preferred).expect("valid slot")
    }

    fn response(user_id: UserId, slots: Vec<TimeSlot>) -> AvailabilityResponse {
        AvailabilityResponse {
            prompt_id: PromptId::random(),
            user_id,
            slots,
            submitted_at: Some(at(9, 0)),
            last_reminded_at: None,
            reminder_count: 0,
        }
    }

    fn config(min_participants: u32) -> OverlapConfig {
        OverlapConfig {
            min_participants,
            min_duration: Duration::minutes(60),
            scoring: ScoringPolicy::default(),
        }
    }

    #[test]
    fn empty_input_yields_no_windows() {
        assert!(rank_windows(&[], &config(2)).is_empty());
    }

    #[test]
    fn user_with_zero_slots_contributes_to_zero_windows() {
        let alice = UserId::random();
        let bystander = UserId::random();
        let responses = vec![
            response(alice, vec![slot(at(18, 0), at(21, 0), false)]),
            response(bystander, vec![]),
        ];

        let windows = rank_windows(&responses, &config(1));
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].participants, vec![alice]);
    }

    #[test]
    fn participant_count_equals_covering_set_cardinality() {
        let alice = UserId::random();
        let bob = UserId::random();
        let responses = vec![
            response(alice, vec![slot(at(18, 0), at(22, 0), false)]),
            response(bob, vec![slot(at(19, 0), at(21, 0), false)]),
        ];

        for window in rank_windows(&responses, &config(2)) {
            assert_eq!(
                window.participant_count() as usize,
                window.participants.len()
            );
        }
    }

    #[test]
    fn full_overlap_ranks_above_partial_overlap() {
        let alice = UserId::random();
        let bob = UserId::random();
        // Both free 19:00–21:00; only Alice 18:00–19:00 and 21:00–23:00.
        let responses = vec![
            response(alice, vec![slot(at(18, 0), at(23, 0), false)]),
            response(bob, vec![slot(at(19, 0), at(21, 0), false)]),
        ];

        let windows = rank_windows(&responses, &config(2));
        let best = windows.first().expect("at least one window");
        assert_eq!(best.starts_at, at(19, 0));
        assert_eq!(best.ends_at, at(21, 0));
        assert_eq!(best.participant_count(), 2);
        assert!(best.meets_minimum);
    }

    #[test]
    fn adjacent_segments_with_identical_cover_merge() {
        let alice = UserId::random();
        let bob = UserId::random();
        // Bob's two contiguous slots would otherwise split Alice's evening
        // into fragments with the same covering pair.
        let responses = vec![
            response(alice, vec![slot(at(18, 0), at(22, 0), false)]),
            response(
                bob,
                vec![
                    slot(at(18, 0), at(20, 0), false),
                    slot(at(20, 0), at(22, 0), false),
                ],
            ),
        ];

        let windows = rank_windows(&responses, &config(2));
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].starts_at, at(18, 0));
        assert_eq!(windows[0].ends_at, at(22, 0));
    }

    #[test]
    fn windows_shorter_than_min_duration_are_discarded() {
        let alice = UserId::random();
        let bob = UserId::random();
        // Only 30 minutes of overlap.
        let responses = vec![
            response(alice, vec![slot(at(18, 0), at(19, 0), false)]),
            response(bob, vec![slot(at(18, 30), at(20, 0), false)]),
        ];

        let windows = rank_windows(&responses, &config(2));
        assert!(windows.iter().all(|w| w.participant_count() < 2));
    }

    #[test]
    fn preferred_votes_break_participant_ties() {
        let alice = UserId::random();
        let bob = UserId::random();
        // Two disjoint two-person windows; the later one is preferred by both.
        let responses = vec![
            response(
                alice,
                vec![
                    slot(at(14, 0), at(16, 0), false),
                    slot(at(19, 0), at(21, 0), true),
                ],
            ),
            response(
                bob,
                vec![
                    slot(at(14, 0), at(16, 0), false),
                    slot(at(19, 0), at(21, 0), true),
                ],
            ),
        ];

        let windows = rank_windows(&responses, &config(2));
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].starts_at, at(19, 0));
        assert_eq!(windows[0].preferred_count, 2);
        assert!(windows[0].score > windows[1].score);
    }

    #[test]
    fn equal_scores_prefer_the_earlier_start() {
        let alice = UserId::random();
        let responses = vec![response(
            alice,
            vec![
                slot(at(20, 0), at(22, 0), false),
                slot(at(10, 0), at(12, 0), false),
            ],
        )];

        let windows = rank_windows(&responses, &config(1));
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].starts_at, at(10, 0));
    }

    #[rstest]
    #[case(1, true)]
    #[case(2, true)]
    #[case(3, false)]
    fn meets_minimum_reflects_configured_threshold(
        #[case] min_participants: u32,
        #[case] expected: bool,
    ) {
        let alice = UserId::random();
        let bob = UserId::random();
        let responses = vec![
            response(alice, vec![slot(at(18, 0), at(21, 0), false)]),
            response(bob, vec![slot(at(18, 0), at(21, 0), false)]),
        ];

        let windows = rank_windows(&responses, &config(min_participants));
        assert_eq!(windows[0].meets_minimum, expected);
    }

    #[test]
    fn engine_is_deterministic_for_identical_inputs() {
        let alice = UserId::random();
        let bob = UserId::random();
        let carol = UserId::random();
        let responses = vec![
            response(alice, vec![slot(at(17, 0), at(22, 0), true)]),
            response(
                bob,
                vec![
                    slot(at(18, 0), at(20, 0), false),
                    slot(at(20, 30), at(23, 0), true),
                ],
            ),
            response(carol, vec![slot(at(19, 0), at(21, 0), false)]),
        ];

        let first = rank_windows(&responses, &config(2));
        let second = rank_windows(&responses, &config(2));
        assert_eq!(first, second);
    }
}
