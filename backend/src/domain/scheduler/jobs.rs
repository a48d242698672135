//! Job payloads, families, and per-family retry policies.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{GroupId, JobId, PromptId, SettingsId};

/// The three background job families, each on its own durable queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFamily {
    /// Cadence-triggered weekly prompt creation.
    PromptCreation,
    /// Staged reminder emails.
    Reminder,
    /// Deadline enforcement and suggestion materialization.
    Deadline,
}

impl JobFamily {
    /// Stable queue name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PromptCreation => "prompt_creation",
            Self::Reminder => "reminder",
            Self::Deadline => "deadline",
        }
    }

    /// The family's retry policy.
    ///
    /// Prompt creation retries a few times with exponential backoff: a stale
    /// cadence trigger must not fire twice, so failures surface instead of
    /// retrying indefinitely. Deadline enforcement is time-sensitive, so its
    /// policy is intentionally shallow with a fixed short backoff; a very
    /// late retry is worse than a recorded failure.
    #[must_use]
    pub const fn retry_policy(self) -> RetryPolicy {
        match self {
            Self::PromptCreation => RetryPolicy {
                max_attempts: 3,
                backoff: Backoff::Exponential {
                    base: Duration::seconds(30),
                },
            },
            Self::Reminder => RetryPolicy {
                max_attempts: 5,
                backoff: Backoff::Exponential {
                    base: Duration::seconds(60),
                },
            },
            Self::Deadline => RetryPolicy {
                max_attempts: 2,
                backoff: Backoff::Fixed {
                    delay: Duration::seconds(10),
                },
            },
        }
    }

    /// Worker concurrency per family. Reminders run at lower concurrency to
    /// respect outbound email rate limits.
    #[must_use]
    pub const fn default_concurrency(self) -> usize {
        match self {
            Self::PromptCreation | Self::Deadline => 4,
            Self::Reminder => 1,
        }
    }

    pub const ALL: [Self; 3] = [Self::PromptCreation, Self::Reminder, Self::Deadline];
}

impl std::str::FromStr for JobFamily {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "prompt_creation" => Ok(Self::PromptCreation),
            "reminder" => Ok(Self::Reminder),
            "deadline" => Ok(Self::Deadline),
            other => Err(format!("unknown job family: {other}")),
        }
    }
}

/// Backoff shape between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base × 2^(attempt-1)`.
    Exponential { base: Duration },
    /// Constant delay.
    Fixed { delay: Duration },
}

/// Retry policy for one job family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delivery attempts before the job is left terminally failed.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Delay before the next attempt, given the attempt that just failed
    /// (1-based). Jitter is applied by the worker on top of this.
    #[must_use]
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed { delay } => delay,
            Backoff::Exponential { base } => {
                let exponent = failed_attempt.saturating_sub(1).min(16);
                base * 2_i32.pow(exponent)
            }
        }
    }
}

/// Payload for a cadence-triggered prompt creation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptCreationJob {
    pub group_id: GroupId,
    pub settings_id: SettingsId,
    /// IANA timezone name the cadence was computed in; opaque here.
    pub timezone: String,
}

/// Staged reminder tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStage {
    /// Midway between activation and deadline.
    Halfway,
    /// Shortly before the deadline.
    Final,
}

impl ReminderStage {
    /// Stable tag used in job payloads and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Halfway => "halfway",
            Self::Final => "final",
        }
    }
}

/// Payload for one reminder stage of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderJob {
    pub prompt_id: PromptId,
    pub stage: ReminderStage,
    pub group_id: GroupId,
}

/// Payload for a prompt's deadline job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineJob {
    pub prompt_id: PromptId,
}

/// A job payload tagged with its family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    PromptCreation(PromptCreationJob),
    Reminder(ReminderJob),
    Deadline(DeadlineJob),
}

impl JobPayload {
    /// The queue family this payload belongs to.
    #[must_use]
    pub const fn family(&self) -> JobFamily {
        match self {
            Self::PromptCreation(_) => JobFamily::PromptCreation,
            Self::Reminder(_) => JobFamily::Reminder,
            Self::Deadline(_) => JobFamily::Deadline,
        }
    }
}

/// A job claimed from the queue for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub id: JobId,
    pub payload: JobPayload,
    /// 1-based attempt number of this delivery.
    pub attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn payload_families_match_their_variants() {
        let job = JobPayload::Deadline(DeadlineJob {
            prompt_id: PromptId::random(),
        });
        assert_eq!(job.family(), JobFamily::Deadline);
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let job = JobPayload::Reminder(ReminderJob {
            prompt_id: PromptId::random(),
            stage: ReminderStage::Halfway,
            group_id: GroupId::random(),
        });
        let value = serde_json::to_value(&job).expect("serializes");
        assert_eq!(value["kind"], "reminder");
        assert_eq!(value["stage"], "halfway");
        let back: JobPayload = serde_json::from_value(value).expect("deserializes");
        assert_eq!(back, job);
    }

    #[rstest]
    #[case(1, 30)]
    #[case(2, 60)]
    #[case(3, 120)]
    fn exponential_backoff_doubles_per_attempt(#[case] attempt: u32, #[case] seconds: i64) {
        let policy = JobFamily::PromptCreation.retry_policy();
        assert_eq!(policy.delay_after(attempt), Duration::seconds(seconds));
    }

    #[test]
    fn deadline_policy_is_shallow_and_fixed() {
        let policy = JobFamily::Deadline.retry_policy();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.delay_after(1), policy.delay_after(2));
    }
}
