//! Magic-link token records and validation outcomes.
//!
//! A [`MagicToken`] row exists for every issued token and is kept forever for
//! audit. Validation produces a typed [`ValidationOutcome`]; failures collapse
//! to one generic client-facing message so a caller cannot distinguish a
//! revoked token from an expired one. The specific reason is retained in the
//! analytics log only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PromptId, TokenId, UserId};
use super::token_codec::AvailabilityClaims;

/// Generic message shown to clients for every non-success validation.
pub const GENERIC_TOKEN_MESSAGE: &str = "this link is no longer valid";

/// Lifecycle status of an issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Honoured until expiry (plus grace) or revocation.
    Active,
    /// Explicitly invalidated; never honoured again.
    Revoked,
}

impl TokenStatus {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }
}

impl std::str::FromStr for TokenStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            other => Err(format!("unknown token status: {other}")),
        }
    }
}

/// One issued magic-link token.
///
/// ## Invariants
/// - `id` is globally unique and immutable once issued.
/// - `usage_count` only increases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicToken {
    pub id: TokenId,
    pub user_id: UserId,
    pub prompt_id: PromptId,
    pub expires_at: DateTime<Utc>,
    pub status: TokenStatus,
    pub usage_count: i32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Reason a presented token was rejected.
///
/// Only ever surfaced through the analytics channel; clients receive
/// [`GENERIC_TOKEN_MESSAGE`] regardless of the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    /// Structural or cryptographic decode failure.
    InvalidToken,
    /// The decoded token id has no stored row.
    TokenNotFound,
    /// The stored row is revoked.
    TokenRevoked,
    /// Past expiry and outside the grace rule.
    TokenExpired,
}

impl ValidationFailure {
    /// Stable reason code recorded in analytics rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::TokenNotFound => "token_not_found",
            Self::TokenRevoked => "token_revoked",
            Self::TokenExpired => "token_expired",
        }
    }
}

impl std::str::FromStr for ValidationFailure {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "invalid_token" => Ok(Self::InvalidToken),
            "token_not_found" => Ok(Self::TokenNotFound),
            "token_revoked" => Ok(Self::TokenRevoked),
            "token_expired" => Ok(Self::TokenExpired),
            other => Err(format!("unknown validation failure: {other}")),
        }
    }
}

/// Result of presenting a token for validation.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// The token is honoured.
    Valid {
        claims: AvailabilityClaims,
        token: MagicToken,
        /// Whether the post-expiry grace rule was needed to accept it.
        grace_used: bool,
    },
    /// The token is rejected; clients see only [`GENERIC_TOKEN_MESSAGE`].
    Invalid { reason: ValidationFailure },
}

impl ValidationOutcome {
    /// Whether the token was accepted.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Whether acceptance relied on the grace rule.
    #[must_use]
    pub const fn grace_used(&self) -> bool {
        matches!(self, Self::Valid { grace_used: true, .. })
    }

    /// The rejection reason, if rejected.
    #[must_use]
    pub const fn failure(&self) -> Option<ValidationFailure> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid { reason } => Some(*reason),
        }
    }
}

/// Requester metadata attached to analytics rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One append-only record of a validation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAnalyticsRecord {
    /// Absent when the presented string could not be parsed at all.
    pub token_id: Option<TokenId>,
    pub success: bool,
    pub failure_reason: Option<ValidationFailure>,
    pub requester: RequestMetadata,
    pub grace_used: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregate view over the analytics log for operator reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub attempts: u64,
    pub successes: u64,
    pub grace_uses: u64,
    pub invalid_token: u64,
    pub token_not_found: u64,
    pub token_revoked: u64,
    pub token_expired: u64,
}
