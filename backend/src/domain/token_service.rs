//! Issuance and validation of availability-link tokens.
//!
//! Validation walks a fixed sequence of checks, each with a distinct internal
//! failure reason, and records one analytics row per attempt. Clients only
//! ever see [`GENERIC_TOKEN_MESSAGE`] for a rejection; the reason stays on
//! the operator side.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mockable::Clock;
use tracing::warn;

use super::error::Error;
use super::ids::{PromptId, TokenId, UserId};
use super::ports::{TokenAnalyticsRepository, TokenRepository, TokenRepositoryError};
use super::token::{
    MagicToken, RequestMetadata, TokenAnalyticsRecord, TokenStatus, ValidationFailure,
    ValidationOutcome, GENERIC_TOKEN_MESSAGE,
};
use super::token_codec::{AvailabilityClaims, TokenCodec, TOKEN_AUDIENCE, TOKEN_ISSUER};

/// Post-expiry window during which an in-progress form session is honoured.
///
/// A user may load the form just before expiry and take a few minutes to
/// finish; rejecting on submission purely by current time would discard that
/// legitimate session.
pub const GRACE_WINDOW: Duration = Duration::minutes(5);

/// An issued token: the encoded bearer string plus its stored row.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub encoded: String,
    pub record: MagicToken,
}

/// Token issuance and validation engine.
pub struct TokenService<T: ?Sized, A: ?Sized> {
    codec: TokenCodec,
    tokens: Arc<T>,
    analytics: Arc<A>,
    clock: Arc<dyn Clock>,
}

fn map_repository_error(error: TokenRepositoryError) -> Error {
    match error {
        TokenRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("token repository unavailable: {message}"))
        }
        TokenRepositoryError::Query { message }
        | TokenRepositoryError::DuplicateToken { message } => {
            Error::internal(format!("token repository error: {message}"))
        }
    }
}

impl<T: ?Sized, A: ?Sized> TokenService<T, A> {
    /// Create a service over an injected codec, stores, and clock.
    pub fn new(codec: TokenCodec, tokens: Arc<T>, analytics: Arc<A>, clock: Arc<dyn Clock>) -> Self {
        Self {
            codec,
            tokens,
            analytics,
            clock,
        }
    }
}

impl<T: ?Sized, A: ?Sized> TokenService<T, A>
where
    T: TokenRepository,
    A: TokenAnalyticsRepository,
{
    /// Issue a signed token for a (user, prompt) pair.
    pub async fn issue(
        &self,
        user_id: UserId,
        display_name: &str,
        prompt_id: PromptId,
        expiry_hours: i64,
    ) -> Result<IssuedToken, Error> {
        let now = self.clock.utc();
        let expires_at = now + Duration::hours(expiry_hours);
        let token_id = TokenId::random();

        let claims = AvailabilityClaims {
            sub: user_id.to_string(),
            name: display_name.to_owned(),
            prompt_id: prompt_id.to_string(),
            aud: TOKEN_AUDIENCE.to_owned(),
            iss: TOKEN_ISSUER.to_owned(),
            jti: token_id.to_string(),
            exp: expires_at.timestamp(),
        };
        let encoded = self
            .codec
            .encode(&claims)
            .map_err(|err| Error::internal(format!("token encoding failed: {err}")))?;

        let record = MagicToken {
            id: token_id,
            user_id,
            prompt_id,
            expires_at,
            status: TokenStatus::Active,
            usage_count: 0,
            last_used_at: None,
            created_at: now,
        };
        self.tokens
            .insert(&record)
            .await
            .map_err(map_repository_error)?;

        Ok(IssuedToken { encoded, record })
    }

    /// Validate a presented token, applying grace-period and revocation rules.
    ///
    /// Never raises for malformed input; every attempt, success or failure,
    /// lands in the analytics log. Only infrastructure faults (store outages)
    /// surface as errors.
    pub async fn validate(
        &self,
        presented: &str,
        form_loaded_at: Option<DateTime<Utc>>,
        requester: RequestMetadata,
    ) -> Result<ValidationOutcome, Error> {
        let now = self.clock.utc();

        // 1. Structural and cryptographic checks. Partial readability of the
        //    claims must not leak a more specific reason.
        let Ok(claims) = self.codec.decode(presented) else {
            return self
                .reject(None, ValidationFailure::InvalidToken, requester, now)
                .await;
        };
        let Ok(token_id) = claims.token_id() else {
            return self
                .reject(None, ValidationFailure::InvalidToken, requester, now)
                .await;
        };

        // 2. The signed claim must map to a stored row.
        let record = self
            .tokens
            .find_by_id(&token_id)
            .await
            .map_err(map_repository_error)?;
        let Some(record) = record else {
            return self
                .reject(Some(token_id), ValidationFailure::TokenNotFound, requester, now)
                .await;
        };

        // 3. Revocation beats expiry.
        if record.status == TokenStatus::Revoked {
            return self
                .reject(Some(token_id), ValidationFailure::TokenRevoked, requester, now)
                .await;
        }

        // 4. Expiry with the two-condition grace rule.
        let grace_used = if now < record.expires_at {
            false
        } else if Self::grace_applies(record.expires_at, form_loaded_at, now) {
            true
        } else {
            return self
                .reject(Some(token_id), ValidationFailure::TokenExpired, requester, now)
                .await;
        };

        // 5. Usage tracking is observational only; valid tokens stay reusable.
        let updated = self
            .tokens
            .record_use(&token_id, now)
            .await
            .map_err(map_repository_error)?
            .unwrap_or(record);

        self.record_attempt(TokenAnalyticsRecord {
            token_id: Some(token_id),
            success: true,
            failure_reason: None,
            requester,
            grace_used,
            occurred_at: now,
        })
        .await;

        Ok(ValidationOutcome::Valid {
            claims,
            token: updated,
            grace_used,
        })
    }

    /// Revoke a token. Returns `false` when the id is unknown.
    pub async fn revoke(&self, token_id: &TokenId) -> Result<bool, Error> {
        self.tokens
            .revoke(token_id)
            .await
            .map_err(map_repository_error)
    }

    /// The generic client-facing message for any rejection.
    #[must_use]
    pub const fn generic_rejection_message() -> &'static str {
        GENERIC_TOKEN_MESSAGE
    }

    /// Both conditions must hold: the form was loaded before expiry, and the
    /// submission arrives within the fixed window after expiry.
    fn grace_applies(
        expires_at: DateTime<Utc>,
        form_loaded_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(loaded_at) = form_loaded_at else {
            return false;
        };
        loaded_at < expires_at && now <= expires_at + GRACE_WINDOW
    }

    async fn reject(
        &self,
        token_id: Option<TokenId>,
        reason: ValidationFailure,
        requester: RequestMetadata,
        now: DateTime<Utc>,
    ) -> Result<ValidationOutcome, Error> {
        self.record_attempt(TokenAnalyticsRecord {
            token_id,
            success: false,
            failure_reason: Some(reason),
            requester,
            grace_used: false,
            occurred_at: now,
        })
        .await;
        Ok(ValidationOutcome::Invalid { reason })
    }

    async fn record_attempt(&self, record: TokenAnalyticsRecord) {
        // The analytics log is observational; an outage there must not turn a
        // valid link into a failed submission.
        if let Err(err) = self.analytics.append(&record).await {
            warn!(error = %err, "failed to append token analytics record");
        }
    }
}

#[cfg(test)]
#[path = "token_service_tests.rs"]
mod tests;
